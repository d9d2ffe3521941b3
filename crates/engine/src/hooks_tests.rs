// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::HookInput;
use crate::test_helpers::{exec_harness, pipeline_with, project, ExecHarness};
use crate::transition::TransitionContext;
use crew_adapters::ScmCall;
use crew_core::{PhaseStatus, PromptStatus, Task, Transition, Trigger};

fn harness(task: Task) -> ExecHarness {
    exec_harness(pipeline_with(vec![]), task, project())
}

fn input_for(h: &ExecHarness, task_id: &str, params: Option<Value>) -> HookInput {
    HookInput {
        task: h.store.task(task_id).unwrap(),
        transition: Transition::new("open", "implementing", Trigger::Manual),
        from_status: "open".to_string(),
        context: TransitionContext::manual(None),
        params,
    }
}

fn env_of(h: &ExecHarness) -> HookEnv<
    crew_adapters::FakeGitOps,
    crew_adapters::FakeScmPlatform,
    crew_adapters::FakeNotifyAdapter,
    crew_core::FakeClock,
    crew_core::SequentialIdGen,
> {
    HookEnv {
        store: h.store.clone(),
        activity: crate::ActivityLogger::new(
            h.store.clone(),
            h.clock.clone(),
            crew_core::SequentialIdGen::new("hk"),
        ),
        git: h.git.clone(),
        scm: h.scm.clone(),
        notifier: h.notifier.clone(),
        worktrees: h.worktrees.clone(),
        run_tx: {
            // A fresh channel: these tests drive hooks directly
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            std::mem::forget(rx);
            tx
        },
        clock: h.clock.clone(),
        id_gen: crew_core::SequentialIdGen::new("hk"),
    }
}

fn flat_task() -> Task {
    Task::builder()
        .id("t1")
        .project_id("proj-1")
        .pipeline_id("dev")
        .status("open")
        .title("Add search")
        .build()
}

#[tokio::test]
async fn start_agent_enqueues_a_request() {
    let mut h = harness(flat_task());
    let env = HookEnv {
        run_tx: {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            h.run_rx = rx;
            tx
        },
        ..env_of(&h)
    };
    let hook = start_agent(env);

    let outcome = hook(input_for(
        &h,
        "t1",
        Some(json!({ "mode": "plan", "agentType": "claude" })),
    ))
    .await;
    assert!(outcome.success);

    let request = h.run_rx.try_recv().unwrap();
    assert_eq!(request.task_id, "t1");
    assert_eq!(request.mode, "plan");
}

#[tokio::test]
async fn start_agent_uses_project_mode_for_changes_requested() {
    let mut h = harness(flat_task());
    let env = HookEnv {
        run_tx: {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            h.run_rx = rx;
            tx
        },
        ..env_of(&h)
    };
    let hook = start_agent(env);

    let mut input = input_for(&h, "t1", None);
    input.context = TransitionContext::agent("changes_requested", json!({}));
    let outcome = hook(input).await;
    assert!(outcome.success);

    let request = h.run_rx.try_recv().unwrap();
    assert_eq!(request.mode, "request_changes");
}

#[tokio::test]
async fn create_prompt_materializes_from_context_data() {
    let h = harness(flat_task());
    let hook = create_prompt(env_of(&h));

    let mut input = input_for(&h, "t1", Some(json!({ "resumeOutcome": "approved" })));
    input.context = TransitionContext::agent(
        "needs_info",
        json!({
            "agentRunId": "run-7",
            "payload": { "questions": ["which database?"] },
        }),
    );

    let outcome = hook(input).await;
    assert!(outcome.success);

    let prompts = h.store.prompts_for_run("run-7");
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].status, PromptStatus::Pending);
    assert_eq!(prompts[0].prompt_type, "needs_info");
    assert_eq!(prompts[0].payload["questions"][0], "which database?");
    assert_eq!(prompts[0].payload["resume_outcome"], "approved");
}

#[tokio::test]
async fn notify_substitutes_templates_literally() {
    let h = harness(flat_task());
    let hook = notify(env_of(&h));

    let mut input = input_for(
        &h,
        "t1",
        Some(json!({
            "titleTemplate": "{taskTitle}",
            "bodyTemplate": "{fromStatus} → {toStatus} ($1 stays)",
        })),
    );
    input.task.status = "implementing".to_string();

    let outcome = hook(input).await;
    assert!(outcome.success);

    let calls = h.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].title, "Add search");
    assert_eq!(calls[0].message, "open → implementing ($1 stays)");
}

#[tokio::test]
async fn push_and_create_pr_pushes_then_links() {
    let h = harness(Task::builder().id("t1").pipeline_id("dev").status("pr_review")
        .title("Add search")
        .branch_name("task/t1/implement")
        .build());
    let hook = push_and_create_pr(env_of(&h));

    let outcome = hook(input_for(&h, "t1", None)).await;
    assert!(outcome.success, "{:?}", outcome.error);

    assert!(h.git.ops().contains(&"push".to_string()));
    assert!(matches!(h.scm.calls()[0], ScmCall::CreatePr { .. }));

    let task = h.store.task("t1").unwrap();
    assert_eq!(task.pr_link.as_deref(), Some("https://example.test/pr/1"));
    let artifacts = h.store.artifacts_for_task("t1");
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].data["url"], "https://example.test/pr/1");
}

#[tokio::test]
async fn push_and_create_pr_surfaces_scm_failures() {
    let h = harness(Task::builder().id("t1").pipeline_id("dev").status("pr_review")
        .branch_name("task/t1/implement")
        .build());
    h.scm.fail_create_pr("rate limited");
    let hook = push_and_create_pr(env_of(&h));

    let outcome = hook(input_for(&h, "t1", None)).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("rate limited"));
    assert!(h.store.task("t1").unwrap().pr_link.is_none());
}

#[tokio::test]
async fn push_and_create_pr_needs_a_branch() {
    let h = harness(flat_task());
    let hook = push_and_create_pr(env_of(&h));
    let outcome = hook(input_for(&h, "t1", None)).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("no branch"));
}

#[tokio::test]
async fn merge_pr_merges_and_deletes_the_worktree() {
    let h = harness(Task::builder().id("t1").pipeline_id("dev").status("done")
        .pr_link("https://example.test/pr/3")
        .build());
    let manager = h.worktrees.for_project(&project());
    manager.create("task/t1/implement", "t1").await.unwrap();

    let hook = merge_pr(env_of(&h));
    let outcome = hook(input_for(&h, "t1", None)).await;
    assert!(outcome.success, "{:?}", outcome.error);

    assert_eq!(
        h.scm.calls(),
        vec![ScmCall::MergePr {
            pr_url: "https://example.test/pr/3".to_string()
        }]
    );
    assert!(manager.get("t1").is_none(), "worktree should be deleted");
}

#[tokio::test]
async fn advance_phase_completes_and_activates() {
    let mut task = Task::builder()
        .id("t1")
        .pipeline_id("dev")
        .status("done")
        .pr_link("https://example.test/pr/5")
        .branch_name("task/t1/implement/phase-1")
        .phase("Phase 1", PhaseStatus::InProgress)
        .phase("Phase 2", PhaseStatus::Pending)
        .phase("Phase 3", PhaseStatus::Pending)
        .build();
    task.project_id = "proj-1".to_string();
    let h = harness(task);
    let manager = h.worktrees.for_project(&project());
    manager.create("task/t1/implement/phase-1", "t1").await.unwrap();

    let hook = advance_phase(env_of(&h));
    let outcome = hook(input_for(&h, "t1", None)).await;
    assert!(outcome.success);

    let task = h.store.task("t1").unwrap();
    assert_eq!(task.phases[0].status, PhaseStatus::Completed);
    assert_eq!(
        task.phases[0].pr_link.as_deref(),
        Some("https://example.test/pr/5")
    );
    assert_eq!(task.phases[1].status, PhaseStatus::InProgress);
    assert_eq!(task.phases[2].status, PhaseStatus::Pending);
    assert!(task.pr_link.is_none());
    assert!(task.branch_name.is_none());
    assert!(manager.get("t1").is_none());

    let follow_up = outcome.follow_up.expect("next phase requests a follow-up");
    assert_eq!(follow_up.to_status, "implementing");
    assert_eq!(follow_up.context.trigger, Trigger::System);
}

#[tokio::test]
async fn advance_phase_stops_after_the_last_phase() {
    let task = Task::builder()
        .id("t1")
        .pipeline_id("dev")
        .status("done")
        .phase("Phase 1", PhaseStatus::Completed)
        .phase("Phase 2", PhaseStatus::InProgress)
        .build();
    let h = harness(task);

    let hook = advance_phase(env_of(&h));
    let outcome = hook(input_for(&h, "t1", None)).await;
    assert!(outcome.success);
    assert!(outcome.follow_up.is_none());

    let task = h.store.task("t1").unwrap();
    assert_eq!(task.phases[1].status, PhaseStatus::Completed);
}

//! Multi-phase advancement: merge, advance, re-enter implementation.

use crate::prelude::*;
use crew_adapters::ScriptedRun;
use crew_core::{HookPolicy, HookRef, PhaseStatus, Task, Transition, Trigger};
use serde_json::json;

fn phased_pipeline() -> crew_core::Pipeline {
    pipeline(
        vec![
            status("implementing", false),
            status("pr_review", false),
            status("done", true),
        ],
        vec![
            Transition::new("pr_review", "done", Trigger::Manual)
                .hook(HookRef::named("merge_pr").with_policy(HookPolicy::Required))
                .hook(HookRef::named("advance_phase")),
            Transition::new("done", "implementing", Trigger::System).hook(
                HookRef {
                    name: "start_agent".to_string(),
                    params: Some(json!({ "mode": "implement", "agentType": "claude" })),
                    policy: HookPolicy::FireAndForget,
                },
            ),
        ],
    )
}

fn three_phase_task() -> Task {
    let mut t = Task::builder()
        .id("t1")
        .project_id("proj-1")
        .pipeline_id("dev")
        .status("pr_review")
        .title("Big feature")
        .pr_link("https://example.test/pr/11")
        .branch_name("task/t1/implement/phase-1")
        .phase("Backend", PhaseStatus::InProgress)
        .phase("API", PhaseStatus::Pending)
        .phase("Frontend", PhaseStatus::Pending)
        .build();
    t.description = "three phases of work".to_string();
    t
}

#[tokio::test]
async fn approve_and_merge_advances_to_the_next_phase() {
    let h = harness();
    h.workflow.add_pipeline(phased_pipeline()).unwrap();
    h.workflow.create_task(three_phase_task()).unwrap();

    // The phase-2 agent run the advancement will kick off
    h.agent.push_run(ScriptedRun::ok(vec![]));

    let result = h.workflow.transition("t1", "done", Some("alice")).await.unwrap();
    assert!(result.success, "{:?}", result.error);

    // The PR was merged
    assert!(h
        .scm
        .calls()
        .iter()
        .any(|c| matches!(c, crew_adapters::ScmCall::MergePr { pr_url } if pr_url.contains("/pr/11"))));

    // Phase 1 completed and keeps its PR; phase 2 activated
    let task = h.workflow.task("t1").unwrap();
    assert_eq!(task.phases[0].status, PhaseStatus::Completed);
    assert_eq!(
        task.phases[0].pr_link.as_deref(),
        Some("https://example.test/pr/11")
    );
    assert_eq!(task.phases[1].status, PhaseStatus::InProgress);
    assert_eq!(task.phases[2].status, PhaseStatus::Pending);

    // The system transition re-entered implementing
    wait_for_status(&h.workflow, "t1", "implementing").await;
    let history = h.workflow.store().history_for_task("t1");
    assert!(history
        .iter()
        .any(|r| r.from_status == "done"
            && r.to_status == "implementing"
            && r.trigger == Trigger::System));

    // The fire_and_forget start_agent hook queued a phase-2 run
    let run = wait_for_terminal_run(&h.workflow, "t1").await;
    assert_eq!(run.mode, "implement");
    wait_until(
        || {
            h.workflow
                .task("t1")
                .and_then(|t| t.branch_name)
                .as_deref()
                == Some("task/t1/implement/phase-2")
        },
        "phase-2 branch name",
    )
    .await;
    assert!(h
        .git
        .calls()
        .iter()
        .any(|c| c.op == "worktree_add" && c.arg == "task/t1/implement/phase-2"));
}

#[tokio::test]
async fn the_final_phase_does_not_re_enter_implementation() {
    let h = harness();
    h.workflow.add_pipeline(phased_pipeline()).unwrap();
    let mut t = three_phase_task();
    t.phases[0].status = PhaseStatus::Completed;
    t.phases[1].status = PhaseStatus::Completed;
    t.phases[2].status = PhaseStatus::InProgress;
    h.workflow.create_task(t).unwrap();

    let result = h.workflow.transition("t1", "done", None).await.unwrap();
    assert!(result.success);

    // No follow-up transition: the task rests in done
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let task = h.workflow.task("t1").unwrap();
    assert_eq!(task.status, "done");
    assert_eq!(task.phases[2].status, PhaseStatus::Completed);
    assert!(h.workflow.runs_for_task("t1").is_empty());
}

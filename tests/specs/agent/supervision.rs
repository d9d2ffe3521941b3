//! Supervisor reconciliation and restart recovery.

use crate::prelude::*;
use crew_core::{AgentRun, AgentRunStatus, Severity};

fn minimal_pipeline() -> crew_core::Pipeline {
    pipeline(vec![status("open", false)], vec![])
}

#[tokio::test]
async fn ghost_run_is_reaped_after_one_tick() {
    let h = harness();
    h.workflow.add_pipeline(minimal_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "open")).unwrap();

    // A running row with no live execution behind it
    h.workflow
        .store()
        .put_run(
            AgentRun::builder()
                .id("ghost-1")
                .task_id("t1")
                .started_at_ms(0)
                .timeout_ms(5_000)
                .build(),
        )
        .unwrap();
    h.clock.set_ms(10_000);

    h.workflow.supervisor().tick_once();

    let run = h.workflow.agent_run("ghost-1").unwrap();
    assert_eq!(run.status, AgentRunStatus::Failed);
    assert_eq!(run.outcome.as_deref(), Some("interrupted"));
    assert!(run.completed_at_ms.unwrap() >= run.started_at_ms);

    let events = h.workflow.task_events("t1");
    assert!(events
        .iter()
        .any(|e| e.severity == Severity::Warning && e.message.contains("Ghost run")));
}

#[tokio::test]
async fn reaping_twice_is_idempotent() {
    let h = harness();
    h.workflow.add_pipeline(minimal_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "open")).unwrap();
    h.workflow
        .store()
        .put_run(AgentRun::builder().id("ghost-1").task_id("t1").build())
        .unwrap();

    h.workflow.supervisor().tick_once();
    let first = h.workflow.agent_run("ghost-1").unwrap();
    h.workflow.supervisor().tick_once();
    let second = h.workflow.agent_run("ghost-1").unwrap();

    assert_eq!(first, second, "terminal rows never change");
}

#[tokio::test]
async fn startup_recovers_interrupted_runs_and_expires_prompts() {
    let h = harness();
    h.workflow.add_pipeline(minimal_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "open")).unwrap();
    h.workflow
        .store()
        .put_run(AgentRun::builder().id("orphan-1").task_id("t1").build())
        .unwrap();
    h.workflow
        .store()
        .put_prompt(crew_core::PendingPrompt {
            id: "p1".to_string(),
            task_id: "t1".to_string(),
            agent_run_id: "orphan-1".to_string(),
            prompt_type: "needs_info".to_string(),
            payload: serde_json::json!({ "questions": ["?"] }),
            response: None,
            status: crew_core::PromptStatus::Pending,
            created_at_ms: 0,
            answered_at_ms: None,
        })
        .unwrap();

    let recovered = h.workflow.startup().await.unwrap();
    assert_eq!(recovered, 1);

    let run = h.workflow.agent_run("orphan-1").unwrap();
    assert_eq!(run.status, AgentRunStatus::Failed);
    assert_eq!(run.outcome.as_deref(), Some("interrupted"));

    let prompts = h.workflow.pending_prompts_for_run("orphan-1");
    assert_eq!(prompts[0].status, crew_core::PromptStatus::Expired);

    h.workflow.shutdown();
}

//! Agent runs routing their outcomes through the pipeline.

use crate::prelude::*;
use crew_adapters::{AgentMessage, ContentBlock, ScriptedRun};
use crew_core::{Severity, Transition, Trigger};
use serde_json::json;

fn planning_pipeline() -> crew_core::Pipeline {
    pipeline(
        vec![
            status("planning", false),
            status("implementing", false),
            status("open", false),
        ],
        vec![
            Transition::new("planning", "implementing", Trigger::Agent)
                .on_outcome("plan_complete"),
            Transition::new("planning", "open", Trigger::Agent).on_outcome("failed"),
        ],
    )
}

#[tokio::test]
async fn plan_complete_routes_planning_to_implementing() {
    let h = harness();
    h.workflow.add_pipeline(planning_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "planning")).unwrap();

    h.agent.push_run(ScriptedRun::ok(vec![
        AgentMessage::Assistant {
            blocks: vec![ContentBlock::Text {
                text: "Plan drafted.\n## Summary\nSplit into two subtasks.".to_string(),
            }],
        },
        AgentMessage::Result {
            outcome: Some("plan_complete".to_string()),
            structured_output: Some(json!({
                "plan": "1. build index\n2. add query endpoint",
                "subtasks": ["build index", "add query endpoint"],
            })),
            usage: None,
        },
    ]));

    let run = h
        .workflow
        .start_agent("t1", "plan", "claude", None)
        .await
        .unwrap();

    let task = wait_for_status(&h.workflow, "t1", "implementing").await;
    assert_eq!(task.plan.as_deref(), Some("1. build index\n2. add query endpoint"));
    assert_eq!(task.subtasks.len(), 2);

    let finished = wait_for_terminal_run(&h.workflow, "t1").await;
    assert_eq!(finished.id, run.id);
    assert_eq!(finished.exit_code, Some(0));
    assert_eq!(finished.outcome.as_deref(), Some("plan_complete"));

    // A plan_summary context entry appeared
    let context = h.workflow.store().context_for_task("t1");
    let summary = context
        .iter()
        .find(|c| c.kind == "plan_summary")
        .expect("plan summary entry");
    assert!(summary.content.contains("Split into two subtasks"));

    // An info-severity agent event names the completion
    wait_until(
        || {
            h.workflow.task_events("t1").iter().any(|e| {
                e.category == "agent"
                    && e.severity == Severity::Info
                    && e.message.contains("completed")
            })
        },
        "agent completion event",
    )
    .await;
}

#[tokio::test]
async fn failed_agent_routes_back_to_open() {
    let h = harness();
    h.workflow.add_pipeline(planning_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "planning")).unwrap();

    h.agent.push_run(ScriptedRun::crashed(vec![], 1));

    h.workflow
        .start_agent("t1", "plan", "claude", None)
        .await
        .unwrap();

    wait_for_status(&h.workflow, "t1", "open").await;
    let run = wait_for_terminal_run(&h.workflow, "t1").await;
    assert_eq!(run.outcome.as_deref(), Some("failed"));
}

#[tokio::test]
async fn outcome_without_a_matching_arc_leaves_the_status() {
    let h = harness();
    h.workflow.add_pipeline(planning_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "planning")).unwrap();

    h.agent.push_run(ScriptedRun::ok(vec![AgentMessage::Result {
        outcome: Some("design_ready".to_string()),
        structured_output: None,
        usage: None,
    }]));

    h.workflow
        .start_agent("t1", "technical_design", "claude", None)
        .await
        .unwrap();

    let run = wait_for_terminal_run(&h.workflow, "t1").await;
    assert_eq!(run.outcome.as_deref(), Some("design_ready"));
    assert_eq!(h.workflow.task("t1").unwrap().status, "planning");
}

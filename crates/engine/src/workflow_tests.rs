// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{pipeline_with, project};
use crew_adapters::{FakeGitOps, FakeNotifyAdapter, FakeQueryAgent, FakeScmPlatform};
use crew_core::{FakeClock, SequentialIdGen, Task, Transition, Trigger};

type TestWorkflow = Workflow<
    FakeGitOps,
    FakeScmPlatform,
    FakeQueryAgent,
    FakeNotifyAdapter,
    FakeClock,
    SequentialIdGen,
>;

fn deps() -> WorkflowDeps<
    FakeGitOps,
    FakeScmPlatform,
    FakeQueryAgent,
    FakeNotifyAdapter,
    FakeClock,
    SequentialIdGen,
> {
    WorkflowDeps {
        git: FakeGitOps::new(),
        scm: FakeScmPlatform::new(),
        agent: FakeQueryAgent::new(),
        notifier: FakeNotifyAdapter::new(),
        clock: FakeClock::at(1_000),
        id_gen: SequentialIdGen::new("id"),
    }
}

fn workflow_at(dir: &std::path::Path) -> TestWorkflow {
    Workflow::new(WorkflowConfig::at(dir), deps()).unwrap()
}

fn seeded(workflow: &TestWorkflow) {
    workflow.add_project(project()).unwrap();
    workflow
        .add_pipeline(pipeline_with(vec![Transition::new(
            "open",
            "implementing",
            Trigger::Manual,
        )]))
        .unwrap();
}

#[tokio::test]
async fn create_task_validates_the_initial_status() {
    let dir = tempfile::tempdir().unwrap();
    let workflow = workflow_at(dir.path());
    seeded(&workflow);

    let err = workflow
        .create_task(Task::builder().pipeline_id("dev").status("bogus").build())
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));

    let task = workflow
        .create_task(Task::builder().id(String::new()).pipeline_id("dev").status("open").build())
        .unwrap();
    assert!(!task.id.is_empty(), "missing ids are assigned");
}

#[tokio::test]
async fn add_pipeline_stamps_a_revision_hash() {
    let dir = tempfile::tempdir().unwrap();
    let workflow = workflow_at(dir.path());
    workflow.add_pipeline(pipeline_with(vec![])).unwrap();

    let pipeline = workflow.store().pipeline("dev").unwrap();
    assert_eq!(pipeline.revision.len(), 64);

    // Re-adding the same definition yields the same revision
    let first = pipeline.revision.clone();
    workflow.add_pipeline(pipeline_with(vec![])).unwrap();
    assert_eq!(workflow.store().pipeline("dev").unwrap().revision, first);
}

#[tokio::test]
async fn transition_api_drives_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let workflow = workflow_at(dir.path());
    seeded(&workflow);
    workflow
        .create_task(Task::builder().id("t1").pipeline_id("dev").status("open").build())
        .unwrap();

    let result = workflow.transition("t1", "implementing", Some("alice")).await.unwrap();
    assert!(result.success);
    assert_eq!(workflow.task("t1").unwrap().status, "implementing");

    let events = workflow.task_events("t1");
    assert!(events.iter().any(|e| e.category == "transition"));

    let err = workflow.transition("missing", "implementing", None).await.unwrap_err();
    assert!(matches!(err, EngineError::TaskNotFound(_)));
}

#[tokio::test]
async fn startup_takes_an_exclusive_state_lock() {
    let dir = tempfile::tempdir().unwrap();
    let first = workflow_at(dir.path());
    first.startup().await.unwrap();

    let second = workflow_at(dir.path());
    let err = second.startup().await.unwrap_err();
    assert!(matches!(err, EngineError::Startup(_)));

    first.shutdown();

    // The lock is released; a later instance can start
    let third = workflow_at(dir.path());
    third.startup().await.unwrap();
    third.shutdown();
}

#[tokio::test]
async fn startup_recovers_orphaned_runs() {
    let dir = tempfile::tempdir().unwrap();
    {
        let workflow = workflow_at(dir.path());
        seeded(&workflow);
        workflow
            .create_task(Task::builder().id("t1").pipeline_id("dev").status("open").build())
            .unwrap();
        workflow
            .store()
            .put_run(crew_core::AgentRun::builder().id("orphan").task_id("t1").build())
            .unwrap();
        // Dropped without shutdown: simulates a crash
    }

    let workflow = workflow_at(dir.path());
    let recovered = workflow.startup().await.unwrap();
    assert_eq!(recovered, 1);
    assert_eq!(
        workflow.agent_run("orphan").unwrap().outcome.as_deref(),
        Some("interrupted")
    );
    workflow.shutdown();
}

#[tokio::test]
async fn answer_prompt_records_the_response() {
    let dir = tempfile::tempdir().unwrap();
    let workflow = workflow_at(dir.path());
    seeded(&workflow);
    workflow
        .store()
        .put_prompt(crew_core::PendingPrompt {
            id: "p1".to_string(),
            task_id: "t1".to_string(),
            agent_run_id: "r1".to_string(),
            prompt_type: "needs_info".to_string(),
            payload: serde_json::json!({}),
            response: None,
            status: crew_core::PromptStatus::Pending,
            created_at_ms: 0,
            answered_at_ms: None,
        })
        .unwrap();

    workflow
        .answer_prompt("p1", serde_json::json!({ "answer": "use sqlite" }))
        .unwrap();

    let prompts = workflow.pending_prompts_for_run("r1");
    assert_eq!(prompts[0].status, crew_core::PromptStatus::Answered);
    assert_eq!(prompts[0].answered_at_ms, Some(1_000));

    // Answering twice is refused
    assert!(workflow.answer_prompt("p1", serde_json::json!({})).is_err());
}

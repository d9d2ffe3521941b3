//! Shared harness for the behavioral specs.

use crew_adapters::{FakeGitOps, FakeNotifyAdapter, FakeQueryAgent, FakeScmPlatform};
use crew_core::{
    AgentRun, FakeClock, Pipeline, Project, SequentialIdGen, StatusDef, Task, Transition,
};
use crew_engine::{Workflow, WorkflowConfig, WorkflowDeps};
use std::time::Duration;

pub type TestWorkflow = Workflow<
    FakeGitOps,
    FakeScmPlatform,
    FakeQueryAgent,
    FakeNotifyAdapter,
    FakeClock,
    SequentialIdGen,
>;

pub struct Harness {
    pub _dir: tempfile::TempDir,
    pub workflow: TestWorkflow,
    pub git: FakeGitOps,
    pub scm: FakeScmPlatform,
    pub agent: FakeQueryAgent,
    pub notifier: FakeNotifyAdapter,
    pub clock: FakeClock,
}

/// A workflow over fake adapters in a temp state dir, seeded with one
/// project.
pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let git = FakeGitOps::new();
    let scm = FakeScmPlatform::new();
    let agent = FakeQueryAgent::new();
    let notifier = FakeNotifyAdapter::new();
    let clock = FakeClock::at(1_000);

    let workflow = Workflow::new(
        WorkflowConfig::at(dir.path().join("state")),
        WorkflowDeps {
            git: git.clone(),
            scm: scm.clone(),
            agent: agent.clone(),
            notifier: notifier.clone(),
            clock: clock.clone(),
            id_gen: SequentialIdGen::new("id"),
        },
    )
    .unwrap();

    workflow
        .add_project(Project {
            id: "proj-1".to_string(),
            name: "demo".to_string(),
            repo_path: dir.path().join("repo"),
            default_branch: "main".to_string(),
            config: Default::default(),
        })
        .unwrap();

    Harness {
        _dir: dir,
        workflow,
        git,
        scm,
        agent,
        notifier,
        clock,
    }
}

pub fn status(name: &str, is_final: bool) -> StatusDef {
    StatusDef {
        name: name.to_string(),
        label: name.to_string(),
        color: None,
        is_final,
    }
}

pub fn pipeline(statuses: Vec<StatusDef>, transitions: Vec<Transition>) -> Pipeline {
    Pipeline {
        id: "dev".to_string(),
        name: "Development".to_string(),
        task_type: "feature".to_string(),
        statuses,
        transitions,
        revision: String::new(),
    }
}

pub fn task(id: &str, status: &str) -> Task {
    Task::builder()
        .id(id)
        .project_id("proj-1")
        .pipeline_id("dev")
        .status(status)
        .title("Add full-text search")
        .build()
}

/// Poll until the task shows the expected status.
pub async fn wait_for_status(workflow: &TestWorkflow, task_id: &str, status: &str) -> Task {
    for _ in 0..500 {
        if let Some(task) = workflow.task(task_id) {
            if task.status == status {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {task_id} never reached status {status}");
}

/// Poll until the predicate holds.
pub async fn wait_until(mut predicate: impl FnMut() -> bool, what: &str) {
    for _ in 0..500 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Poll until the task has a terminal run, returning it.
pub async fn wait_for_terminal_run(workflow: &TestWorkflow, task_id: &str) -> AgentRun {
    for _ in 0..500 {
        if let Some(run) = workflow
            .runs_for_task(task_id)
            .into_iter()
            .find(|r| r.is_terminal())
        {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no terminal run for task {task_id}");
}

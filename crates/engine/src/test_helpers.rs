// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use crate::executor::AgentExecutor;
use crate::hooks::HookEnv;
use crate::pipeline::PipelineEngine;
use crate::worktree::WorktreeRegistry;
use crate::{guards, hooks, ExecuteRequest};
use crew_adapters::{FakeGitOps, FakeNotifyAdapter, FakeQueryAgent, FakeScmPlatform};
use crew_core::{
    AgentRun, FakeClock, Pipeline, Project, SequentialIdGen, StatusDef, Task, Transition,
};
use crew_storage::Store;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub fn status(name: &str, is_final: bool) -> StatusDef {
    StatusDef {
        name: name.to_string(),
        label: name.to_string(),
        color: None,
        is_final,
    }
}

/// A pipeline over open/implementing/pr_review/done with the given
/// transitions.
pub fn pipeline_with(transitions: Vec<Transition>) -> Pipeline {
    Pipeline {
        id: "dev".to_string(),
        name: "Development".to_string(),
        task_type: "feature".to_string(),
        statuses: vec![
            status("open", false),
            status("implementing", false),
            status("pr_review", false),
            status("done", true),
        ],
        transitions,
        revision: String::new(),
    }
}

pub fn project() -> Project {
    Project {
        id: "proj-1".to_string(),
        name: "demo".to_string(),
        repo_path: std::env::temp_dir().join("crew-test-repo"),
        default_branch: "main".to_string(),
        config: Default::default(),
    }
}

pub struct EngineHarness {
    pub _dir: TempDir,
    pub store: Store,
    pub engine: Arc<PipelineEngine<FakeClock, SequentialIdGen>>,
    pub clock: FakeClock,
}

/// Store + engine with built-in guards, seeded with a pipeline and a
/// task.
pub fn engine_with(pipeline: Pipeline, task: Task) -> EngineHarness {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    store.put_project(project()).unwrap();
    store.put_pipeline(pipeline).unwrap();
    store.put_task(task).unwrap();

    let clock = FakeClock::at(1_000);
    let engine = Arc::new(PipelineEngine::new(
        store.clone(),
        clock.clone(),
        SequentialIdGen::new("id"),
    ));
    guards::register_builtins(&engine);

    EngineHarness {
        _dir: dir,
        store,
        engine,
        clock,
    }
}

pub type TestExecutor =
    AgentExecutor<FakeGitOps, FakeQueryAgent, FakeNotifyAdapter, FakeClock, SequentialIdGen>;

pub struct ExecHarness {
    pub _dir: TempDir,
    pub store: Store,
    pub engine: Arc<PipelineEngine<FakeClock, SequentialIdGen>>,
    pub executor: TestExecutor,
    pub git: FakeGitOps,
    pub scm: FakeScmPlatform,
    pub agent: FakeQueryAgent,
    pub notifier: FakeNotifyAdapter,
    pub clock: FakeClock,
    pub run_rx: mpsc::UnboundedReceiver<ExecuteRequest>,
    pub worktrees: Arc<WorktreeRegistry<FakeGitOps>>,
}

/// Full executor harness over fake adapters, with built-in guards and
/// hooks registered. `run_rx` receives `start_agent` hook requests.
pub fn exec_harness(pipeline: Pipeline, task: Task, project: Project) -> ExecHarness {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("store")).unwrap();
    store.put_project(project).unwrap();
    store.put_pipeline(pipeline).unwrap();
    store.put_task(task).unwrap();

    let clock = FakeClock::at(1_000);
    let id_gen = SequentialIdGen::new("id");
    let git = FakeGitOps::new();
    let scm = FakeScmPlatform::new();
    let agent = FakeQueryAgent::new();
    let notifier = FakeNotifyAdapter::new();

    let engine = Arc::new(PipelineEngine::new(
        store.clone(),
        clock.clone(),
        id_gen.clone(),
    ));
    guards::register_builtins(&engine);

    let worktrees = Arc::new(WorktreeRegistry::new(
        dir.path().join("worktrees"),
        git.clone(),
    ));
    let (run_tx, run_rx) = mpsc::unbounded_channel();
    let activity = crate::ActivityLogger::new(store.clone(), clock.clone(), id_gen.clone());
    hooks::register_builtins(
        &engine,
        HookEnv {
            store: store.clone(),
            activity,
            git: git.clone(),
            scm: scm.clone(),
            notifier: notifier.clone(),
            worktrees: worktrees.clone(),
            run_tx,
            clock: clock.clone(),
            id_gen: id_gen.clone(),
        },
    );

    let executor = AgentExecutor::new(
        store.clone(),
        engine.clone(),
        git.clone(),
        agent.clone(),
        notifier.clone(),
        worktrees.clone(),
        clock.clone(),
        id_gen,
    );

    ExecHarness {
        _dir: dir,
        store,
        engine,
        executor,
        git,
        scm,
        agent,
        notifier,
        clock,
        run_rx,
        worktrees,
    }
}

/// Poll until the run reaches a terminal status.
pub async fn wait_for_terminal(store: &Store, run_id: &str) -> AgentRun {
    for _ in 0..500 {
        if let Some(run) = store.agent_run(run_id) {
            if run.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("run {run_id} never reached a terminal status");
}

/// Poll until the task shows the expected status.
pub async fn wait_for_status(store: &Store, task_id: &str, status: &str) -> Task {
    for _ in 0..500 {
        if let Some(task) = store.task(task_id) {
            if task.status == status {
                return task;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("task {task_id} never reached status {status}");
}

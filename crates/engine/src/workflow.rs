// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow facade: the orchestration API external callers see.
//!
//! Construction wires the store, the pipeline engine with its built-in
//! guards and hooks, the executor, and the supervisor together.
//! `startup` takes an exclusive lock on the state directory (one
//! process per host), reaps orphaned runs, and starts the supervisor.

use crate::activity::ActivityLogger;
use crate::error::EngineError;
use crate::executor::{AgentExecutor, ExecuteRequest, RunCallbacks};
use crate::hooks::HookEnv;
use crate::pipeline::{PipelineEngine, TransitionGroups};
use crate::supervisor::AgentSupervisor;
use crate::transition::{GuardCheck, TransitionContext, TransitionOutcome};
use crate::worktree::WorktreeRegistry;
use crate::{guards, hooks};
use crew_adapters::{GitOps, NotifyAdapter, QueryAgent, ScmPlatform};
use crew_core::{
    AgentRun, Clock, IdGen, PendingPrompt, Pipeline, Project, PromptStatus, Task, TaskEvent,
    Transition, Trigger, DEFAULT_SUPERVISOR_PERIOD_MS,
};
use crew_storage::Store;
use fs2::FileExt;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Filesystem layout and tuning for a workflow instance.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub state_dir: PathBuf,
    pub supervisor_period: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let state_dir = dirs::state_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("crew");
        Self {
            state_dir,
            supervisor_period: Duration::from_millis(DEFAULT_SUPERVISOR_PERIOD_MS),
        }
    }
}

impl WorkflowConfig {
    pub fn at(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ..Self::default()
        }
    }
}

/// External capabilities injected at construction.
pub struct WorkflowDeps<G, P, Q, N, C, I>
where
    G: GitOps,
    P: ScmPlatform,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub git: G,
    pub scm: P,
    pub agent: Q,
    pub notifier: N,
    pub clock: C,
    pub id_gen: I,
}

/// The assembled orchestrator.
pub struct Workflow<G, P, Q, N, C, I>
where
    G: GitOps,
    P: ScmPlatform,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    store: Store,
    engine: Arc<PipelineEngine<C, I>>,
    executor: AgentExecutor<G, Q, N, C, I>,
    supervisor: AgentSupervisor<G, Q, N, C, I>,
    activity: ActivityLogger<C, I>,
    clock: C,
    id_gen: I,
    state_dir: PathBuf,
    lock_file: Mutex<Option<File>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    // P only appears in the hook environment
    _scm: std::marker::PhantomData<P>,
}

impl<G, P, Q, N, C, I> Workflow<G, P, Q, N, C, I>
where
    G: GitOps,
    P: ScmPlatform,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    /// Wire everything together. No background work starts until
    /// `startup`.
    pub fn new(config: WorkflowConfig, deps: WorkflowDeps<G, P, Q, N, C, I>) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.state_dir)
            .map_err(|e| EngineError::Startup(format!("cannot create state dir: {e}")))?;
        let store = Store::open(&config.state_dir.join("store"))?;

        let engine = Arc::new(PipelineEngine::new(
            store.clone(),
            deps.clock.clone(),
            deps.id_gen.clone(),
        ));
        guards::register_builtins(&engine);

        let (run_tx, mut run_rx) = mpsc::unbounded_channel::<ExecuteRequest>();
        let worktrees = Arc::new(WorktreeRegistry::new(
            config.state_dir.join("worktrees"),
            deps.git.clone(),
        ));
        let activity = ActivityLogger::new(store.clone(), deps.clock.clone(), deps.id_gen.clone());

        hooks::register_builtins(
            &engine,
            HookEnv {
                store: store.clone(),
                activity: activity.clone(),
                git: deps.git.clone(),
                scm: deps.scm.clone(),
                notifier: deps.notifier.clone(),
                worktrees: worktrees.clone(),
                run_tx,
                clock: deps.clock.clone(),
                id_gen: deps.id_gen.clone(),
            },
        );

        let executor = AgentExecutor::new(
            store.clone(),
            engine.clone(),
            deps.git.clone(),
            deps.agent.clone(),
            deps.notifier.clone(),
            worktrees,
            deps.clock.clone(),
            deps.id_gen.clone(),
        );

        let dispatcher_executor = executor.clone();
        let dispatcher = tokio::spawn(async move {
            while let Some(request) = run_rx.recv().await {
                if let Err(e) = dispatcher_executor
                    .execute(&request.task_id, &request.mode, &request.agent_type, None)
                    .await
                {
                    tracing::warn!(
                        task_id = %request.task_id,
                        mode = %request.mode,
                        error = %e,
                        "queued agent run could not start"
                    );
                }
            }
        });

        let supervisor = AgentSupervisor::new(
            store.clone(),
            executor.clone(),
            activity.clone(),
            deps.clock.clone(),
            config.supervisor_period,
        );

        Ok(Self {
            store,
            engine,
            executor,
            supervisor,
            activity,
            clock: deps.clock,
            id_gen: deps.id_gen,
            state_dir: config.state_dir,
            lock_file: Mutex::new(None),
            dispatcher: Mutex::new(Some(dispatcher)),
            _scm: std::marker::PhantomData,
        })
    }

    /// Take the single-process lock, reap orphaned runs, start the
    /// supervisor. Returns how many runs were recovered.
    pub async fn startup(&self) -> Result<usize, EngineError> {
        let lock_path = self.state_dir.join("crew.lock");
        let file = File::create(&lock_path)
            .map_err(|e| EngineError::Startup(format!("cannot create lock file: {e}")))?;
        file.try_lock_exclusive().map_err(|_| {
            EngineError::Startup(format!(
                "another crew instance holds {}",
                lock_path.display()
            ))
        })?;
        *self.lock_file.lock() = Some(file);

        let recovered = self.executor.recover_orphaned_runs().await?;
        if !recovered.is_empty() {
            tracing::info!(count = recovered.len(), "recovered orphaned agent runs");
        }
        self.supervisor.start();
        Ok(recovered.len())
    }

    /// Stop background work and release the state lock.
    pub fn shutdown(&self) {
        self.supervisor.stop();
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.abort();
        }
        if let Err(e) = self.store.checkpoint() {
            tracing::warn!(error = %e, "checkpoint on shutdown failed");
        }
        if let Some(file) = self.lock_file.lock().take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn engine(&self) -> &Arc<PipelineEngine<C, I>> {
        &self.engine
    }

    pub fn executor(&self) -> &AgentExecutor<G, Q, N, C, I> {
        &self.executor
    }

    pub fn supervisor(&self) -> &AgentSupervisor<G, Q, N, C, I> {
        &self.supervisor
    }

    pub fn add_project(&self, project: Project) -> Result<(), EngineError> {
        self.store.put_project(project)?;
        Ok(())
    }

    /// Register a pipeline, stamping its content hash as the advisory
    /// revision.
    pub fn add_pipeline(&self, mut pipeline: Pipeline) -> Result<(), EngineError> {
        pipeline.revision = String::new();
        let serialized = serde_json::to_string(&pipeline).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        pipeline.revision = format!("{:x}", hasher.finalize());
        self.store.put_pipeline(pipeline)?;
        Ok(())
    }

    /// Create a task. Its initial status must name a state of its
    /// pipeline; a missing id is assigned.
    pub fn create_task(&self, mut task: Task) -> Result<Task, EngineError> {
        if task.id.is_empty() {
            task.id = self.id_gen.next();
        }
        let pipeline = self
            .store
            .pipeline(&task.pipeline_id)
            .ok_or_else(|| EngineError::PipelineNotFound(task.pipeline_id.clone()))?;
        if !pipeline.has_status(&task.status) {
            return Err(EngineError::InvalidRequest(format!(
                "initial status '{}' is not defined by pipeline '{}'",
                task.status, pipeline.id
            )));
        }
        self.store.put_task(task.clone())?;
        self.activity.info(
            &task.id,
            "task",
            format!("task created in '{}'", task.status),
            serde_json::json!({ "pipeline": task.pipeline_id }),
        );
        Ok(task)
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.store.task(task_id)
    }

    fn load_task(&self, task_id: &str) -> Result<Task, EngineError> {
        self.store
            .task(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    /// Drive a manual transition.
    pub async fn transition(
        &self,
        task_id: &str,
        to_status: &str,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome, EngineError> {
        let task = self.load_task(task_id)?;
        self.engine
            .execute_transition(&task, to_status, TransitionContext::manual(actor))
            .await
    }

    /// Drive a transition bypassing guards.
    pub async fn force_transition(
        &self,
        task_id: &str,
        to_status: &str,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome, EngineError> {
        let task = self.load_task(task_id)?;
        self.engine
            .execute_force_transition(&task, to_status, TransitionContext::manual(actor))
            .await
    }

    /// Route an agent outcome: `(taskId, outcome, {agentRunId, payload,
    /// branch})`.
    pub async fn agent_outcome(
        &self,
        task_id: &str,
        outcome: &str,
        data: Value,
    ) -> Result<TransitionOutcome, EngineError> {
        let task = self.load_task(task_id)?;
        self.engine.execute_agent_outcome(&task, outcome, data).await
    }

    /// Dry-run the guards for a candidate transition.
    pub fn check_guards(
        &self,
        task_id: &str,
        to_status: &str,
        trigger: Trigger,
    ) -> Result<Option<GuardCheck>, EngineError> {
        let task = self.load_task(task_id)?;
        let context = TransitionContext {
            trigger,
            actor: None,
            data: None,
            agent_outcome: None,
        };
        self.engine.check_guards(&task, to_status, &context)
    }

    pub fn valid_transitions(
        &self,
        task_id: &str,
        trigger: Option<Trigger>,
    ) -> Result<Vec<Transition>, EngineError> {
        let task = self.load_task(task_id)?;
        self.engine.valid_transitions(&task, trigger)
    }

    pub fn all_transitions(&self, task_id: &str) -> Result<TransitionGroups, EngineError> {
        let task = self.load_task(task_id)?;
        self.engine.all_transitions(&task)
    }

    /// Start an agent run directly (outside any transition hook).
    pub async fn start_agent(
        &self,
        task_id: &str,
        mode: &str,
        agent_type: &str,
        callbacks: Option<RunCallbacks>,
    ) -> Result<AgentRun, EngineError> {
        self.executor.execute(task_id, mode, agent_type, callbacks).await
    }

    pub fn stop_agent(&self, run_id: &str) -> Result<(), EngineError> {
        self.executor.stop(run_id)
    }

    pub fn queue_message(&self, task_id: &str, text: &str) {
        self.executor.queue_message(task_id, text);
    }

    pub fn agent_run(&self, run_id: &str) -> Option<AgentRun> {
        self.store.agent_run(run_id)
    }

    pub fn runs_for_task(&self, task_id: &str) -> Vec<AgentRun> {
        self.store.runs_for_task(task_id)
    }

    pub fn task_events(&self, task_id: &str) -> Vec<TaskEvent> {
        self.store.events_for_task(task_id)
    }

    /// Record a human answer on a pending prompt.
    pub fn answer_prompt(&self, prompt_id: &str, response: Value) -> Result<(), EngineError> {
        let found = self.store.with_txn(|txn| {
            let Some(mut prompt) = txn.state().prompts.get(prompt_id).cloned() else {
                return false;
            };
            if prompt.status != PromptStatus::Pending {
                return false;
            }
            prompt.status = PromptStatus::Answered;
            prompt.response = Some(response.clone());
            prompt.answered_at_ms = Some(self.clock.epoch_ms());
            txn.put_prompt(prompt);
            true
        })?;
        if !found {
            return Err(EngineError::InvalidRequest(format!(
                "prompt '{prompt_id}' is not pending"
            )));
        }
        Ok(())
    }

    pub fn pending_prompts_for_run(&self, run_id: &str) -> Vec<PendingPrompt> {
        self.store.prompts_for_run(run_id)
    }

    pub fn checkpoint(&self) -> Result<(), EngineError> {
        self.store.checkpoint()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent executor: one background task per agent run.
//!
//! `execute` persists a `running` AgentRun and returns immediately;
//! the lifecycle (prepare worktree, stream the agent, validate-retry,
//! finalize and route the outcome back through the pipeline engine)
//! proceeds on a detached tokio task. The in-memory live map is the
//! authoritative set the supervisor reconciles against; entries are
//! removed in the background task's final cleanup on every exit path.

use crate::activity::ActivityLogger;
use crate::error::EngineError;
use crate::pipeline::PipelineEngine;
use crate::worktree::{Worktree, WorktreeManager, WorktreeRegistry};
use crate::{extract, reconcile, template, validate};
use crew_adapters::{
    AgentExit, AgentMessage, AgentQuery, ContentBlock, GitError, GitOps, NotifyAdapter, QueryAgent,
};
use crew_core::{
    format_elapsed_ms, truncate_utf8, validate_outcome_payload, AgentRun, AgentRunStatus, Clock,
    IdGen, ImplementationPhase, PhaseStatus, Project, Task, TaskContextEntry,
};
use crew_core::{ArtifactKind, TaskArtifact};
use crew_storage::Store;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// In-memory output buffer cap. Overflow is truncated with a sentinel;
/// later chunks are dropped but DB flushes continue.
const OUTPUT_CAP_BYTES: usize = 5 * 1024 * 1024;
const OUTPUT_CAP_SENTINEL: &str = "\n[output truncated at 5 MiB]";

/// Progressive flush cadence for the run row.
const FLUSH_PERIOD: Duration = Duration::from_secs(3);

/// Tool-use inputs are previewed, not mirrored, in stream messages.
const TOOL_INPUT_PREVIEW_BYTES: usize = 240;

/// Request to start an agent run, sent by the `start_agent` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub task_id: String,
    pub mode: String,
    pub agent_type: String,
}

/// Streamed event for a UI following a run.
#[derive(Debug, Clone)]
pub enum RunStreamEvent {
    /// Raw assistant text
    Output(String),
    /// Structured message (text, tool_use, tool_result)
    Message(Value),
    /// Run status change
    Status {
        run_id: String,
        status: AgentRunStatus,
    },
}

/// Callback slot installed per task.
#[derive(Debug, Clone)]
pub struct RunCallbacks {
    pub events: mpsc::UnboundedSender<RunStreamEvent>,
}

struct LiveRun {
    task_id: String,
    cancel: Arc<Notify>,
}

/// Mutable accumulators for one run.
#[derive(Default)]
struct RunState {
    output: String,
    truncated: bool,
    input_tokens: u64,
    output_tokens: u64,
    message_count: u32,
    outcome: Option<String>,
    structured_output: Option<Value>,
    flush_errors: u64,
    sdk_tasks: reconcile::SdkTaskMap,
}

/// How one streaming attempt ended.
struct AttemptEnd {
    exit: Option<AgentExit>,
    cancelled: bool,
    timed_out: bool,
    stream_error: Option<String>,
}

struct Inner<G, Q, N, C, I>
where
    G: GitOps,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    store: Store,
    engine: Arc<PipelineEngine<C, I>>,
    git: G,
    agent: Q,
    notifier: N,
    worktrees: Arc<WorktreeRegistry<G>>,
    clock: C,
    id_gen: I,
    activity: ActivityLogger<C, I>,
    live: Mutex<HashMap<String, LiveRun>>,
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    callbacks: Mutex<HashMap<String, RunCallbacks>>,
}

/// Background executor for agent runs.
pub struct AgentExecutor<G, Q, N, C, I>
where
    G: GitOps,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    inner: Arc<Inner<G, Q, N, C, I>>,
}

impl<G, Q, N, C, I> Clone for AgentExecutor<G, Q, N, C, I>
where
    G: GitOps,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<G, Q, N, C, I> AgentExecutor<G, Q, N, C, I>
where
    G: GitOps,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        engine: Arc<PipelineEngine<C, I>>,
        git: G,
        agent: Q,
        notifier: N,
        worktrees: Arc<WorktreeRegistry<G>>,
        clock: C,
        id_gen: I,
    ) -> Self {
        let activity = ActivityLogger::new(store.clone(), clock.clone(), id_gen.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                engine,
                git,
                agent,
                notifier,
                worktrees,
                clock,
                id_gen,
                activity,
                live: Mutex::new(HashMap::new()),
                queues: Mutex::new(HashMap::new()),
                callbacks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The authoritative set of runs this process is executing.
    pub fn live_run_ids(&self) -> HashSet<String> {
        self.inner.live.lock().keys().cloned().collect()
    }

    /// Queue a message for the task's current run (picked up by the
    /// next attempt's prompt) or for the run drained after it.
    pub fn queue_message(&self, task_id: &str, text: &str) {
        self.inner
            .queues
            .lock()
            .entry(task_id.to_string())
            .or_default()
            .push_back(text.to_string());
    }

    /// Install the callback slot for a task's runs.
    pub fn install_callbacks(&self, task_id: &str, callbacks: RunCallbacks) {
        self.inner
            .callbacks
            .lock()
            .insert(task_id.to_string(), callbacks);
    }

    /// Start an agent run. Returns the persisted `running` row; the
    /// work proceeds asynchronously.
    pub async fn execute(
        &self,
        task_id: &str,
        mode: &str,
        agent_type: &str,
        callbacks: Option<RunCallbacks>,
    ) -> Result<AgentRun, EngineError> {
        let task = self
            .inner
            .store
            .task(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let project = self
            .inner
            .store
            .project(&task.project_id)
            .ok_or_else(|| EngineError::ProjectNotFound(task.project_id.clone()))?;

        let run = AgentRun {
            id: self.inner.id_gen.next(),
            task_id: task_id.to_string(),
            agent_type: agent_type.to_string(),
            mode: mode.to_string(),
            status: AgentRunStatus::Running,
            output: String::new(),
            outcome: None,
            payload: None,
            exit_code: None,
            started_at_ms: self.inner.clock.epoch_ms(),
            completed_at_ms: None,
            cost_input_tokens: 0,
            cost_output_tokens: 0,
            message_count: 0,
            timeout_ms: Some(project.config.agent_timeout_ms),
            max_turns: project.config.max_turns,
            prompt: String::new(),
            error: None,
        };
        self.inner.store.put_run(run.clone())?;

        if let Some(callbacks) = callbacks {
            self.install_callbacks(task_id, callbacks);
        }

        let cancel = Arc::new(Notify::new());
        self.inner.live.lock().insert(
            run.id.clone(),
            LiveRun {
                task_id: task_id.to_string(),
                cancel: cancel.clone(),
            },
        );

        self.inner.activity.info(
            task_id,
            "agent",
            format!("agent run started (mode {mode})"),
            json!({ "runId": run.id, "agentType": agent_type }),
        );

        let executor = self.clone();
        let spawned_run = run.clone();
        tokio::spawn(async move {
            let run_id = spawned_run.id.clone();
            let task_id = spawned_run.task_id.clone();
            let mode = spawned_run.mode.clone();
            let agent_type = spawned_run.agent_type.clone();

            // Top-level guard: any unhandled error becomes a failed
            // run. Silent hangs are forbidden.
            if let Err(e) = executor.run_lifecycle(spawned_run, cancel).await {
                executor.fail_run_internal(&run_id, &task_id, &e.to_string()).await;
            }

            executor.inner.live.lock().remove(&run_id);
            executor.finish_task_slot(&task_id, &mode, &agent_type).await;
        });

        Ok(run)
    }

    /// Cooperatively cancel a live run.
    pub fn stop(&self, run_id: &str) -> Result<(), EngineError> {
        let live = self.inner.live.lock();
        let run = live
            .get(run_id)
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))?;
        run.cancel.notify_one();
        Ok(())
    }

    /// Reap every `running` row left behind by a previous process.
    /// Called once at startup; applying it twice is idempotent.
    pub async fn recover_orphaned_runs(&self) -> Result<Vec<AgentRun>, EngineError> {
        let running = self.inner.store.running_runs();
        let mut recovered = Vec::new();

        for orphan in running {
            let updated = self.inner.store.with_txn(|txn| {
                let mut run = txn.agent_run(&orphan.id)?;
                if run.status.is_terminal() {
                    return None;
                }
                run.status = AgentRunStatus::Failed;
                run.outcome = Some("interrupted".to_string());
                run.error = Some("interrupted by restart".to_string());
                run.completed_at_ms = Some(self.inner.clock.epoch_ms());
                run.output.push_str("\n[run interrupted: recovered after restart]");
                txn.put_run(run.clone());
                Some(run)
            })?;

            let Some(run) = updated else { continue };
            self.release_worktree_lock(&run.task_id);
            self.inner.store.expire_prompts_for_run(&run.id)?;
            self.inner.activity.warning(
                &run.task_id,
                "agent",
                format!("agent run {} interrupted by restart", run.id),
                json!({ "runId": run.id }),
            );
            recovered.push(run);
        }

        Ok(recovered)
    }

    fn emit(&self, task_id: &str, event: RunStreamEvent) {
        if let Some(callbacks) = self.inner.callbacks.lock().get(task_id) {
            let _ = callbacks.events.send(event);
        }
    }

    fn release_worktree_lock(&self, task_id: &str) {
        let Some(task) = self.inner.store.task(task_id) else {
            return;
        };
        let Some(project) = self.inner.store.project(&task.project_id) else {
            return;
        };
        // Tolerates "already gone": a hook may have deleted the
        // worktree first.
        self.inner.worktrees.for_project(&project).unlock(task_id);
    }

    /// After a run finishes: re-invoke for queued messages, or tear
    /// down the per-task slots when nothing remains.
    ///
    /// Returns a type-erased future: draining re-enters `execute`,
    /// and the cycle would otherwise make the async types infinite.
    fn finish_task_slot(
        &self,
        task_id: &str,
        mode: &str,
        agent_type: &str,
    ) -> crate::registry::BoxFuture<()> {
        let executor = self.clone();
        let task_id = task_id.to_string();
        let mode = mode.to_string();
        let agent_type = agent_type.to_string();
        Box::pin(async move {
            let any_live = executor
                .inner
                .live
                .lock()
                .values()
                .any(|l| l.task_id == task_id);
            if any_live {
                return;
            }

            let has_queued = executor
                .inner
                .queues
                .lock()
                .get(&task_id)
                .is_some_and(|q| !q.is_empty());
            if has_queued {
                tracing::info!(task_id = %task_id, "draining queued message into a new run");
                if let Err(e) = executor.execute(&task_id, &mode, &agent_type, None).await {
                    executor.inner.activity.error(
                        &task_id,
                        "agent",
                        format!("failed to drain queued message: {e}"),
                        json!(null),
                    );
                }
                return;
            }

            executor.inner.queues.lock().remove(&task_id);
            executor.inner.callbacks.lock().remove(&task_id);
        })
    }

    /// Last-resort failure path for internal errors.
    async fn fail_run_internal(&self, run_id: &str, task_id: &str, error: &str) {
        tracing::error!(run_id, error, "agent run failed internally");
        let result = self.inner.store.with_txn(|txn| {
            if let Some(mut run) = txn.agent_run(run_id) {
                if run.status.is_terminal() {
                    return;
                }
                run.status = AgentRunStatus::Failed;
                run.error = Some(error.to_string());
                run.output.push_str(&format!("\nInternal error: {error}"));
                run.completed_at_ms = Some(self.inner.clock.epoch_ms());
                txn.put_run(run);
            }
        });
        if let Err(e) = result {
            tracing::error!(run_id, error = %e, "failed to persist internal run failure");
        }
        self.release_worktree_lock(task_id);
        if let Err(e) = self.inner.store.expire_prompts_for_run(run_id) {
            tracing::warn!(run_id, error = %e, "failed to expire prompts");
        }
        self.inner.activity.error(
            task_id,
            "agent",
            format!("agent run failed internally: {error}"),
            json!({ "runId": run_id }),
        );
        self.emit(
            task_id,
            RunStreamEvent::Status {
                run_id: run_id.to_string(),
                status: AgentRunStatus::Failed,
            },
        );
    }

    /// Prepare → Execute → (Validate ↻)* → Finalize.
    async fn run_lifecycle(&self, run: AgentRun, cancel: Arc<Notify>) -> Result<(), EngineError> {
        let run_id = run.id.clone();
        let task_id = run.task_id.clone();
        let mode = run.mode.clone();

        // --- Prepare ---------------------------------------------------
        let (task, phase_index) = self.ensure_active_phase(&task_id, &mode).await?;
        let project = self
            .inner
            .store
            .project(&task.project_id)
            .ok_or_else(|| EngineError::ProjectNotFound(task.project_id.clone()))?;

        let branch = if task.is_multi_phase() {
            format!("task/{}/implement/phase-{}", task.id, phase_index + 1)
        } else {
            format!("task/{}/{}", task.id, mode)
        };
        self.inner.store.with_txn(|txn| {
            if let Some(mut fresh) = txn.task(&task_id) {
                fresh.branch_name = Some(branch.clone());
                fresh.updated_at_ms = self.inner.clock.epoch_ms();
                txn.put_task(fresh);
            }
        })?;

        let manager = self.inner.worktrees.for_project(&project);
        let worktree = match manager.get(&task_id) {
            Some(worktree) => worktree,
            None => {
                let worktree = manager.create(&branch, &task_id).await?;
                self.inner.activity.info(
                    &task_id,
                    "worktree",
                    format!("worktree created on branch {branch}"),
                    json!({ "path": worktree.path }),
                );
                worktree
            }
        };
        if let Err(e) = manager.lock(&task_id) {
            tracing::warn!(task_id = %task_id, error = %e, "could not lock worktree");
        }

        if let Err(e) = self.inner.git.clean(&worktree.path).await {
            self.inner.activity.warning(
                &task_id,
                "worktree",
                format!("worktree clean failed: {e}"),
                json!(null),
            );
        }

        if mode != "resolve_conflicts" {
            self.fetch_and_rebase(&task_id, &worktree, &project).await;
        }

        let context_entries = self.inner.store.context_for_task(&task_id);
        let queued: Vec<String> = self
            .inner
            .queues
            .lock()
            .get_mut(&task_id)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default();
        let prompt = template::build_prompt(&task, &mode, &context_entries, &queued, None);

        self.inner.store.with_txn(|txn| {
            if let Some(mut fresh) = txn.agent_run(&run_id) {
                fresh.prompt = prompt.clone();
                txn.put_run(fresh);
            }
        })?;

        // --- Execute + validate loop -----------------------------------
        let timeout_ms = run
            .timeout_ms
            .unwrap_or(crew_core::DEFAULT_AGENT_TIMEOUT_MS);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        let skip_validation = mode.starts_with("plan")
            || mode.starts_with("investigate")
            || mode.starts_with("technical_design");

        let mut state = RunState::default();
        let mut current_prompt = prompt;
        let mut attempt = 0u32;
        let end = loop {
            let end = self
                .stream_one_attempt(
                    &run_id,
                    &task_id,
                    &run.agent_type,
                    &current_prompt,
                    &worktree,
                    run.max_turns,
                    deadline,
                    cancel.as_ref(),
                    &mut state,
                )
                .await;

            if end.cancelled || end.timed_out || end.stream_error.is_some() {
                break end;
            }
            let exit_ok = end.exit.is_some_and(|e| e.exit_code == 0);
            if !exit_ok || skip_validation || project.config.validation_commands.is_empty() {
                break end;
            }

            let report =
                validate::run_validation_commands(&project.config.validation_commands, &worktree.path)
                    .await;
            if report.passed() {
                break end;
            }
            if attempt >= project.config.max_validation_retries {
                self.inner.activity.warning(
                    &task_id,
                    "validation",
                    format!("validation still failing after {attempt} retries, giving up"),
                    json!({ "errors": report.summary() }),
                );
                break end;
            }

            attempt += 1;
            self.inner.activity.warning(
                &task_id,
                "validation",
                format!("validation failed, re-running agent (attempt {attempt})"),
                json!({ "errors": report.summary() }),
            );
            current_prompt = template::build_prompt(
                &task,
                &mode,
                &context_entries,
                &queued,
                Some(&report.summary()),
            );
        };

        // --- Finalize --------------------------------------------------
        self.finalize_run(&run, &project, &worktree, &branch, end, state)
            .await
    }

    async fn fetch_and_rebase(&self, task_id: &str, worktree: &Worktree, project: &Project) {
        if let Err(e) = self.inner.git.fetch(&worktree.path, "origin").await {
            self.inner.activity.warning(
                task_id,
                "worktree",
                format!("fetch failed, proceeding on stale base: {e}"),
                json!(null),
            );
            return;
        }
        let onto = format!("origin/{}", project.default_branch);
        if let Err(e) = self.inner.git.rebase(&worktree.path, &onto).await {
            let _ = self.inner.git.rebase_abort(&worktree.path).await;
            self.inner.activity.warning(
                task_id,
                "worktree",
                format!("rebase onto {onto} failed, proceeding on stale base: {e}"),
                json!(null),
            );
        }
    }

    /// Find or activate the phase this run works on, creating one for
    /// tasks that have none.
    async fn ensure_active_phase(
        &self,
        task_id: &str,
        mode: &str,
    ) -> Result<(Task, usize), EngineError> {
        let updated = self.inner.store.with_txn(|txn| {
            let mut task = txn.task(task_id)?;
            let index = if task.phases.is_empty() {
                task.phases.push(ImplementationPhase {
                    id: "phase-1".to_string(),
                    name: mode.to_string(),
                    status: PhaseStatus::InProgress,
                    subtasks: Vec::new(),
                    pr_link: None,
                });
                0
            } else if let Some(i) = task.active_phase() {
                i
            } else if let Some(i) = task.next_pending_phase() {
                task.phases[i].status = PhaseStatus::InProgress;
                i
            } else {
                // All phases terminal: re-run against the last one
                task.phases.len() - 1
            };
            task.updated_at_ms = self.inner.clock.epoch_ms();
            txn.put_task(task.clone());
            Some((task, index))
        })?;
        updated.ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_one_attempt(
        &self,
        run_id: &str,
        task_id: &str,
        agent_type: &str,
        prompt: &str,
        worktree: &Worktree,
        max_turns: Option<u32>,
        deadline: tokio::time::Instant,
        cancel: &Notify,
        state: &mut RunState,
    ) -> AttemptEnd {
        let (tx, mut rx) = mpsc::channel::<AgentMessage>(64);
        let query = AgentQuery {
            agent_type: agent_type.to_string(),
            prompt: prompt.to_string(),
            workdir: worktree.path.clone(),
            max_turns,
            output_schema: None,
        };
        let agent = self.inner.agent.clone();
        let handle = tokio::spawn(async move { agent.query(query, tx).await });

        let mut flush = tokio::time::interval_at(
            tokio::time::Instant::now() + FLUSH_PERIOD,
            FLUSH_PERIOD,
        );
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut cancelled = false;
        let mut timed_out = false;

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => self.handle_message(task_id, message, state),
                    None => break,
                },
                _ = cancel.notified() => {
                    cancelled = true;
                    handle.abort();
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    timed_out = true;
                    handle.abort();
                    break;
                }
                _ = flush.tick() => self.flush_run(run_id, state),
            }
        }
        self.flush_run(run_id, state);

        if cancelled || timed_out {
            return AttemptEnd {
                exit: None,
                cancelled,
                timed_out,
                stream_error: None,
            };
        }

        match handle.await {
            Ok(Ok(exit)) => AttemptEnd {
                exit: Some(exit),
                cancelled: false,
                timed_out: false,
                stream_error: None,
            },
            Ok(Err(e)) => AttemptEnd {
                exit: None,
                cancelled: false,
                timed_out: false,
                stream_error: Some(e.to_string()),
            },
            Err(join_error) => AttemptEnd {
                exit: None,
                cancelled: false,
                timed_out: false,
                stream_error: Some(format!("agent task aborted: {join_error}")),
            },
        }
    }

    fn handle_message(&self, task_id: &str, message: AgentMessage, state: &mut RunState) {
        state.message_count += 1;
        match message {
            AgentMessage::Assistant { blocks } => {
                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => {
                            self.append_output(state, &text);
                            self.emit(task_id, RunStreamEvent::Output(text.clone()));
                            self.emit(
                                task_id,
                                RunStreamEvent::Message(json!({ "type": "text", "text": text })),
                            );
                        }
                        ContentBlock::ToolUse { name, id, input } => {
                            let preview =
                                truncate_utf8(&input.to_string(), TOOL_INPUT_PREVIEW_BYTES)
                                    .to_string();
                            self.emit(
                                task_id,
                                RunStreamEvent::Message(json!({
                                    "type": "tool_use",
                                    "toolName": name,
                                    "toolId": id,
                                    "input": preview,
                                })),
                            );
                            self.intercept_tool_use(task_id, &name, &input, state);
                        }
                    }
                }
            }
            AgentMessage::Result {
                outcome,
                structured_output,
                usage,
            } => {
                if let Some(usage) = usage {
                    state.input_tokens += usage.input_tokens;
                    state.output_tokens += usage.output_tokens;
                }
                if outcome.is_some() {
                    state.outcome = outcome;
                }
                if structured_output.is_some() {
                    state.structured_output = structured_output;
                }
            }
            AgentMessage::ToolResult {
                tool_use_id,
                content,
            } => {
                self.emit(
                    task_id,
                    RunStreamEvent::Message(json!({
                        "type": "tool_result",
                        "toolId": tool_use_id,
                        "content": content,
                    })),
                );
            }
            AgentMessage::System { kind } => {
                self.append_output(state, &format!("[{kind}]\n"));
            }
        }
    }

    fn intercept_tool_use(&self, task_id: &str, name: &str, input: &Value, state: &mut RunState) {
        match name {
            "TodoWrite" => {
                let todos = reconcile::parse_todos(input);
                if !todos.is_empty() {
                    self.update_task_subtasks(task_id, |task| {
                        reconcile::reconcile_todos(task, &todos)
                    });
                }
            }
            "TaskCreate" => {
                reconcile::apply_task_create(&mut state.sdk_tasks, input, None);
            }
            "TaskUpdate" => {
                let map = &state.sdk_tasks;
                self.update_task_subtasks(task_id, |task| {
                    reconcile::apply_task_update(task, map, input)
                });
            }
            _ => {}
        }
    }

    fn update_task_subtasks(&self, task_id: &str, apply: impl FnOnce(&mut Task) -> bool) {
        let result = self.inner.store.with_txn(|txn| {
            if let Some(mut task) = txn.task(task_id) {
                if apply(&mut task) {
                    task.updated_at_ms = self.inner.clock.epoch_ms();
                    txn.put_task(task);
                }
            }
        });
        if let Err(e) = result {
            tracing::warn!(task_id, error = %e, "subtask reconciliation failed");
        }
    }

    fn append_output(&self, state: &mut RunState, text: &str) {
        if state.truncated {
            return;
        }
        if state.output.len() + text.len() > OUTPUT_CAP_BYTES {
            let remaining = OUTPUT_CAP_BYTES.saturating_sub(state.output.len());
            state.output.push_str(truncate_utf8(text, remaining));
            state.output.push_str(OUTPUT_CAP_SENTINEL);
            state.truncated = true;
            return;
        }
        state.output.push_str(text);
    }

    fn flush_run(&self, run_id: &str, state: &mut RunState) {
        let result = self.inner.store.with_txn(|txn| {
            if let Some(mut run) = txn.agent_run(run_id) {
                if run.status.is_terminal() {
                    return;
                }
                run.output = state.output.clone();
                run.cost_input_tokens = state.input_tokens;
                run.cost_output_tokens = state.output_tokens;
                run.message_count = state.message_count;
                txn.put_run(run);
            }
        });
        if let Err(e) = result {
            state.flush_errors += 1;
            if state.flush_errors == 1 || state.flush_errors % 10 == 0 {
                tracing::warn!(run_id, count = state.flush_errors, error = %e, "run flush failed");
            }
        }
    }

    /// Write the terminal run row. Terminal statuses never change, so
    /// the update is skipped when another reaper got there first.
    fn complete_run_row(
        &self,
        run_id: &str,
        status: AgentRunStatus,
        outcome: Option<String>,
        payload: Option<Value>,
        exit_code: Option<i32>,
        error: Option<String>,
        state: &RunState,
    ) -> Result<(), EngineError> {
        self.inner.store.with_txn(|txn| {
            if let Some(mut run) = txn.agent_run(run_id) {
                if run.status.is_terminal() {
                    return;
                }
                run.status = status;
                run.outcome = outcome;
                run.payload = payload;
                run.exit_code = exit_code;
                run.error = error;
                run.output = state.output.clone();
                run.cost_input_tokens = state.input_tokens;
                run.cost_output_tokens = state.output_tokens;
                run.message_count = state.message_count;
                run.completed_at_ms = Some(self.inner.clock.epoch_ms());
                txn.put_run(run);
            }
        })?;
        Ok(())
    }

    fn mark_phase_failed(&self, task_id: &str) {
        let result = self.inner.store.with_txn(|txn| {
            if let Some(mut task) = txn.task(task_id) {
                if let Some(i) = task.active_phase() {
                    task.phases[i].status = PhaseStatus::Failed;
                    task.updated_at_ms = self.inner.clock.epoch_ms();
                    txn.put_task(task);
                }
            }
        });
        if let Err(e) = result {
            tracing::warn!(task_id, error = %e, "failed to mark phase failed");
        }
    }

    async fn finalize_run(
        &self,
        run: &AgentRun,
        project: &Project,
        worktree: &Worktree,
        branch: &str,
        end: AttemptEnd,
        mut state: RunState,
    ) -> Result<(), EngineError> {
        let run_id = &run.id;
        let task_id = &run.task_id;
        let mode = &run.mode;
        let manager: Arc<WorktreeManager<G>> = self.inner.worktrees.for_project(project);
        let elapsed = self
            .inner
            .clock
            .epoch_ms()
            .saturating_sub(run.started_at_ms);

        if end.cancelled {
            self.complete_run_row(
                run_id,
                AgentRunStatus::Cancelled,
                None,
                None,
                None,
                Some("stopped by user".to_string()),
                &state,
            )?;
            // Cancellation flushes the task's queue and callback slot;
            // a later execute starts fresh.
            self.inner.queues.lock().remove(task_id);
            manager.unlock(task_id);
            self.inner.store.expire_prompts_for_run(run_id)?;
            self.inner.activity.info(
                task_id,
                "agent",
                format!("agent run cancelled after {}", format_elapsed_ms(elapsed)),
                json!({ "runId": run_id }),
            );
            self.emit(
                task_id,
                RunStreamEvent::Status {
                    run_id: run_id.clone(),
                    status: AgentRunStatus::Cancelled,
                },
            );
            self.inner.callbacks.lock().remove(task_id);
            return Ok(());
        }

        if end.timed_out {
            self.complete_run_row(
                run_id,
                AgentRunStatus::TimedOut,
                None,
                None,
                None,
                Some(format!("timed out after {}", format_elapsed_ms(elapsed))),
                &state,
            )?;
            manager.unlock(task_id);
            self.inner.store.expire_prompts_for_run(run_id)?;
            self.inner.activity.warning(
                task_id,
                "agent",
                format!("agent run timed out after {}", format_elapsed_ms(elapsed)),
                json!({ "runId": run_id }),
            );
            if let Some(task) = self.inner.store.task(task_id) {
                self.inner
                    .engine
                    .execute_agent_outcome(
                        &task,
                        "failed",
                        json!({ "outcome": "failed", "agentRunId": run_id }),
                    )
                    .await?;
            }
            self.emit(
                task_id,
                RunStreamEvent::Status {
                    run_id: run_id.clone(),
                    status: AgentRunStatus::TimedOut,
                },
            );
            return Ok(());
        }

        if let Some(stream_error) = end.stream_error {
            self.mark_phase_failed(task_id);
            self.complete_run_row(
                run_id,
                AgentRunStatus::Failed,
                Some("failed".to_string()),
                None,
                None,
                Some(stream_error.clone()),
                &state,
            )?;
            manager.unlock(task_id);
            self.inner.store.expire_prompts_for_run(run_id)?;
            self.inner.activity.error(
                task_id,
                "agent",
                format!("agent stream failed: {stream_error}"),
                json!({ "runId": run_id }),
            );
            if let Some(task) = self.inner.store.task(task_id) {
                self.inner
                    .engine
                    .execute_agent_outcome(
                        &task,
                        "failed",
                        json!({ "outcome": "failed", "agentRunId": run_id }),
                    )
                    .await?;
            }
            self.emit(
                task_id,
                RunStreamEvent::Status {
                    run_id: run_id.clone(),
                    status: AgentRunStatus::Failed,
                },
            );
            return Ok(());
        }

        let exit_code = end.exit.map(|e| e.exit_code).unwrap_or(-1);

        if exit_code != 0 {
            self.mark_phase_failed(task_id);
            self.complete_run_row(
                run_id,
                AgentRunStatus::Failed,
                Some("failed".to_string()),
                None,
                Some(exit_code),
                Some(format!("agent exited with code {exit_code}")),
                &state,
            )?;
            manager.unlock(task_id);
            self.inner.store.expire_prompts_for_run(run_id)?;
            self.inner.activity.warning(
                task_id,
                "agent",
                format!("agent run failed (exit {exit_code}) after {}", format_elapsed_ms(elapsed)),
                json!({ "runId": run_id }),
            );
            if let Some(task) = self.inner.store.task(task_id) {
                self.inner
                    .engine
                    .execute_agent_outcome(
                        &task,
                        "failed",
                        json!({ "outcome": "failed", "agentRunId": run_id }),
                    )
                    .await?;
            }
            self.notify_completion(task_id, "failed").await;
            self.emit(
                task_id,
                RunStreamEvent::Status {
                    run_id: run_id.clone(),
                    status: AgentRunStatus::Failed,
                },
            );
            return Ok(());
        }

        // --- Success path ----------------------------------------------
        let mut effective_outcome = state.outcome.clone().unwrap_or_default();

        let validation = validate_outcome_payload(&effective_outcome, state.structured_output.as_ref());
        if !validation.valid {
            // Warn-and-proceed: a malformed payload does not stop the
            // outcome from routing.
            self.inner.activity.warning(
                task_id,
                "agent",
                format!(
                    "outcome payload invalid for '{effective_outcome}': {}",
                    validation.error.unwrap_or_default()
                ),
                json!({ "runId": run_id }),
            );
        }

        self.apply_mode_outputs(task_id, mode, &state);

        if let Err(e) = self.inner.store.append_context(TaskContextEntry {
            id: self.inner.id_gen.next(),
            task_id: task_id.clone(),
            agent_run_id: Some(run_id.clone()),
            kind: if mode.starts_with("plan") || mode.starts_with("investigate") {
                "plan_summary".to_string()
            } else {
                "run_summary".to_string()
            },
            content: extract::summary_of(&state.output),
            created_at_ms: self.inner.clock.epoch_ms(),
        }) {
            tracing::warn!(task_id = %task_id, error = %e, "failed to persist context entry");
        }

        if !effective_outcome.is_empty() {
            if let Err(e) = self.inner.store.append_artifact(TaskArtifact {
                id: self.inner.id_gen.next(),
                task_id: task_id.clone(),
                kind: ArtifactKind::Branch,
                data: json!({ "branch": branch }),
                created_at_ms: self.inner.clock.epoch_ms(),
            }) {
                tracing::warn!(task_id = %task_id, error = %e, "failed to persist branch artifact");
            }
        }

        if effective_outcome == "pr_ready" {
            effective_outcome = self
                .qualify_pr_ready(task_id, worktree, project, branch)
                .await;
        }

        self.complete_run_row(
            run_id,
            AgentRunStatus::Completed,
            Some(effective_outcome.clone()).filter(|o| !o.is_empty()),
            state.structured_output.clone(),
            Some(0),
            None,
            &state,
        )?;

        if !effective_outcome.is_empty() {
            if let Some(task) = self.inner.store.task(task_id) {
                self.inner
                    .engine
                    .execute_agent_outcome(
                        &task,
                        &effective_outcome,
                        json!({
                            "outcome": effective_outcome,
                            "agentRunId": run_id,
                            "payload": state.structured_output,
                            "branch": branch,
                        }),
                    )
                    .await?;
            }
        }

        manager.unlock(task_id);
        self.inner.store.expire_prompts_for_run(run_id)?;

        self.inner.activity.info(
            task_id,
            "agent",
            format!(
                "agent run completed ({}) in {}",
                if effective_outcome.is_empty() {
                    "no outcome"
                } else {
                    &effective_outcome
                },
                format_elapsed_ms(elapsed)
            ),
            json!({ "runId": run_id, "outcome": effective_outcome }),
        );
        self.emit(
            task_id,
            RunStreamEvent::Status {
                run_id: run_id.clone(),
                status: AgentRunStatus::Completed,
            },
        );
        self.notify_completion(task_id, &effective_outcome).await;

        // Drop the accumulators explicitly: everything durable is on
        // the run row now.
        state.output.clear();
        Ok(())
    }

    /// Install plan/design outputs on the task for the modes that
    /// produce them.
    fn apply_mode_outputs(&self, task_id: &str, mode: &str, state: &RunState) {
        let planning = matches!(mode, "plan" | "plan_revision" | "investigate");
        let design = mode == "technical_design" || mode == "technical_design_revision";
        if !planning && !design {
            return;
        }
        let revision = mode.ends_with("_revision");
        let plan = extract::extract_plan(state.structured_output.as_ref(), &state.output);

        let result = self.inner.store.with_txn(|txn| {
            if let Some(mut task) = txn.task(task_id) {
                extract::apply_plan_to_task(&mut task, plan, revision);
                task.updated_at_ms = self.inner.clock.epoch_ms();
                txn.put_task(task);
            }
        });
        if let Err(e) = result {
            tracing::warn!(task_id, error = %e, "failed to install plan output");
        }
    }

    /// `pr_ready` only survives when the branch actually differs from
    /// the base and rebases cleanly.
    async fn qualify_pr_ready(
        &self,
        task_id: &str,
        worktree: &Worktree,
        project: &Project,
        branch: &str,
    ) -> String {
        let base = format!("origin/{}", project.default_branch);

        match self.inner.git.diff(&worktree.path, &base, Some(branch)).await {
            Ok(diff) if diff.trim().is_empty() => {
                self.inner.activity.warning(
                    task_id,
                    "agent",
                    "branch has no changes against the base, downgrading outcome to no_changes",
                    json!({ "branch": branch }),
                );
                return "no_changes".to_string();
            }
            Ok(_) => {}
            Err(e) => {
                self.inner.activity.warning(
                    task_id,
                    "agent",
                    format!("diff check failed, keeping pr_ready: {e}"),
                    json!(null),
                );
                return "pr_ready".to_string();
            }
        }

        if let Err(e) = self.inner.git.fetch(&worktree.path, "origin").await {
            tracing::warn!(task_id, error = %e, "pre-PR fetch failed");
        }
        match self.inner.git.rebase(&worktree.path, &base).await {
            Ok(()) => "pr_ready".to_string(),
            Err(GitError::RebaseConflict { .. }) => {
                let _ = self.inner.git.rebase_abort(&worktree.path).await;
                self.inner.activity.warning(
                    task_id,
                    "agent",
                    "pre-PR rebase hit conflicts, downgrading outcome to conflicts_detected",
                    json!({ "branch": branch }),
                );
                "conflicts_detected".to_string()
            }
            Err(e) => {
                self.inner.activity.warning(
                    task_id,
                    "agent",
                    format!("pre-PR rebase failed, keeping pr_ready: {e}"),
                    json!(null),
                );
                "pr_ready".to_string()
            }
        }
    }

    async fn notify_completion(&self, task_id: &str, outcome: &str) {
        let title = self
            .inner
            .store
            .task(task_id)
            .map(|t| t.title)
            .unwrap_or_else(|| task_id.to_string());
        let body = if outcome.is_empty() {
            "Agent finished".to_string()
        } else {
            format!("Agent finished: {outcome}")
        };
        if let Err(e) = self.inner.notifier.notify(&title, &body).await {
            tracing::warn!(task_id, error = %e, "completion notification failed");
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

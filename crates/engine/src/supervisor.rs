// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent supervisor: periodic ghost and timeout reconciliation.
//!
//! A polling loop compares the store's `running` rows against the
//! executor's in-memory live set. A row with no live execution is a
//! ghost (a crash or a lost task) and is reaped as interrupted; a live
//! row past its timeout is stopped and marked timed out, the safety
//! net for an executor timer that never fired. Errors are swallowed
//! and logged; the loop never dies.

use crate::activity::ActivityLogger;
use crate::executor::AgentExecutor;
use crew_adapters::{GitOps, NotifyAdapter, QueryAgent};
use crew_core::{AgentRunStatus, Clock, IdGen, DEFAULT_AGENT_TIMEOUT_MS};
use crew_storage::Store;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Periodic reconciler of persisted run state against live executions.
pub struct AgentSupervisor<G, Q, N, C, I>
where
    G: GitOps,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    store: Store,
    executor: AgentExecutor<G, Q, N, C, I>,
    activity: ActivityLogger<C, I>,
    clock: C,
    period: Duration,
    default_timeout_ms: u64,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<G, Q, N, C, I> AgentSupervisor<G, Q, N, C, I>
where
    G: GitOps,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub fn new(
        store: Store,
        executor: AgentExecutor<G, Q, N, C, I>,
        activity: ActivityLogger<C, I>,
        clock: C,
        period: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            activity,
            clock,
            period,
            default_timeout_ms: DEFAULT_AGENT_TIMEOUT_MS,
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the polling loop. Idempotent: a running loop is left
    /// alone.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let supervisor = self.clone_parts();
        let period = self.period;
        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                supervisor.tick();
            }
        }));
        tracing::info!(period_ms = self.period.as_millis() as u64, "supervisor started");
    }

    /// Stop the loop. Safe without a prior `start()`; calling twice is
    /// a no-op.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            tracing::info!("supervisor stopped");
        }
    }

    fn clone_parts(&self) -> SupervisorTick<G, Q, N, C, I> {
        SupervisorTick {
            store: self.store.clone(),
            executor: self.executor.clone(),
            activity: self.activity.clone(),
            clock: self.clock.clone(),
            default_timeout_ms: self.default_timeout_ms,
        }
    }

    /// Run one reconciliation pass immediately (test hook).
    pub fn tick_once(&self) {
        self.clone_parts().tick();
    }
}

struct SupervisorTick<G, Q, N, C, I>
where
    G: GitOps,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    store: Store,
    executor: AgentExecutor<G, Q, N, C, I>,
    activity: ActivityLogger<C, I>,
    clock: C,
    default_timeout_ms: u64,
}

impl<G, Q, N, C, I> SupervisorTick<G, Q, N, C, I>
where
    G: GitOps,
    Q: QueryAgent,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    /// One pass. Never propagates: errors are logged and the next tick
    /// gets another chance.
    fn tick(&self) {
        let running = self.store.running_runs();
        if running.is_empty() {
            return;
        }
        let live = self.executor.live_run_ids();
        let now = self.clock.epoch_ms();

        for run in running {
            if !live.contains(&run.id) {
                self.reap_ghost(&run.id, &run.task_id);
                continue;
            }

            let timeout_ms = run.timeout_ms.unwrap_or(self.default_timeout_ms);
            if now.saturating_sub(run.started_at_ms) > timeout_ms {
                self.reap_timeout(&run.id, &run.task_id, timeout_ms);
            }
        }
    }

    fn reap_ghost(&self, run_id: &str, task_id: &str) {
        let result = self.store.with_txn(|txn| {
            if let Some(mut run) = txn.agent_run(run_id) {
                if run.status.is_terminal() {
                    return;
                }
                run.status = AgentRunStatus::Failed;
                run.outcome = Some("interrupted".to_string());
                run.error = Some("no live execution for this run".to_string());
                run.output.push_str("\n[Ghost run: no live execution, reaped by supervisor]");
                run.completed_at_ms = Some(self.clock.epoch_ms());
                txn.put_run(run);
            }
        });
        match result {
            Ok(()) => self.activity.warning(
                task_id,
                "agent",
                format!("Ghost run {run_id} reaped: running row with no live execution"),
                json!({ "runId": run_id }),
            ),
            Err(e) => tracing::warn!(run_id, error = %e, "failed to reap ghost run"),
        }
    }

    fn reap_timeout(&self, run_id: &str, task_id: &str, timeout_ms: u64) {
        // Mark first so the executor's cancel path sees a terminal row
        // and leaves the status alone.
        let result = self.store.with_txn(|txn| {
            if let Some(mut run) = txn.agent_run(run_id) {
                if run.status.is_terminal() {
                    return;
                }
                run.status = AgentRunStatus::TimedOut;
                run.error = Some(format!("supervisor timeout after {timeout_ms}ms"));
                run.completed_at_ms = Some(self.clock.epoch_ms());
                txn.put_run(run);
            }
        });
        if let Err(e) = result {
            tracing::warn!(run_id, error = %e, "failed to mark run timed out");
            return;
        }

        if let Err(e) = self.executor.stop(run_id) {
            // The run may have finished between the query and the stop
            tracing::debug!(run_id, error = %e, "stop during timeout reap");
        }

        self.activity.warning(
            task_id,
            "agent",
            format!("run {run_id} exceeded its {timeout_ms}ms timeout, reaped by supervisor"),
            json!({ "runId": run_id, "timeoutMs": timeout_ms }),
        );
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;

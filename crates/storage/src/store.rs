// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store front door: synchronous transactions over materialized
//! state with WAL durability.
//!
//! A transaction holds the state mutex for its whole scope, so a
//! read-then-update sequence inside one `with_txn` call cannot
//! interleave with any other writer. This is the atomic scope the
//! pipeline engine's concurrent-modification check relies on. Reads
//! see committed state; staged writes become visible (and durable)
//! at commit.

use crate::migration::MigrationRegistry;
use crate::{Snapshot, SnapshotError, StateChange, StoreState, Wal, WalError};
use crew_core::{
    AgentRun, PendingPrompt, Pipeline, Project, PromptStatus, Task, TaskArtifact,
    TaskContextEntry, TaskEvent, TransitionRecord,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

struct Inner {
    state: StoreState,
    wal: Wal,
    snapshot_path: PathBuf,
}

/// Shared handle to the persistent store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<Inner>>,
}

/// An open transaction. Reads go against committed state; writes are
/// staged and applied + WAL-flushed when the `with_txn` closure
/// returns.
pub struct Txn<'a> {
    state: &'a StoreState,
    staged: Vec<StateChange>,
}

impl<'a> Txn<'a> {
    /// Read-only view of the committed state, for guard queries.
    pub fn state(&self) -> &'a StoreState {
        self.state
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.state.tasks.get(id).cloned()
    }

    pub fn pipeline(&self, id: &str) -> Option<Pipeline> {
        self.state.pipelines.get(id).cloned()
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.state.projects.get(id).cloned()
    }

    pub fn agent_run(&self, id: &str) -> Option<AgentRun> {
        self.state.agent_runs.get(id).cloned()
    }

    pub fn put_task(&mut self, task: Task) {
        self.staged.push(StateChange::TaskPut { task });
    }

    pub fn delete_task(&mut self, task_id: impl Into<String>) {
        self.staged.push(StateChange::TaskDeleted {
            task_id: task_id.into(),
        });
    }

    pub fn put_pipeline(&mut self, pipeline: Pipeline) {
        self.staged.push(StateChange::PipelinePut { pipeline });
    }

    pub fn put_project(&mut self, project: Project) {
        self.staged.push(StateChange::ProjectPut { project });
    }

    pub fn put_run(&mut self, run: AgentRun) {
        self.staged.push(StateChange::AgentRunPut { run });
    }

    pub fn put_prompt(&mut self, prompt: PendingPrompt) {
        self.staged.push(StateChange::PromptPut { prompt });
    }

    pub fn append_artifact(&mut self, artifact: TaskArtifact) {
        self.staged.push(StateChange::ArtifactAppended { artifact });
    }

    pub fn append_context(&mut self, entry: TaskContextEntry) {
        self.staged.push(StateChange::ContextAppended { entry });
    }

    pub fn append_event(&mut self, event: TaskEvent) {
        self.staged.push(StateChange::EventAppended { event });
    }

    pub fn append_history(&mut self, record: TransitionRecord) {
        self.staged.push(StateChange::HistoryAppended { record });
    }
}

impl Store {
    /// Open the store in `dir`, recovering from snapshot + WAL replay.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        Self::open_with_migrations(dir, &MigrationRegistry::new())
    }

    /// Open with an explicit snapshot migration registry.
    pub fn open_with_migrations(
        dir: &Path,
        migrations: &MigrationRegistry,
    ) -> Result<Self, StoreError> {
        let snapshot_path = dir.join("snapshot.zst");
        let wal_path = dir.join("wal.jsonl");

        let (mut state, snapshot_seq) = match Snapshot::load(&snapshot_path, migrations)? {
            Some(snapshot) => (snapshot.state, snapshot.seq),
            None => (StoreState::default(), 0),
        };

        let wal = Wal::open(&wal_path)?;
        let replayed = wal.entries_after(snapshot_seq)?;
        let replay_count = replayed.len();
        for record in replayed {
            state.apply_change(&record.change);
        }
        if replay_count > 0 {
            info!(replay_count, snapshot_seq, "recovered store from WAL replay");
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                wal,
                snapshot_path,
            })),
        })
    }

    /// Run a synchronous transaction.
    ///
    /// The closure may read committed state and stage writes; when it
    /// returns, staged changes are appended to the WAL, flushed, and
    /// applied to the materialized state, all under the same lock.
    pub fn with_txn<T>(&self, f: impl FnOnce(&mut Txn<'_>) -> T) -> Result<T, StoreError> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let mut txn = Txn {
            state: &inner.state,
            staged: Vec::new(),
        };
        let out = f(&mut txn);
        let staged = txn.staged;

        for change in &staged {
            inner.wal.append(change)?;
        }
        inner.wal.flush()?;
        for change in &staged {
            inner.state.apply_change(change);
        }

        Ok(out)
    }

    /// Clone-out read of a full state view. Prefer the narrower
    /// accessors below; this exists for reporting surfaces.
    pub fn snapshot_state(&self) -> StoreState {
        self.inner.lock().state.clone()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.inner.lock().state.tasks.get(id).cloned()
    }

    pub fn put_task(&self, task: Task) -> Result<(), StoreError> {
        self.with_txn(|txn| txn.put_task(task))
    }

    pub fn delete_task(&self, task_id: &str) -> Result<(), StoreError> {
        self.with_txn(|txn| txn.delete_task(task_id))
    }

    pub fn pipeline(&self, id: &str) -> Option<Pipeline> {
        self.inner.lock().state.pipelines.get(id).cloned()
    }

    pub fn put_pipeline(&self, pipeline: Pipeline) -> Result<(), StoreError> {
        self.with_txn(|txn| txn.put_pipeline(pipeline))
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.inner.lock().state.projects.get(id).cloned()
    }

    pub fn put_project(&self, project: Project) -> Result<(), StoreError> {
        self.with_txn(|txn| txn.put_project(project))
    }

    pub fn agent_run(&self, id: &str) -> Option<AgentRun> {
        self.inner.lock().state.agent_runs.get(id).cloned()
    }

    pub fn put_run(&self, run: AgentRun) -> Result<(), StoreError> {
        self.with_txn(|txn| txn.put_run(run))
    }

    pub fn running_runs(&self) -> Vec<AgentRun> {
        self.inner
            .lock()
            .state
            .running_runs()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn runs_for_task(&self, task_id: &str) -> Vec<AgentRun> {
        self.inner
            .lock()
            .state
            .runs_for_task(task_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn append_event(&self, event: TaskEvent) -> Result<(), StoreError> {
        self.with_txn(|txn| txn.append_event(event))
    }

    pub fn events_for_task(&self, task_id: &str) -> Vec<TaskEvent> {
        self.inner
            .lock()
            .state
            .events_for_task(task_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn append_artifact(&self, artifact: TaskArtifact) -> Result<(), StoreError> {
        self.with_txn(|txn| txn.append_artifact(artifact))
    }

    pub fn artifacts_for_task(&self, task_id: &str) -> Vec<TaskArtifact> {
        self.inner
            .lock()
            .state
            .artifacts_for_task(task_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn append_context(&self, entry: TaskContextEntry) -> Result<(), StoreError> {
        self.with_txn(|txn| txn.append_context(entry))
    }

    pub fn context_for_task(&self, task_id: &str) -> Vec<TaskContextEntry> {
        self.inner
            .lock()
            .state
            .context_for_task(task_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn put_prompt(&self, prompt: PendingPrompt) -> Result<(), StoreError> {
        self.with_txn(|txn| txn.put_prompt(prompt))
    }

    pub fn prompts_for_run(&self, agent_run_id: &str) -> Vec<PendingPrompt> {
        self.inner
            .lock()
            .state
            .prompts_for_run(agent_run_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Expire every prompt still pending for the given run. Called on
    /// every run-termination path.
    pub fn expire_prompts_for_run(&self, agent_run_id: &str) -> Result<usize, StoreError> {
        self.with_txn(|txn| {
            let pending: Vec<PendingPrompt> = txn
                .state()
                .prompts_for_run(agent_run_id)
                .into_iter()
                .filter(|p| p.status == PromptStatus::Pending)
                .cloned()
                .collect();
            let expired = pending.len();
            for mut prompt in pending {
                prompt.status = PromptStatus::Expired;
                txn.put_prompt(prompt);
            }
            expired
        })
    }

    pub fn history_for_task(&self, task_id: &str) -> Vec<TransitionRecord> {
        self.inner
            .lock()
            .state
            .history_for_task(task_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Write a snapshot at the current sequence and truncate the WAL
    /// behind it.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        inner.wal.flush()?;
        let seq = inner.wal.write_seq();
        Snapshot::new(seq, inner.state.clone()).save(&inner.snapshot_path)?;
        inner.wal.truncate_before(seq + 1)?;
        info!(seq, "checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

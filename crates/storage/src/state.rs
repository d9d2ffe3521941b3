// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state built from WAL replay.
//!
//! # Idempotency Requirement
//!
//! All change handlers MUST be idempotent: applying the same change
//! twice must produce the same state as applying it once, because
//! changes are applied both at commit time and again during replay
//! after a crash between WAL flush and snapshot. Puts assign by id;
//! appends are guarded by an id existence check.

use crew_core::{
    AgentRun, AgentRunStatus, PendingPrompt, Pipeline, Project, Task, TaskArtifact,
    TaskContextEntry, TaskEvent, TransitionRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One durable mutation of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateChange {
    ProjectPut { project: Project },
    PipelinePut { pipeline: Pipeline },
    TaskPut { task: Task },
    /// Cascades to runs, artifacts, prompts, context, events, history
    TaskDeleted { task_id: String },
    AgentRunPut { run: AgentRun },
    ArtifactAppended { artifact: TaskArtifact },
    PromptPut { prompt: PendingPrompt },
    ContextAppended { entry: TaskContextEntry },
    EventAppended { event: TaskEvent },
    HistoryAppended { record: TransitionRecord },
}

/// Typed tables materialized from the WAL.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub projects: HashMap<String, Project>,
    #[serde(default)]
    pub pipelines: HashMap<String, Pipeline>,
    #[serde(default)]
    pub tasks: HashMap<String, Task>,
    #[serde(default)]
    pub agent_runs: HashMap<String, AgentRun>,
    #[serde(default)]
    pub artifacts: Vec<TaskArtifact>,
    #[serde(default)]
    pub prompts: HashMap<String, PendingPrompt>,
    #[serde(default)]
    pub context_entries: Vec<TaskContextEntry>,
    #[serde(default)]
    pub events: Vec<TaskEvent>,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
}

impl StoreState {
    /// Apply a change. See the module docs: handlers must stay
    /// idempotent.
    pub fn apply_change(&mut self, change: &StateChange) {
        match change {
            StateChange::ProjectPut { project } => {
                self.projects.insert(project.id.clone(), project.clone());
            }
            StateChange::PipelinePut { pipeline } => {
                self.pipelines.insert(pipeline.id.clone(), pipeline.clone());
            }
            StateChange::TaskPut { task } => {
                self.tasks.insert(task.id.clone(), task.clone());
            }
            StateChange::TaskDeleted { task_id } => {
                self.tasks.remove(task_id);
                self.agent_runs.retain(|_, r| &r.task_id != task_id);
                self.prompts.retain(|_, p| &p.task_id != task_id);
                self.artifacts.retain(|a| &a.task_id != task_id);
                self.context_entries.retain(|c| &c.task_id != task_id);
                self.events.retain(|e| &e.task_id != task_id);
                self.history.retain(|h| &h.task_id != task_id);
            }
            StateChange::AgentRunPut { run } => {
                self.agent_runs.insert(run.id.clone(), run.clone());
            }
            StateChange::ArtifactAppended { artifact } => {
                if !self.artifacts.iter().any(|a| a.id == artifact.id) {
                    self.artifacts.push(artifact.clone());
                }
            }
            StateChange::PromptPut { prompt } => {
                self.prompts.insert(prompt.id.clone(), prompt.clone());
            }
            StateChange::ContextAppended { entry } => {
                if !self.context_entries.iter().any(|c| c.id == entry.id) {
                    self.context_entries.push(entry.clone());
                }
            }
            StateChange::EventAppended { event } => {
                if !self.events.iter().any(|e| e.id == event.id) {
                    self.events.push(event.clone());
                }
            }
            StateChange::HistoryAppended { record } => {
                if !self.history.iter().any(|h| h.id == record.id) {
                    self.history.push(record.clone());
                }
            }
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn pipeline(&self, id: &str) -> Option<&Pipeline> {
        self.pipelines.get(id)
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.get(id)
    }

    pub fn agent_run(&self, id: &str) -> Option<&AgentRun> {
        self.agent_runs.get(id)
    }

    /// Runs for a task, oldest first.
    pub fn runs_for_task(&self, task_id: &str) -> Vec<&AgentRun> {
        let mut runs: Vec<_> = self
            .agent_runs
            .values()
            .filter(|r| r.task_id == task_id)
            .collect();
        runs.sort_by_key(|r| (r.started_at_ms, r.id.clone()));
        runs
    }

    /// All runs currently in `running` state, across tasks.
    pub fn running_runs(&self) -> Vec<&AgentRun> {
        self.agent_runs
            .values()
            .filter(|r| r.status == AgentRunStatus::Running)
            .collect()
    }

    /// Number of running runs owned by the given task.
    pub fn running_run_count(&self, task_id: &str) -> usize {
        self.agent_runs
            .values()
            .filter(|r| r.task_id == task_id && r.status == AgentRunStatus::Running)
            .count()
    }

    /// Number of this task's runs that ended with the given outcome.
    pub fn count_runs_with_outcome(&self, task_id: &str, outcome: &str) -> usize {
        self.agent_runs
            .values()
            .filter(|r| r.task_id == task_id && r.outcome.as_deref() == Some(outcome))
            .count()
    }

    /// Number of dependency tasks not yet in a final pipeline state.
    pub fn unresolved_dependency_count(&self, task: &Task) -> usize {
        task.depends_on
            .iter()
            .filter(|dep_id| {
                match self.tasks.get(*dep_id) {
                    Some(dep) => self
                        .pipelines
                        .get(&dep.pipeline_id)
                        .map(|p| !p.is_final(&dep.status))
                        // Unknown pipeline: treat as unresolved
                        .unwrap_or(true),
                    // Missing dependency rows count as unresolved
                    None => true,
                }
            })
            .count()
    }

    pub fn artifacts_for_task(&self, task_id: &str) -> Vec<&TaskArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.task_id == task_id)
            .collect()
    }

    pub fn prompts_for_run(&self, agent_run_id: &str) -> Vec<&PendingPrompt> {
        self.prompts
            .values()
            .filter(|p| p.agent_run_id == agent_run_id)
            .collect()
    }

    pub fn context_for_task(&self, task_id: &str) -> Vec<&TaskContextEntry> {
        self.context_entries
            .iter()
            .filter(|c| c.task_id == task_id)
            .collect()
    }

    pub fn events_for_task(&self, task_id: &str) -> Vec<&TaskEvent> {
        self.events.iter().filter(|e| e.task_id == task_id).collect()
    }

    pub fn history_for_task(&self, task_id: &str) -> Vec<&TransitionRecord> {
        self.history.iter().filter(|h| h.task_id == task_id).collect()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity: the unit of work driven through a pipeline.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

crate::define_id! {
    /// Unique identifier for a task.
    pub struct TaskId;
}

/// Status of a flat subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Open,
    InProgress,
    Done,
}

impl fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubtaskStatus::Open => write!(f, "open"),
            SubtaskStatus::InProgress => write!(f, "in_progress"),
            SubtaskStatus::Done => write!(f, "done"),
        }
    }
}

/// A checklist item inside a task or phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub name: String,
    pub status: SubtaskStatus,
}

impl Subtask {
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: SubtaskStatus::Open,
        }
    }
}

/// Lifecycle status of an implementation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "pending"),
            PhaseStatus::InProgress => write!(f, "in_progress"),
            PhaseStatus::Completed => write!(f, "completed"),
            PhaseStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A named segment of multi-phase implementation.
///
/// Each phase gets its own branch and PR; subtasks live inside the phase
/// when a task is multi-phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationPhase {
    pub id: String,
    pub name: String,
    pub status: PhaseStatus,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_link: Option<String>,
}

/// The unit of work.
///
/// Invariants:
/// - `status` always names a state defined by `pipeline_id`'s pipeline
/// - at most one phase is `in_progress`
/// - completed phases never regress
/// - `subtasks` is empty when the task is multi-phase (subtasks live
///   inside the phases)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub pipeline_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Current pipeline state name
    pub status: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub phases: Vec<ImplementationPhase>,
    /// Tasks that must reach a final state before this one may advance
    /// past a `dependencies_resolved` guard.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub metadata: IndexMap<String, serde_json::Value>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Task {
    /// True when the task has two or more implementation phases.
    pub fn is_multi_phase(&self) -> bool {
        self.phases.len() >= 2
    }

    /// Index of the phase currently `in_progress`, if any.
    pub fn active_phase(&self) -> Option<usize> {
        self.phases
            .iter()
            .position(|p| p.status == PhaseStatus::InProgress)
    }

    /// Index of the first `pending` phase, if any.
    pub fn next_pending_phase(&self) -> Option<usize> {
        self.phases
            .iter()
            .position(|p| p.status == PhaseStatus::Pending)
    }

    /// The subtask list agent progress reconciles against: phase-local
    /// when multi-phase, task-level otherwise.
    pub fn effective_subtasks(&self) -> &[Subtask] {
        if self.is_multi_phase() {
            match self.active_phase() {
                Some(i) => &self.phases[i].subtasks,
                None => &[],
            }
        } else {
            &self.subtasks
        }
    }

    /// Mutable counterpart of [`Task::effective_subtasks`].
    pub fn effective_subtasks_mut(&mut self) -> &mut Vec<Subtask> {
        if self.is_multi_phase() {
            if let Some(i) = self.active_phase() {
                return &mut self.phases[i].subtasks;
            }
        }
        &mut self.subtasks
    }

    /// Check the phase invariants: at most one `in_progress`, and no
    /// subtasks at task level when multi-phase.
    pub fn phase_invariants_hold(&self) -> bool {
        let in_progress = self
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::InProgress)
            .count();
        in_progress <= 1 && !(self.is_multi_phase() && !self.subtasks.is_empty())
    }
}

/// Builder for `Task` with test defaults.
#[cfg(any(test, feature = "test-support"))]
pub struct TaskBuilder {
    task: Task,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for TaskBuilder {
    fn default() -> Self {
        Self {
            task: Task {
                id: "task-1".to_string(),
                project_id: "proj-1".to_string(),
                pipeline_id: "dev".to_string(),
                title: "Test task".to_string(),
                description: String::new(),
                status: "open".to_string(),
                priority: 0,
                tags: BTreeSet::new(),
                parent_task_id: None,
                feature_id: None,
                assignee: None,
                pr_link: None,
                branch_name: None,
                plan: None,
                subtasks: Vec::new(),
                phases: Vec::new(),
                depends_on: Vec::new(),
                metadata: IndexMap::new(),
                created_at_ms: 0,
                updated_at_ms: 0,
            },
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl TaskBuilder {
    pub fn id(mut self, v: impl Into<String>) -> Self {
        self.task.id = v.into();
        self
    }
    pub fn project_id(mut self, v: impl Into<String>) -> Self {
        self.task.project_id = v.into();
        self
    }
    pub fn pipeline_id(mut self, v: impl Into<String>) -> Self {
        self.task.pipeline_id = v.into();
        self
    }
    pub fn title(mut self, v: impl Into<String>) -> Self {
        self.task.title = v.into();
        self
    }
    pub fn description(mut self, v: impl Into<String>) -> Self {
        self.task.description = v.into();
        self
    }
    pub fn status(mut self, v: impl Into<String>) -> Self {
        self.task.status = v.into();
        self
    }
    pub fn pr_link(mut self, v: impl Into<String>) -> Self {
        self.task.pr_link = Some(v.into());
        self
    }
    pub fn branch_name(mut self, v: impl Into<String>) -> Self {
        self.task.branch_name = Some(v.into());
        self
    }
    pub fn plan(mut self, v: impl Into<String>) -> Self {
        self.task.plan = Some(v.into());
        self
    }
    pub fn subtask(mut self, name: impl Into<String>, status: SubtaskStatus) -> Self {
        self.task.subtasks.push(Subtask {
            name: name.into(),
            status,
        });
        self
    }
    pub fn phase(mut self, name: impl Into<String>, status: PhaseStatus) -> Self {
        let n = self.task.phases.len() + 1;
        self.task.phases.push(ImplementationPhase {
            id: format!("phase-{n}"),
            name: name.into(),
            status,
            subtasks: Vec::new(),
            pr_link: None,
        });
        self
    }
    pub fn depends_on(mut self, v: impl Into<String>) -> Self {
        self.task.depends_on.push(v.into());
        self
    }
    pub fn build(self) -> Task {
        self.task
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Task {
    /// Create a builder with test defaults.
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;

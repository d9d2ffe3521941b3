// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent run entity: one execution of an external agent against a task.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an agent run.
    pub struct AgentRunId;
}

/// Lifecycle status of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    /// Agent is actively working
    Running,
    /// Agent finished and reported an outcome
    Completed,
    /// Agent failed or was reaped after a crash
    Failed,
    /// Stopped cooperatively by the user
    Cancelled,
    /// Killed by the executor's or supervisor's timeout
    TimedOut,
}

impl AgentRunStatus {
    /// Whether this status is terminal. Once terminal, a run's status
    /// never changes again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentRunStatus::Running)
    }
}

impl fmt::Display for AgentRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRunStatus::Running => write!(f, "running"),
            AgentRunStatus::Completed => write!(f, "completed"),
            AgentRunStatus::Failed => write!(f, "failed"),
            AgentRunStatus::Cancelled => write!(f, "cancelled"),
            AgentRunStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// One execution of an agent.
///
/// While `running`, `completed_at_ms` is absent; once terminal the row
/// is never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: String,
    pub task_id: String,
    pub agent_type: String,
    /// Execution mode (plan, implement, pr_review, ...)
    pub mode: String,
    pub status: AgentRunStatus,
    /// Streamed output buffer, capped by the executor
    #[serde(default)]
    pub output: String,
    /// Final outcome classifier reported by the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    /// Structured payload accompanying the outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default)]
    pub cost_input_tokens: u64,
    #[serde(default)]
    pub cost_output_tokens: u64,
    #[serde(default)]
    pub message_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    /// Prompt actually sent to the agent
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentRun {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Builder for `AgentRun` with test defaults.
#[cfg(any(test, feature = "test-support"))]
pub struct AgentRunBuilder {
    run: AgentRun,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for AgentRunBuilder {
    fn default() -> Self {
        Self {
            run: AgentRun {
                id: "run-1".to_string(),
                task_id: "task-1".to_string(),
                agent_type: "claude".to_string(),
                mode: "implement".to_string(),
                status: AgentRunStatus::Running,
                output: String::new(),
                outcome: None,
                payload: None,
                exit_code: None,
                started_at_ms: 0,
                completed_at_ms: None,
                cost_input_tokens: 0,
                cost_output_tokens: 0,
                message_count: 0,
                timeout_ms: None,
                max_turns: None,
                prompt: String::new(),
                error: None,
            },
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl AgentRunBuilder {
    pub fn id(mut self, v: impl Into<String>) -> Self {
        self.run.id = v.into();
        self
    }
    pub fn task_id(mut self, v: impl Into<String>) -> Self {
        self.run.task_id = v.into();
        self
    }
    pub fn mode(mut self, v: impl Into<String>) -> Self {
        self.run.mode = v.into();
        self
    }
    pub fn status(mut self, v: AgentRunStatus) -> Self {
        self.run.status = v;
        self
    }
    pub fn outcome(mut self, v: impl Into<String>) -> Self {
        self.run.outcome = Some(v.into());
        self
    }
    pub fn started_at_ms(mut self, v: u64) -> Self {
        self.run.started_at_ms = v;
        self
    }
    pub fn timeout_ms(mut self, v: u64) -> Self {
        self.run.timeout_ms = Some(v);
        self
    }
    pub fn build(self) -> AgentRun {
        self.run
    }
}

#[cfg(any(test, feature = "test-support"))]
impl AgentRun {
    /// Create a builder with test defaults.
    pub fn builder() -> AgentRunBuilder {
        AgentRunBuilder::default()
    }
}

#[cfg(test)]
#[path = "agent_run_tests.rs"]
mod tests;

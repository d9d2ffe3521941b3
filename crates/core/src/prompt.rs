// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-in-the-loop prompt requests raised by agent runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a pending prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    Pending,
    Answered,
    /// The owning run terminated before an answer arrived
    Expired,
}

impl fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptStatus::Pending => write!(f, "pending"),
            PromptStatus::Answered => write!(f, "answered"),
            PromptStatus::Expired => write!(f, "expired"),
        }
    }
}

/// A question the agent needs a human to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPrompt {
    pub id: String,
    pub task_id: String,
    pub agent_run_id: String,
    pub prompt_type: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    pub status: PromptStatus,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at_ms: Option<u64>,
}

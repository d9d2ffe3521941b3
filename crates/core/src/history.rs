// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transition history: one append-only row per committed status change.

use crate::pipeline::Trigger;
use serde::{Deserialize, Serialize};

/// Result of evaluating one guard during a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardResult {
    pub guard: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GuardResult {
    pub fn allowed(guard: impl Into<String>) -> Self {
        Self {
            guard: guard.into(),
            allowed: true,
            reason: None,
        }
    }

    pub fn blocked(guard: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            guard: guard.into(),
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Audit row recorded inside the transaction that committed a status
/// change, carrying the full guard evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: String,
    pub task_id: String,
    pub from_status: String,
    pub to_status: String,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default)]
    pub guard_results: Vec<GuardResult>,
    pub created_at_ms: u64,
}

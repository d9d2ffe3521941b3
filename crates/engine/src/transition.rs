// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Value types crossing the engine's public boundary.

use crew_core::{GuardResult, HookPolicy, Task, Trigger};
use serde_json::Value;

/// Caller-supplied context for a transition.
#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub trigger: Trigger,
    pub actor: Option<String>,
    /// Free-form payload hooks may consume (outcome payloads, prompt
    /// bodies, branch names)
    pub data: Option<Value>,
    /// Discriminator when `trigger` is `agent`
    pub agent_outcome: Option<String>,
}

impl TransitionContext {
    pub fn manual(actor: Option<&str>) -> Self {
        Self {
            trigger: Trigger::Manual,
            actor: actor.map(str::to_string),
            data: None,
            agent_outcome: None,
        }
    }

    pub fn agent(outcome: &str, data: Value) -> Self {
        Self {
            trigger: Trigger::Agent,
            actor: None,
            data: Some(data),
            agent_outcome: Some(outcome.to_string()),
        }
    }

    pub fn system() -> Self {
        Self {
            trigger: Trigger::System,
            actor: None,
            data: None,
            agent_outcome: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// One guard that refused a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardFailure {
    pub guard: String,
    pub reason: String,
}

/// One hook that failed during or after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    pub hook: String,
    pub policy: HookPolicy,
    pub error: String,
}

/// Result of `execute_transition` and friends.
///
/// `success: false` with empty `guard_failures`/`hook_failures` means
/// the transition never matched (or the task moved underneath the
/// caller); `error` says which.
#[derive(Debug, Clone, Default)]
pub struct TransitionOutcome {
    pub success: bool,
    /// The updated task on success
    pub task: Option<Task>,
    pub error: Option<String>,
    pub guard_failures: Vec<GuardFailure>,
    /// Failures from `best_effort` hooks on success; from the
    /// `required` hook that forced a rollback on failure
    pub hook_failures: Vec<HookFailure>,
}

impl TransitionOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn blocked(guard_failures: Vec<GuardFailure>) -> Self {
        Self {
            success: false,
            guard_failures,
            ..Self::default()
        }
    }
}

/// Dry-run guard evaluation for a candidate transition.
#[derive(Debug, Clone)]
pub struct GuardCheck {
    pub allowed: bool,
    pub results: Vec<GuardResult>,
}

/// Result of an out-of-band hook retry.
#[derive(Debug, Clone)]
pub struct HookRetryResult {
    pub success: bool,
    pub error: Option<String>,
}

/// A transition a hook asks the engine to run after the current one
/// commits (e.g. phase advancement re-entering the implement state).
#[derive(Debug, Clone)]
pub struct FollowUpTransition {
    pub to_status: String,
    pub context: TransitionContext,
}

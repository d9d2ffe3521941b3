// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guard and hook registries.
//!
//! Dynamic dispatch over names: pipelines reference guards and hooks
//! by string, the engine resolves them here at execution time. Both
//! registries are populated at startup; registering a name twice keeps
//! the last registration.
//!
//! Guards are synchronous and run inside the transition's store
//! transaction, so they must not block on I/O, spawn agents, or call
//! back into the engine. Hooks are asynchronous and run after commit.

use crate::transition::{FollowUpTransition, TransitionContext};
use crew_storage::StoreState;
use crew_core::{Task, Transition};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Verdict of a single guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl GuardDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// A registered guard: a pure predicate over the fresh task, the
/// matched transition, the caller context, a read view of the store,
/// and the guard's static params.
pub type GuardFn = Arc<
    dyn Fn(&Task, &Transition, &TransitionContext, &StoreState, Option<&Value>) -> GuardDecision
        + Send
        + Sync,
>;

/// Everything a hook receives.
#[derive(Debug, Clone)]
pub struct HookInput {
    /// The task after the status change committed
    pub task: Task,
    pub transition: Transition,
    /// The status the task held before the transition (the
    /// transition's `from` may be the wildcard)
    pub from_status: String,
    pub context: TransitionContext,
    pub params: Option<Value>,
}

/// What a hook reports back.
#[derive(Debug, Clone, Default)]
pub struct HookOutcome {
    pub success: bool,
    pub error: Option<String>,
    /// A transition to run once the current one has fully settled
    pub follow_up: Option<FollowUpTransition>,
}

impl HookOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            follow_up: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            follow_up: None,
        }
    }

    pub fn ok_with_follow_up(follow_up: FollowUpTransition) -> Self {
        Self {
            success: true,
            error: None,
            follow_up: Some(follow_up),
        }
    }
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A registered hook: an async side effect run after a committed
/// status change.
pub type HookFn = Arc<dyn Fn(HookInput) -> BoxFuture<HookOutcome> + Send + Sync>;

/// Name → guard map.
#[derive(Clone, Default)]
pub struct GuardRegistry {
    guards: Arc<RwLock<HashMap<String, GuardFn>>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a guard. Last registration wins.
    pub fn register(&self, name: &str, guard: GuardFn) {
        self.guards.write().insert(name.to_string(), guard);
    }

    pub fn get(&self, name: &str) -> Option<GuardFn> {
        self.guards.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.guards.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Name → hook map.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Arc<RwLock<HashMap<String, HookFn>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Last registration wins.
    pub fn register(&self, name: &str, hook: HookFn) {
        self.hooks.write().insert(name.to_string(), hook);
    }

    pub fn get(&self, name: &str) -> Option<HookFn> {
        self.hooks.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.hooks.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

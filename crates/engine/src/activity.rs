// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable activity logging.
//!
//! Every human-significant moment (status changes, guard refusals,
//! hook failures, worktree and agent lifecycle) lands as a
//! [`TaskEvent`] row. This is the surface a person debugs from, so
//! writes must never break the engine: store failures are traced and
//! swallowed.

use crew_core::{Clock, IdGen, Severity, TaskEvent};
use crew_storage::Store;
use serde_json::Value;

/// Appends task events to the store.
#[derive(Clone)]
pub struct ActivityLogger<C: Clock, I: IdGen> {
    store: Store,
    clock: C,
    id_gen: I,
}

impl<C: Clock, I: IdGen> ActivityLogger<C, I> {
    pub fn new(store: Store, clock: C, id_gen: I) -> Self {
        Self {
            store,
            clock,
            id_gen,
        }
    }

    /// Append one event row. Failures are traced, never propagated.
    pub fn log(
        &self,
        task_id: &str,
        category: &str,
        severity: Severity,
        message: impl Into<String>,
        data: Value,
    ) {
        let message = message.into();
        tracing::debug!(task_id, category, %severity, %message, "task event");
        let event = TaskEvent {
            id: self.id_gen.next(),
            task_id: task_id.to_string(),
            category: category.to_string(),
            severity,
            message,
            data,
            created_at_ms: self.clock.epoch_ms(),
        };
        if let Err(e) = self.store.append_event(event) {
            tracing::warn!(error = %e, task_id, "failed to persist task event");
        }
    }

    pub fn info(&self, task_id: &str, category: &str, message: impl Into<String>, data: Value) {
        self.log(task_id, category, Severity::Info, message, data);
    }

    pub fn warning(&self, task_id: &str, category: &str, message: impl Into<String>, data: Value) {
        self.log(task_id, category, Severity::Warning, message, data);
    }

    pub fn error(&self, task_id: &str, category: &str, message: impl Into<String>, data: Value) {
        self.log(task_id, category, Severity::Error, message, data);
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;

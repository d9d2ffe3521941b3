// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in guards.
//!
//! Guards are pure predicates over the fresh task and a read view of
//! the store. They run inside the transition's transaction, so they
//! must stay synchronous and query-only.

use crate::registry::{GuardDecision, GuardFn};
use serde_json::Value;
use std::sync::Arc;

/// `has_pr`: the task carries a PR link.
pub fn has_pr() -> GuardFn {
    Arc::new(|task, _transition, _context, _state, _params| {
        if task.pr_link.is_some() {
            GuardDecision::allow()
        } else {
            GuardDecision::block("Task must have a PR link")
        }
    })
}

/// `dependencies_resolved`: every dependency task sits in a final
/// state of its pipeline.
pub fn dependencies_resolved() -> GuardFn {
    Arc::new(|task, _transition, _context, state, _params| {
        let unresolved = state.unresolved_dependency_count(task);
        if unresolved == 0 {
            GuardDecision::allow()
        } else {
            GuardDecision::block(format!("{unresolved} unresolved dependencies"))
        }
    })
}

/// `no_running_agent`: no agent run for this task is currently
/// `running`.
pub fn no_running_agent() -> GuardFn {
    Arc::new(|task, _transition, _context, state, _params| {
        let running = state.running_run_count(&task.id);
        if running == 0 {
            GuardDecision::allow()
        } else {
            GuardDecision::block(format!("{running} agent run(s) still running"))
        }
    })
}

/// `max_retries{max}`: the count of prior runs with outcome `failed`
/// has not exceeded `max`. Count equal to `max` still passes: the
/// guard blocks the attempt after the allowed retries.
pub fn max_retries() -> GuardFn {
    Arc::new(|task, _transition, _context, state, params| {
        let max = params
            .and_then(|p| p.get("max"))
            .and_then(Value::as_u64)
            .unwrap_or(3) as usize;
        let failed = state.count_runs_with_outcome(&task.id, "failed");
        if failed <= max {
            GuardDecision::allow()
        } else {
            GuardDecision::block(format!("retry limit exceeded ({failed} failed runs, max {max})"))
        }
    })
}

/// `has_pending_phases`: the task has phases and at least one is
/// still `pending`.
pub fn has_pending_phases() -> GuardFn {
    Arc::new(|task, _transition, _context, _state, _params| {
        if task.phases.is_empty() {
            return GuardDecision::block("task has no phases");
        }
        if task.next_pending_phase().is_some() {
            GuardDecision::allow()
        } else {
            GuardDecision::block("no pending phases remain")
        }
    })
}

/// Register every built-in guard on the engine.
pub fn register_builtins<C, I>(engine: &crate::PipelineEngine<C, I>)
where
    C: crew_core::Clock,
    I: crew_core::IdGen,
{
    engine.register_guard("has_pr", has_pr());
    engine.register_guard("dependencies_resolved", dependencies_resolved());
    engine.register_guard("no_running_agent", no_running_agent());
    engine.register_guard("max_retries", max_retries());
    engine.register_guard("has_pending_phases", has_pending_phases());
}

#[cfg(test)]
#[path = "guards_tests.rs"]
mod tests;

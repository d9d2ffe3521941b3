//! Behavioral specifications for the crew orchestrator core.
//!
//! These tests drive the workflow facade end-to-end over fake
//! adapters: real store, real engine, real executor and supervisor,
//! scripted git/SCM/agent/notification backends.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

// engine/
#[path = "specs/engine/guards.rs"]
mod engine_guards;
#[path = "specs/engine/rollback.rs"]
mod engine_rollback;
#[path = "specs/engine/transitions.rs"]
mod engine_transitions;

// agent/
#[path = "specs/agent/outcome_routing.rs"]
mod agent_outcome_routing;
#[path = "specs/agent/phases.rs"]
mod agent_phases;
#[path = "specs/agent/supervision.rs"]
mod agent_supervision;

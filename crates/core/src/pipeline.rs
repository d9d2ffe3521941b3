// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline template: the state machine a task type moves through.
//!
//! A pipeline is data, not code. Statuses name the states; transitions
//! are arcs keyed by `(from, to, trigger)` (plus `agent_outcome` when
//! the trigger is `agent`) carrying ordered guard and hook references
//! that the engine resolves against its registries at execution time.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a pipeline template.
    pub struct PipelineId;
}

/// `from` value matching any current status.
pub const WILDCARD_FROM: &str = "*";

/// What kind of actor drives a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A human pressed the button
    Manual,
    /// An agent outcome routed here
    Agent,
    /// The engine itself (e.g. phase advancement)
    System,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Manual => write!(f, "manual"),
            Trigger::Agent => write!(f, "agent"),
            Trigger::System => write!(f, "system"),
        }
    }
}

/// Failure handling policy for a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPolicy {
    /// Failure rolls the status change back
    Required,
    /// Failure is recorded and the transition stands
    #[default]
    BestEffort,
    /// Detached; never awaited, never delays later hooks
    FireAndForget,
}

impl fmt::Display for HookPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPolicy::Required => write!(f, "required"),
            HookPolicy::BestEffort => write!(f, "best_effort"),
            HookPolicy::FireAndForget => write!(f, "fire_and_forget"),
        }
    }
}

/// A state in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDef {
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub is_final: bool,
}

/// Reference to a registered guard, with optional static params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl GuardRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: None,
        }
    }
}

/// Reference to a registered hook, with optional static params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub policy: HookPolicy,
}

impl HookRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: None,
            policy: HookPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: HookPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// An arc in the pipeline.
///
/// At most one transition exists per `(from, to, trigger)`; when the
/// trigger is `agent` the discriminator widens to include
/// `agent_outcome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Status name or [`WILDCARD_FROM`]
    pub from: String,
    pub to: String,
    pub trigger: Trigger,
    /// Only meaningful when `trigger` is `agent`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_outcome: Option<String>,
    #[serde(default)]
    pub guards: Vec<GuardRef>,
    #[serde(default)]
    pub hooks: Vec<HookRef>,
}

impl Transition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            trigger,
            agent_outcome: None,
            guards: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn on_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.agent_outcome = Some(outcome.into());
        self
    }

    pub fn guard(mut self, guard: GuardRef) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn hook(mut self, hook: HookRef) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Whether this arc leaves the given status.
    pub fn leaves(&self, status: &str) -> bool {
        self.from == status || self.from == WILDCARD_FROM
    }
}

/// The state-machine template bound to a task type.
///
/// Immutable with respect to in-flight tasks; edits are advisory and
/// surface through `revision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    /// Unique per pipeline
    pub task_type: String,
    pub statuses: Vec<StatusDef>,
    pub transitions: Vec<Transition>,
    /// Content hash of the definition this pipeline was loaded from
    #[serde(default)]
    pub revision: String,
}

impl Pipeline {
    pub fn status(&self, name: &str) -> Option<&StatusDef> {
        self.statuses.iter().find(|s| s.name == name)
    }

    pub fn has_status(&self, name: &str) -> bool {
        self.status(name).is_some()
    }

    /// Whether the named status is a final state.
    pub fn is_final(&self, name: &str) -> bool {
        self.status(name).is_some_and(|s| s.is_final)
    }

    /// Transitions leaving `from` (exact or wildcard), optionally
    /// filtered by trigger, in declaration order.
    pub fn transitions_from(&self, from: &str, trigger: Option<Trigger>) -> Vec<&Transition> {
        self.transitions
            .iter()
            .filter(|t| t.leaves(from))
            .filter(|t| trigger.is_none_or(|tr| t.trigger == tr))
            .collect()
    }

    /// Locate the unique transition for `(from, to, trigger[, outcome])`.
    ///
    /// An exact `from` match wins over a wildcard match when both exist.
    pub fn find_transition(
        &self,
        from: &str,
        to: &str,
        trigger: Trigger,
        agent_outcome: Option<&str>,
    ) -> Option<&Transition> {
        let matches = |t: &&Transition| {
            t.leaves(from)
                && t.to == to
                && t.trigger == trigger
                && (trigger != Trigger::Agent || t.agent_outcome.as_deref() == agent_outcome)
        };
        self.transitions
            .iter()
            .filter(matches)
            .find(|t| t.from == from)
            .or_else(|| self.transitions.iter().find(matches))
    }

    /// Locate the agent-trigger transition routing `outcome` out of
    /// `from`, preferring an exact `from` match over a wildcard.
    pub fn find_agent_transition(&self, from: &str, outcome: &str) -> Option<&Transition> {
        let matches = |t: &&Transition| {
            t.leaves(from)
                && t.trigger == Trigger::Agent
                && t.agent_outcome.as_deref() == Some(outcome)
        };
        self.transitions
            .iter()
            .filter(matches)
            .find(|t| t.from == from)
            .or_else(|| self.transitions.iter().find(matches))
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

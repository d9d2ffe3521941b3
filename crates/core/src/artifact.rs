// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable outputs of agent runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of thing a run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Branch,
    Pr,
    Diff,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Branch => write!(f, "branch"),
            ArtifactKind::Pr => write!(f, "pr"),
            ArtifactKind::Diff => write!(f, "diff"),
        }
    }
}

/// Append-only record of something a run produced. Multiple artifacts
/// of the same kind may coexist per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArtifact {
    pub id: String,
    pub task_id: String,
    pub kind: ArtifactKind,
    pub data: serde_json::Value,
    pub created_at_ms: u64,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project configuration.
//!
//! A project owns a repository, a worktree root, and the knobs the
//! executor and supervisor consult. Loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a project.
    pub struct ProjectId;
}

/// Default per-run agent timeout, shared by the executor and the
/// supervisor so the two reapers agree.
pub const DEFAULT_AGENT_TIMEOUT_MS: u64 = 600_000;

/// Default supervisor reconciliation period.
pub const DEFAULT_SUPERVISOR_PERIOD_MS: u64 = 1_000;

fn default_max_validation_retries() -> u32 {
    3
}

fn default_agent_timeout_ms() -> u64 {
    DEFAULT_AGENT_TIMEOUT_MS
}

fn default_supervisor_period_ms() -> u64 {
    DEFAULT_SUPERVISOR_PERIOD_MS
}

fn default_request_changes_mode() -> String {
    "request_changes".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

/// Tunables consulted by the engine and executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Commands run in the worktree after each agent pass
    #[serde(default)]
    pub validation_commands: Vec<String>,
    #[serde(default = "default_max_validation_retries")]
    pub max_validation_retries: u32,
    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default = "default_supervisor_period_ms")]
    pub supervisor_period_ms: u64,
    /// Agent mode used when a review requests changes
    #[serde(default = "default_request_changes_mode")]
    pub request_changes_mode: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            validation_commands: Vec::new(),
            max_validation_retries: default_max_validation_retries(),
            agent_timeout_ms: default_agent_timeout_ms(),
            max_turns: None,
            supervisor_period_ms: default_supervisor_period_ms(),
            request_changes_mode: default_request_changes_mode(),
        }
    }
}

/// A project: the repository tasks run against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub repo_path: PathBuf,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub config: ProjectConfig,
}

/// Errors loading a project definition.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid project definition: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Project {
    /// Load a project definition from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;

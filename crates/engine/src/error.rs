// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine.
//!
//! Only infrastructure failures surface as `Err`. Domain refusals
//! (guard blocks, missing transitions, hook failures) are values on
//! [`crate::TransitionOutcome`], because callers route on them rather
//! than bail.

use thiserror::Error;

/// Errors that can occur in the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] crew_storage::StoreError),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),
    #[error("agent run not found: {0}")]
    RunNotFound(String),
    #[error("worktree error: {0}")]
    Worktree(#[from] crate::worktree::WorktreeError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("startup error: {0}")]
    Startup(String),
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SCM platform adapter (pull requests).

mod gh;

pub use gh::GhScmPlatform;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeScmPlatform, ScmCall};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from SCM platform operations
#[derive(Debug, Error)]
pub enum ScmError {
    #[error("create PR failed: {0}")]
    CreateFailed(String),
    #[error("merge PR failed: {0}")]
    MergeFailed(String),
}

/// Request to open a pull request.
#[derive(Debug, Clone)]
pub struct CreatePrRequest {
    pub repo_path: PathBuf,
    pub branch: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

/// An opened pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrHandle {
    pub url: String,
}

/// Opaque SCM platform capability.
#[async_trait]
pub trait ScmPlatform: Clone + Send + Sync + 'static {
    async fn create_pr(&self, request: CreatePrRequest) -> Result<PrHandle, ScmError>;

    async fn merge_pr(&self, repo_path: &Path, pr_url: &str) -> Result<(), ScmError>;
}

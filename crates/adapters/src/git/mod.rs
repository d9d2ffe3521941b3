// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git operations adapter.
//!
//! The engine treats git as an opaque capability: branch and worktree
//! lifecycle, diffing, rebasing, pushing. `CliGitOps` shells out to the
//! `git` binary; `FakeGitOps` records calls and plays back scripted
//! results for tests.

mod cli;

pub use cli::CliGitOps;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeGitOps, GitCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from git operations
#[derive(Debug, Error)]
pub enum GitError {
    #[error("{op} failed: {detail}")]
    CommandFailed { op: String, detail: String },
    /// Rebase stopped on conflicting hunks. The caller decides whether
    /// to abort or surface it.
    #[error("rebase conflict: {detail}")]
    RebaseConflict { detail: String },
}

impl GitError {
    pub fn command(op: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CommandFailed {
            op: op.into(),
            detail: detail.into(),
        }
    }
}

/// Opaque git capability.
#[async_trait]
pub trait GitOps: Clone + Send + Sync + 'static {
    async fn fetch(&self, dir: &Path, remote: &str) -> Result<(), GitError>;

    /// Create a branch at `start_point` (HEAD when absent) without
    /// switching to it.
    async fn create_branch(
        &self,
        dir: &Path,
        name: &str,
        start_point: Option<&str>,
    ) -> Result<(), GitError>;

    async fn checkout(&self, dir: &Path, rev: &str) -> Result<(), GitError>;

    async fn push(&self, dir: &Path, branch: &str, force: bool) -> Result<(), GitError>;

    async fn pull(&self, dir: &Path) -> Result<(), GitError>;

    /// `git diff from..to` (working tree against `from` when `to` is
    /// absent).
    async fn diff(&self, dir: &Path, from: &str, to: Option<&str>) -> Result<String, GitError>;

    async fn diff_stat(&self, dir: &Path, from: &str, to: Option<&str>)
        -> Result<String, GitError>;

    /// Stage everything and commit.
    async fn commit(&self, dir: &Path, message: &str) -> Result<(), GitError>;

    /// Most recent commit subjects, newest first.
    async fn log(&self, dir: &Path, count: usize) -> Result<Vec<String>, GitError>;

    /// Rebase the current branch onto `onto`. Conflicts surface as
    /// [`GitError::RebaseConflict`] with the rebase left in progress.
    async fn rebase(&self, dir: &Path, onto: &str) -> Result<(), GitError>;

    async fn rebase_abort(&self, dir: &Path) -> Result<(), GitError>;

    async fn current_branch(&self, dir: &Path) -> Result<String, GitError>;

    /// Discard uncommitted changes and untracked files.
    async fn clean(&self, dir: &Path) -> Result<(), GitError>;

    async fn status(&self, dir: &Path) -> Result<String, GitError>;

    async fn reset_file(&self, dir: &Path, path: &str) -> Result<(), GitError>;

    async fn show_commit(&self, dir: &Path, rev: &str) -> Result<String, GitError>;

    async fn delete_remote_branch(&self, dir: &Path, branch: &str) -> Result<(), GitError>;

    /// Register a new worktree for `branch` at `worktree`, creating the
    /// branch at `start_point`.
    async fn worktree_add(
        &self,
        repo: &Path,
        worktree: &Path,
        branch: &str,
        start_point: &str,
    ) -> Result<(), GitError>;

    /// Remove a worktree. Succeeds when the worktree is already gone.
    async fn worktree_remove(&self, repo: &Path, worktree: &Path) -> Result<(), GitError>;
}

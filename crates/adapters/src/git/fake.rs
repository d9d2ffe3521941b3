// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake git adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{GitError, GitOps};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Recorded git call: operation name plus the interesting argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCall {
    pub op: String,
    pub arg: String,
}

struct FakeGitState {
    calls: Vec<GitCall>,
    /// Operations scripted to fail
    fail_ops: HashSet<String>,
    /// Operations scripted to raise a rebase conflict
    conflict_on_rebase: bool,
    /// Result played back by `diff`
    diff_result: String,
    /// Result played back by `current_branch`
    current_branch: String,
}

/// Fake git adapter: records calls, plays back scripted results.
#[derive(Clone)]
pub struct FakeGitOps {
    inner: Arc<Mutex<FakeGitState>>,
}

impl Default for FakeGitOps {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeGitState {
                calls: Vec::new(),
                fail_ops: HashSet::new(),
                conflict_on_rebase: false,
                diff_result: "diff --git a/src/lib.rs b/src/lib.rs\n+changed\n".to_string(),
                current_branch: "main".to_string(),
            })),
        }
    }
}

impl FakeGitOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the named operation to fail.
    pub fn fail_on(&self, op: &str) {
        self.inner.lock().fail_ops.insert(op.to_string());
    }

    /// Script `rebase` to stop on a conflict.
    pub fn conflict_on_rebase(&self) {
        self.inner.lock().conflict_on_rebase = true;
    }

    /// Script the text `diff` returns (empty string = no changes).
    pub fn set_diff(&self, diff: &str) {
        self.inner.lock().diff_result = diff.to_string();
    }

    pub fn set_current_branch(&self, branch: &str) {
        self.inner.lock().current_branch = branch.to_string();
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<GitCall> {
        self.inner.lock().calls.clone()
    }

    /// Names of all recorded operations, in order.
    pub fn ops(&self) -> Vec<String> {
        self.inner.lock().calls.iter().map(|c| c.op.clone()).collect()
    }

    fn record(&self, op: &str, arg: impl Into<String>) -> Result<(), GitError> {
        let mut state = self.inner.lock();
        state.calls.push(GitCall {
            op: op.to_string(),
            arg: arg.into(),
        });
        if state.fail_ops.contains(op) {
            return Err(GitError::command(op, "scripted failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl GitOps for FakeGitOps {
    async fn fetch(&self, _dir: &Path, remote: &str) -> Result<(), GitError> {
        self.record("fetch", remote)
    }

    async fn create_branch(
        &self,
        _dir: &Path,
        name: &str,
        _start_point: Option<&str>,
    ) -> Result<(), GitError> {
        self.record("create_branch", name)
    }

    async fn checkout(&self, _dir: &Path, rev: &str) -> Result<(), GitError> {
        self.record("checkout", rev)
    }

    async fn push(&self, _dir: &Path, branch: &str, force: bool) -> Result<(), GitError> {
        self.record("push", format!("{branch}{}", if force { " --force" } else { "" }))
    }

    async fn pull(&self, _dir: &Path) -> Result<(), GitError> {
        self.record("pull", "")
    }

    async fn diff(&self, _dir: &Path, from: &str, to: Option<&str>) -> Result<String, GitError> {
        self.record("diff", format!("{from}...{}", to.unwrap_or("")))?;
        Ok(self.inner.lock().diff_result.clone())
    }

    async fn diff_stat(
        &self,
        _dir: &Path,
        from: &str,
        _to: Option<&str>,
    ) -> Result<String, GitError> {
        self.record("diff_stat", from)?;
        Ok("1 file changed".to_string())
    }

    async fn commit(&self, _dir: &Path, message: &str) -> Result<(), GitError> {
        self.record("commit", message)
    }

    async fn log(&self, _dir: &Path, _count: usize) -> Result<Vec<String>, GitError> {
        self.record("log", "")?;
        Ok(vec!["initial commit".to_string()])
    }

    async fn rebase(&self, _dir: &Path, onto: &str) -> Result<(), GitError> {
        let conflict = {
            let state = self.inner.lock();
            state.conflict_on_rebase
        };
        self.record("rebase", onto)?;
        if conflict {
            return Err(GitError::RebaseConflict {
                detail: "scripted conflict".to_string(),
            });
        }
        Ok(())
    }

    async fn rebase_abort(&self, _dir: &Path) -> Result<(), GitError> {
        self.record("rebase_abort", "")
    }

    async fn current_branch(&self, _dir: &Path) -> Result<String, GitError> {
        self.record("current_branch", "")?;
        Ok(self.inner.lock().current_branch.clone())
    }

    async fn clean(&self, _dir: &Path) -> Result<(), GitError> {
        self.record("clean", "")
    }

    async fn status(&self, _dir: &Path) -> Result<String, GitError> {
        self.record("status", "")?;
        Ok(String::new())
    }

    async fn reset_file(&self, _dir: &Path, path: &str) -> Result<(), GitError> {
        self.record("reset_file", path)
    }

    async fn show_commit(&self, _dir: &Path, rev: &str) -> Result<String, GitError> {
        self.record("show_commit", rev)?;
        Ok(String::new())
    }

    async fn delete_remote_branch(&self, _dir: &Path, branch: &str) -> Result<(), GitError> {
        self.record("delete_remote_branch", branch)
    }

    async fn worktree_add(
        &self,
        _repo: &Path,
        worktree: &Path,
        branch: &str,
        _start_point: &str,
    ) -> Result<(), GitError> {
        std::fs::create_dir_all(worktree)
            .map_err(|e| GitError::command("worktree_add", e.to_string()))?;
        self.record("worktree_add", branch)
    }

    async fn worktree_remove(&self, _repo: &Path, worktree: &Path) -> Result<(), GitError> {
        if worktree.exists() {
            std::fs::remove_dir_all(worktree)
                .map_err(|e| GitError::command("worktree_remove", e.to_string()))?;
        }
        self.record("worktree_remove", worktree.display().to_string())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

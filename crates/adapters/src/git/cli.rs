// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git adapter shelling out to the `git` binary.

use super::{GitError, GitOps};
use crate::subprocess::{run_with_timeout, GIT_NETWORK_TIMEOUT, GIT_TIMEOUT};
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

#[derive(Clone, Copy, Debug, Default)]
pub struct CliGitOps;

impl CliGitOps {
    pub fn new() -> Self {
        Self
    }

    async fn git(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output, GitError> {
        let op = format!("git {}", args.first().copied().unwrap_or_default());
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(dir);
        let output = run_with_timeout(cmd, timeout, &op)
            .await
            .map_err(|detail| GitError::command(&op, detail))?;
        if !output.status.success() {
            return Err(GitError::command(
                &op,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output)
    }

    fn stdout(output: &Output) -> String {
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}

#[async_trait]
impl GitOps for CliGitOps {
    async fn fetch(&self, dir: &Path, remote: &str) -> Result<(), GitError> {
        self.git(dir, &["fetch", remote], GIT_NETWORK_TIMEOUT).await?;
        Ok(())
    }

    async fn create_branch(
        &self,
        dir: &Path,
        name: &str,
        start_point: Option<&str>,
    ) -> Result<(), GitError> {
        let mut args = vec!["branch", name];
        if let Some(start) = start_point {
            args.push(start);
        }
        self.git(dir, &args, GIT_TIMEOUT).await?;
        Ok(())
    }

    async fn checkout(&self, dir: &Path, rev: &str) -> Result<(), GitError> {
        self.git(dir, &["checkout", rev], GIT_TIMEOUT).await?;
        Ok(())
    }

    async fn push(&self, dir: &Path, branch: &str, force: bool) -> Result<(), GitError> {
        let mut args = vec!["push", "--set-upstream", "origin", branch];
        if force {
            args.push("--force-with-lease");
        }
        self.git(dir, &args, GIT_NETWORK_TIMEOUT).await?;
        Ok(())
    }

    async fn pull(&self, dir: &Path) -> Result<(), GitError> {
        self.git(dir, &["pull", "--ff-only"], GIT_NETWORK_TIMEOUT).await?;
        Ok(())
    }

    async fn diff(&self, dir: &Path, from: &str, to: Option<&str>) -> Result<String, GitError> {
        let range = match to {
            Some(to) => format!("{from}...{to}"),
            None => from.to_string(),
        };
        let output = self.git(dir, &["diff", &range], GIT_TIMEOUT).await?;
        Ok(Self::stdout(&output))
    }

    async fn diff_stat(
        &self,
        dir: &Path,
        from: &str,
        to: Option<&str>,
    ) -> Result<String, GitError> {
        let range = match to {
            Some(to) => format!("{from}...{to}"),
            None => from.to_string(),
        };
        let output = self.git(dir, &["diff", "--stat", &range], GIT_TIMEOUT).await?;
        Ok(Self::stdout(&output))
    }

    async fn commit(&self, dir: &Path, message: &str) -> Result<(), GitError> {
        self.git(dir, &["add", "-A"], GIT_TIMEOUT).await?;
        self.git(dir, &["commit", "-m", message], GIT_TIMEOUT).await?;
        Ok(())
    }

    async fn log(&self, dir: &Path, count: usize) -> Result<Vec<String>, GitError> {
        let count_arg = format!("-{count}");
        let output = self
            .git(dir, &["log", &count_arg, "--pretty=format:%s"], GIT_TIMEOUT)
            .await?;
        Ok(Self::stdout(&output)
            .lines()
            .map(|l| l.to_string())
            .collect())
    }

    async fn rebase(&self, dir: &Path, onto: &str) -> Result<(), GitError> {
        let op = "git rebase";
        let mut cmd = Command::new("git");
        cmd.args(["rebase", onto]).current_dir(dir);
        let output = run_with_timeout(cmd, GIT_TIMEOUT, op)
            .await
            .map_err(|detail| GitError::command(op, detail))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stderr.contains("CONFLICT") || stdout.contains("CONFLICT") {
                return Err(GitError::RebaseConflict {
                    detail: stderr.trim().to_string(),
                });
            }
            return Err(GitError::command(op, stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn rebase_abort(&self, dir: &Path) -> Result<(), GitError> {
        self.git(dir, &["rebase", "--abort"], GIT_TIMEOUT).await?;
        Ok(())
    }

    async fn current_branch(&self, dir: &Path) -> Result<String, GitError> {
        let output = self
            .git(dir, &["rev-parse", "--abbrev-ref", "HEAD"], GIT_TIMEOUT)
            .await?;
        Ok(Self::stdout(&output).trim().to_string())
    }

    async fn clean(&self, dir: &Path) -> Result<(), GitError> {
        self.git(dir, &["checkout", "--", "."], GIT_TIMEOUT).await?;
        self.git(dir, &["clean", "-fd"], GIT_TIMEOUT).await?;
        Ok(())
    }

    async fn status(&self, dir: &Path) -> Result<String, GitError> {
        let output = self.git(dir, &["status", "--porcelain"], GIT_TIMEOUT).await?;
        Ok(Self::stdout(&output))
    }

    async fn reset_file(&self, dir: &Path, path: &str) -> Result<(), GitError> {
        self.git(dir, &["checkout", "--", path], GIT_TIMEOUT).await?;
        Ok(())
    }

    async fn show_commit(&self, dir: &Path, rev: &str) -> Result<String, GitError> {
        let output = self.git(dir, &["show", "--stat", rev], GIT_TIMEOUT).await?;
        Ok(Self::stdout(&output))
    }

    async fn delete_remote_branch(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        self.git(dir, &["push", "origin", "--delete", branch], GIT_NETWORK_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn worktree_add(
        &self,
        repo: &Path,
        worktree: &Path,
        branch: &str,
        start_point: &str,
    ) -> Result<(), GitError> {
        let worktree_str = worktree.display().to_string();
        self.git(
            repo,
            &["worktree", "add", "-b", branch, &worktree_str, start_point],
            GIT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn worktree_remove(&self, repo: &Path, worktree: &Path) -> Result<(), GitError> {
        if !worktree.exists() {
            return Ok(());
        }
        let worktree_str = worktree.display().to_string();
        // Best-effort: the worktree may have been deleted out from
        // under us; prune handles the leftover registration.
        let _ = self
            .git(
                repo,
                &["worktree", "remove", "--force", &worktree_str],
                GIT_TIMEOUT,
            )
            .await;
        if worktree.exists() {
            tokio::fs::remove_dir_all(worktree)
                .await
                .map_err(|e| GitError::command("worktree remove", e.to_string()))?;
            self.git(repo, &["worktree", "prune"], GIT_TIMEOUT).await?;
        }
        Ok(())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SCM platform adapter shelling out to the `gh` CLI.

use super::{CreatePrRequest, PrHandle, ScmError, ScmPlatform};
use crate::subprocess::{run_with_timeout, GIT_NETWORK_TIMEOUT};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

#[derive(Clone, Copy, Debug, Default)]
pub struct GhScmPlatform;

impl GhScmPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScmPlatform for GhScmPlatform {
    async fn create_pr(&self, request: CreatePrRequest) -> Result<PrHandle, ScmError> {
        let mut cmd = Command::new("gh");
        cmd.args([
            "pr",
            "create",
            "--head",
            &request.branch,
            "--base",
            &request.base,
            "--title",
            &request.title,
            "--body",
            &request.body,
        ])
        .current_dir(&request.repo_path);

        let output = run_with_timeout(cmd, GIT_NETWORK_TIMEOUT, "gh pr create")
            .await
            .map_err(ScmError::CreateFailed)?;
        if !output.status.success() {
            return Err(ScmError::CreateFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        // `gh pr create` prints the PR URL as the last stdout line
        let stdout = String::from_utf8_lossy(&output.stdout);
        let url = stdout
            .lines()
            .rev()
            .find(|l| l.starts_with("http"))
            .ok_or_else(|| ScmError::CreateFailed(format!("no PR URL in output: {stdout}")))?
            .trim()
            .to_string();

        Ok(PrHandle { url })
    }

    async fn merge_pr(&self, repo_path: &Path, pr_url: &str) -> Result<(), ScmError> {
        let mut cmd = Command::new("gh");
        cmd.args(["pr", "merge", pr_url, "--squash", "--delete-branch"])
            .current_dir(repo_path);

        let output = run_with_timeout(cmd, GIT_NETWORK_TIMEOUT, "gh pr merge")
            .await
            .map_err(ScmError::MergeFailed)?;
        if !output.status.success() {
            return Err(ScmError::MergeFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

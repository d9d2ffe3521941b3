// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for git plumbing commands.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for git network operations (fetch/push/pull).
pub const GIT_NETWORK_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-command timeout for project validation commands.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-command output cap for project validation commands.
pub const VALIDATION_OUTPUT_CAP: usize = 10 * 1024 * 1024;

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting
/// timeout expiration into a descriptive error message. The child
/// process is killed automatically when the timeout elapses (via the
/// tokio `Child` drop implementation).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{} failed: {}", description, io_err)),
        Err(_elapsed) => Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        )),
    }
}

/// Combined stdout+stderr of a finished command, lossily decoded and
/// capped at `max_bytes`.
pub fn capped_output(output: &Output, max_bytes: usize) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    if text.len() > max_bytes {
        let end = crew_core::truncate_utf8(&text, max_bytes).len();
        text.truncate(end);
        text.push_str("\n[output truncated]");
    }
    text
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;

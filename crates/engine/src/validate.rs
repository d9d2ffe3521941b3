// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation command runner.
//!
//! After each agent pass the project's validation commands run in the
//! worktree. Each command gets its own timeout and output cap; failure
//! output feeds the agent's fix-it retry prompt.

use crew_adapters::subprocess::{
    capped_output, run_with_timeout, VALIDATION_OUTPUT_CAP, VALIDATION_TIMEOUT,
};
use crew_core::truncate_utf8;
use std::path::Path;
use tokio::process::Command;

/// Per-command truncation applied when failures are logged or fed back
/// to the agent.
const FAILURE_SNIPPET_CAP: usize = 2 * 1024;

/// One failed validation command.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub command: String,
    pub output: String,
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Concatenated failure output, truncated per command, for event
    /// logs and the retry prompt.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| {
                format!(
                    "$ {}\n{}",
                    f.command,
                    truncate_utf8(&f.output, FAILURE_SNIPPET_CAP)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run each validation command in order inside `dir`. A non-zero exit,
/// spawn failure, or timeout counts as a failure; remaining commands
/// still run so the agent sees the full picture.
pub async fn run_validation_commands(commands: &[String], dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    for command in commands {
        tracing::debug!(%command, dir = %dir.display(), "running validation command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(dir);

        match run_with_timeout(cmd, VALIDATION_TIMEOUT, "validation command").await {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                report.failures.push(ValidationFailure {
                    command: command.clone(),
                    output: capped_output(&output, VALIDATION_OUTPUT_CAP),
                });
            }
            Err(error) => {
                report.failures.push(ValidationFailure {
                    command: command.clone(),
                    output: error,
                });
            }
        }
    }

    report
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;

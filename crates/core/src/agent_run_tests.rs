// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn running_is_not_terminal() {
    assert!(!AgentRunStatus::Running.is_terminal());
    assert!(AgentRunStatus::Completed.is_terminal());
    assert!(AgentRunStatus::Failed.is_terminal());
    assert!(AgentRunStatus::Cancelled.is_terminal());
    assert!(AgentRunStatus::TimedOut.is_terminal());
}

#[test]
fn status_display() {
    assert_eq!(AgentRunStatus::TimedOut.to_string(), "timed_out");
    assert_eq!(AgentRunStatus::Running.to_string(), "running");
}

#[test]
fn status_serde_snake_case() {
    let json = serde_json::to_string(&AgentRunStatus::TimedOut).unwrap();
    assert_eq!(json, "\"timed_out\"");
}

#[test]
fn builder_defaults_to_running() {
    let run = AgentRun::builder().build();
    assert_eq!(run.status, AgentRunStatus::Running);
    assert!(run.completed_at_ms.is_none());
    assert!(!run.is_terminal());
}

#[test]
fn serde_round_trip() {
    let run = AgentRun::builder()
        .outcome("pr_ready")
        .timeout_ms(5_000)
        .build();
    let json = serde_json::to_string(&run).unwrap();
    let back: AgentRun = serde_json::from_str(&json).unwrap();
    assert_eq!(back, run);
}

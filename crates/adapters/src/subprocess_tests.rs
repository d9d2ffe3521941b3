// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use tokio::process::Command;

#[tokio::test]
async fn runs_a_command() {
    let mut cmd = Command::new("echo");
    cmd.arg("hello");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo")
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[tokio::test]
async fn times_out_slow_commands() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let err = run_with_timeout(cmd, Duration::from_millis(50), "sleep test")
        .await
        .unwrap_err();
    assert!(err.contains("timed out"), "{err}");
}

#[tokio::test]
async fn reports_spawn_failures() {
    let cmd = Command::new("definitely-not-a-real-binary-xyz");
    let err = run_with_timeout(cmd, Duration::from_secs(1), "missing binary")
        .await
        .unwrap_err();
    assert!(err.contains("failed"), "{err}");
}

#[tokio::test]
async fn capped_output_truncates_with_sentinel() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("printf 'aaaaaaaaaa'");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "printf")
        .await
        .unwrap();
    let text = capped_output(&output, 4);
    assert!(text.starts_with("aaaa"));
    assert!(text.ends_with("[output truncated]"));
}

#[tokio::test]
async fn capped_output_combines_stderr() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("echo out; echo err >&2");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "sh")
        .await
        .unwrap();
    let text = capped_output(&output, 1024);
    assert!(text.contains("out"));
    assert!(text.contains("err"));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent adapter spawning an agent CLI in streaming-JSON mode.
//!
//! The agent binary is expected to print one JSON object per stdout
//! line. Lines that fail to parse are forwarded as plain text so a
//! chatty agent never wedges the stream.

use super::{
    AgentError, AgentExit, AgentMessage, AgentQuery, AgentUsage, ContentBlock, QueryAgent,
};
use async_trait::async_trait;
use crew_core::parse_json;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Spawns `<agent_type> -p <prompt> --output-format stream-json` in the
/// workdir and translates its stdout into [`AgentMessage`]s.
#[derive(Clone, Debug, Default)]
pub struct CliQueryAgent;

impl CliQueryAgent {
    pub fn new() -> Self {
        Self
    }

    fn parse_line(line: &str) -> AgentMessage {
        let value: Value = parse_json(line, Value::Null);
        let Some(obj) = value.as_object() else {
            // Not JSON: surface as assistant text rather than dropping it
            return AgentMessage::Assistant {
                blocks: vec![ContentBlock::Text {
                    text: line.to_string(),
                }],
            };
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("assistant") => {
                let blocks = obj
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_array)
                    .map(|content| {
                        content
                            .iter()
                            .filter_map(|block| match block.get("type").and_then(Value::as_str) {
                                Some("text") => Some(ContentBlock::Text {
                                    text: block
                                        .get("text")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default()
                                        .to_string(),
                                }),
                                Some("tool_use") => Some(ContentBlock::ToolUse {
                                    name: block
                                        .get("name")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default()
                                        .to_string(),
                                    id: block
                                        .get("id")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default()
                                        .to_string(),
                                    input: block.get("input").cloned().unwrap_or(Value::Null),
                                }),
                                _ => None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                AgentMessage::Assistant { blocks }
            }
            Some("result") => {
                let usage = obj.get("usage").map(|u| AgentUsage {
                    input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
                    output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
                });
                AgentMessage::Result {
                    outcome: obj
                        .get("outcome")
                        .or_else(|| obj.get("subtype"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    structured_output: obj.get("structured_output").cloned(),
                    usage,
                }
            }
            Some("tool") => AgentMessage::ToolResult {
                tool_use_id: obj
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: obj
                    .get("result")
                    .map(|r| match r {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default(),
            },
            Some(kind) => AgentMessage::System {
                kind: kind.to_string(),
            },
            None => AgentMessage::System {
                kind: "unknown".to_string(),
            },
        }
    }
}

#[async_trait]
impl QueryAgent for CliQueryAgent {
    async fn query(
        &self,
        query: AgentQuery,
        messages: mpsc::Sender<AgentMessage>,
    ) -> Result<AgentExit, AgentError> {
        let mut cmd = Command::new(&query.agent_type);
        cmd.arg("-p")
            .arg(&query.prompt)
            .arg("--output-format")
            .arg("stream-json")
            .current_dir(&query.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(max_turns) = query.max_turns {
            cmd.arg("--max-turns").arg(max_turns.to_string());
        }
        if let Some(schema) = &query.output_schema {
            cmd.arg("--output-schema").arg(schema.to_string());
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| AgentError::SpawnFailed(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::SpawnFailed("no stdout pipe".to_string()))?;

        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    debug!(len = line.len(), "agent stream line");
                    if messages.send(Self::parse_line(&line)).await.is_err() {
                        // Receiver gone: the run was cancelled
                        warn!("agent message receiver dropped, stopping stream");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => return Err(AgentError::StreamError(e.to_string())),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AgentError::StreamError(e.to_string()))?;
        Ok(AgentExit {
            exit_code: status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent query adapter.
//!
//! The engine drives coding agents through [`QueryAgent`]: one call is
//! one agent invocation, producing a stream of typed messages over a
//! channel and finishing with an exit code. The executor is the sole
//! interpreter of the stream; the agent's wire format stays inside the
//! adapter.

mod cli;

pub use cli::CliQueryAgent;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{AgentQueryCall, FakeQueryAgent, ScriptedRun};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("stream error: {0}")]
    StreamError(String),
}

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentQuery {
    pub agent_type: String,
    pub prompt: String,
    pub workdir: PathBuf,
    pub max_turns: Option<u32>,
    /// Schema the agent should shape its structured output to
    pub output_schema: Option<serde_json::Value>,
}

/// Cumulative token usage reported by the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A block inside an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        id: String,
        input: serde_json::Value,
    },
}

/// Typed message from the agent stream.
///
/// A sum of variants, not a hierarchy: the agent capability is
/// polymorphic over text-producing, tool-using, and structured-output
/// behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    Assistant {
        blocks: Vec<ContentBlock>,
    },
    /// Terminal result message
    Result {
        outcome: Option<String>,
        structured_output: Option<serde_json::Value>,
        usage: Option<AgentUsage>,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Anything else the agent emits
    System {
        kind: String,
    },
}

/// How the agent process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentExit {
    pub exit_code: i32,
}

/// Opaque agent capability producing a message stream.
#[async_trait]
pub trait QueryAgent: Clone + Send + Sync + 'static {
    /// Run one agent invocation, sending messages as they arrive.
    ///
    /// Resolves when the agent finishes. Dropping the returned future
    /// cancels the invocation cooperatively.
    async fn query(
        &self,
        query: AgentQuery,
        messages: mpsc::Sender<AgentMessage>,
    ) -> Result<AgentExit, AgentError>;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake agent for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AgentError, AgentExit, AgentMessage, AgentQuery, QueryAgent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Recorded query.
#[derive(Debug, Clone)]
pub struct AgentQueryCall {
    pub agent_type: String,
    pub prompt: String,
    pub workdir: std::path::PathBuf,
}

/// One scripted agent invocation.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// Play back these messages, then exit with the given code
    Messages {
        messages: Vec<AgentMessage>,
        exit_code: i32,
    },
    /// Wait, then play back messages and exit (for timing-sensitive
    /// tests)
    Slow {
        delay_ms: u64,
        messages: Vec<AgentMessage>,
        exit_code: i32,
    },
    /// Never complete (for timeout and cancellation tests)
    Hang,
    /// Fail to spawn
    SpawnError(String),
}

impl ScriptedRun {
    /// A run that sends the messages and exits 0.
    pub fn ok(messages: Vec<AgentMessage>) -> Self {
        Self::Messages {
            messages,
            exit_code: 0,
        }
    }

    /// A run that sends the messages and exits non-zero.
    pub fn crashed(messages: Vec<AgentMessage>, exit_code: i32) -> Self {
        Self::Messages {
            messages,
            exit_code,
        }
    }
}

struct FakeAgentState {
    script: VecDeque<ScriptedRun>,
    calls: Vec<AgentQueryCall>,
}

/// Fake agent: pops one scripted run per query, in order. When the
/// script runs dry, queries exit 0 with no messages.
#[derive(Clone)]
pub struct FakeQueryAgent {
    inner: Arc<Mutex<FakeAgentState>>,
}

impl Default for FakeQueryAgent {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeAgentState {
                script: VecDeque::new(),
                calls: Vec::new(),
            })),
        }
    }
}

impl FakeQueryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted run for the next query.
    pub fn push_run(&self, run: ScriptedRun) {
        self.inner.lock().script.push_back(run);
    }

    /// Get all recorded queries.
    pub fn calls(&self) -> Vec<AgentQueryCall> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl QueryAgent for FakeQueryAgent {
    async fn query(
        &self,
        query: AgentQuery,
        messages: tokio::sync::mpsc::Sender<AgentMessage>,
    ) -> Result<AgentExit, AgentError> {
        let run = {
            let mut state = self.inner.lock();
            state.calls.push(AgentQueryCall {
                agent_type: query.agent_type.clone(),
                prompt: query.prompt.clone(),
                workdir: query.workdir.clone(),
            });
            state.script.pop_front()
        };

        match run {
            Some(ScriptedRun::Messages {
                messages: scripted,
                exit_code,
            }) => {
                for message in scripted {
                    if messages.send(message).await.is_err() {
                        break;
                    }
                }
                Ok(AgentExit { exit_code })
            }
            Some(ScriptedRun::Slow {
                delay_ms,
                messages: scripted,
                exit_code,
            }) => {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                for message in scripted {
                    if messages.send(message).await.is_err() {
                        break;
                    }
                }
                Ok(AgentExit { exit_code })
            }
            Some(ScriptedRun::Hang) => {
                std::future::pending::<()>().await;
                Ok(AgentExit { exit_code: 0 })
            }
            Some(ScriptedRun::SpawnError(message)) => Err(AgentError::SpawnFailed(message)),
            None => Ok(AgentExit { exit_code: 0 }),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

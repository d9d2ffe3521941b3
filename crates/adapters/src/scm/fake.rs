// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake SCM platform for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CreatePrRequest, PrHandle, ScmError, ScmPlatform};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Recorded SCM call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScmCall {
    CreatePr { branch: String, title: String },
    MergePr { pr_url: String },
}

struct FakeScmState {
    calls: Vec<ScmCall>,
    fail_create: Option<String>,
    fail_merge: Option<String>,
    next_pr_number: u64,
}

/// Fake SCM platform: records calls, returns scripted PR URLs.
#[derive(Clone)]
pub struct FakeScmPlatform {
    inner: Arc<Mutex<FakeScmState>>,
}

impl Default for FakeScmPlatform {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeScmState {
                calls: Vec::new(),
                fail_create: None,
                fail_merge: None,
                next_pr_number: 1,
            })),
        }
    }
}

impl FakeScmPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `create_pr` to fail with the given message.
    pub fn fail_create_pr(&self, message: &str) {
        self.inner.lock().fail_create = Some(message.to_string());
    }

    /// Script `merge_pr` to fail with the given message.
    pub fn fail_merge_pr(&self, message: &str) {
        self.inner.lock().fail_merge = Some(message.to_string());
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<ScmCall> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl ScmPlatform for FakeScmPlatform {
    async fn create_pr(&self, request: CreatePrRequest) -> Result<PrHandle, ScmError> {
        let mut state = self.inner.lock();
        state.calls.push(ScmCall::CreatePr {
            branch: request.branch.clone(),
            title: request.title.clone(),
        });
        if let Some(message) = &state.fail_create {
            return Err(ScmError::CreateFailed(message.clone()));
        }
        let number = state.next_pr_number;
        state.next_pr_number += 1;
        Ok(PrHandle {
            url: format!("https://example.test/pr/{number}"),
        })
    }

    async fn merge_pr(&self, _repo_path: &Path, pr_url: &str) -> Result<(), ScmError> {
        let mut state = self.inner.lock();
        state.calls.push(ScmCall::MergePr {
            pr_url: pr_url.to_string(),
        });
        if let Some(message) = &state.fail_merge {
            return Err(ScmError::MergeFailed(message.clone()));
        }
        Ok(())
    }
}

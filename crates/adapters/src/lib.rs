// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! External capabilities behind traits.
//!
//! Everything the engine needs from the outside world (git, the SCM
//! platform, the agent itself, desktop notifications) lives behind an
//! adapter trait here, with a subprocess-backed implementation for
//! production and a `Fake*` implementation for tests.

pub mod agent;
pub mod git;
pub mod notify;
pub mod scm;
pub mod subprocess;

pub use agent::{
    AgentError, AgentExit, AgentMessage, AgentQuery, AgentUsage, CliQueryAgent, ContentBlock,
    QueryAgent,
};
pub use git::{CliGitOps, GitError, GitOps};
pub use notify::{DesktopNotifyAdapter, NoOpNotifyAdapter, NotifyAdapter, NotifyError};
pub use scm::{CreatePrRequest, GhScmPlatform, PrHandle, ScmError, ScmPlatform};

#[cfg(any(test, feature = "test-support"))]
pub use agent::{AgentQueryCall, FakeQueryAgent, ScriptedRun};
#[cfg(any(test, feature = "test-support"))]
pub use git::{FakeGitOps, GitCall};
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifyAdapter, NotifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use scm::{FakeScmPlatform, ScmCall};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for the crew orchestrator.
//!
//! Durability follows the snapshot + write-ahead-log pattern: every
//! committed transaction appends typed [`StateChange`] records to a
//! JSONL WAL, and recovery replays the WAL on top of the most recent
//! zstd snapshot. The [`Store`] front door exposes synchronous,
//! mutex-scoped transactions: the atomic read-then-update scope the
//! pipeline engine's TOCTOU check relies on.

mod migration;
mod snapshot;
mod state;
mod store;
mod wal;

pub use migration::{MigrationRegistry, CURRENT_SNAPSHOT_VERSION};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::{StateChange, StoreState};
pub use store::{Store, StoreError, Txn};
pub use wal::{Wal, WalError, WalRecord};

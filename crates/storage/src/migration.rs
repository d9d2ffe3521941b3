// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot version migrations.
//!
//! Snapshots carry a format version. When the on-disk version is older
//! than [`CURRENT_SNAPSHOT_VERSION`], registered migrations are applied
//! to the raw JSON in ascending order before deserialization, inside
//! the load path, so a newer binary can always read an older state
//! directory.

use serde_json::Value;
use std::collections::BTreeMap;

/// Version written by this binary.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

/// A migration transforms the raw snapshot state JSON from
/// `version - 1` to `version`.
pub type Migration = fn(&mut Value);

/// Ordered registry of snapshot migrations.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<u32, Migration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the migration that produces `version`. Registering the
    /// same version twice keeps the last registration.
    pub fn register(&mut self, version: u32, migration: Migration) {
        self.migrations.insert(version, migration);
    }

    /// Apply every registered migration in `(from, to]` ascending.
    /// Returns the version the state now conforms to.
    pub fn apply(&self, from_version: u32, to_version: u32, state: &mut Value) -> u32 {
        let mut version = from_version;
        for (&target, migration) in &self.migrations {
            if target > from_version && target <= to_version {
                migration(state);
                version = target;
            }
        }
        version.max(from_version)
    }
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;

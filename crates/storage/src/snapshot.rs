// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery.
//!
//! Snapshots store the complete materialized state at a point in time,
//! identified by the WAL sequence number, zstd-compressed. Recovery
//! loads the snapshot and replays WAL entries after that sequence.

use crate::migration::{MigrationRegistry, CURRENT_SNAPSHOT_VERSION};
use crate::StoreState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Compression level for snapshot files. zstd default (3) favors
/// write speed over ratio, which suits frequent checkpoints.
const ZSTD_LEVEL: i32 = 3;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw frame persisted to disk: version + seq around an untyped state
/// blob, so migrations can run before the typed deserialize.
#[derive(Serialize, Deserialize)]
struct SnapshotFrame {
    version: u32,
    seq: u64,
    created_at: DateTime<Utc>,
    state: serde_json::Value,
}

/// A snapshot of the materialized state at a point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// WAL sequence number at the time of snapshot
    pub seq: u64,
    /// The complete materialized state
    pub state: StoreState,
    /// When this snapshot was created
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a new snapshot.
    pub fn new(seq: u64, state: StoreState) -> Self {
        Self {
            seq,
            state,
            created_at: Utc::now(),
        }
    }

    /// Save compressed and atomically (write to .tmp, fsync, rename).
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let frame = SnapshotFrame {
            version: CURRENT_SNAPSHOT_VERSION,
            seq: self.seq,
            created_at: self.created_at,
            state: serde_json::to_value(&self.state)?,
        };
        let raw = serde_json::to_vec(&frame)?;
        let compressed = zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)?;

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        Ok(())
    }

    /// Load a snapshot if one exists, applying version migrations.
    ///
    /// Returns `Ok(None)` if the file doesn't exist or is corrupt.
    /// Corrupt snapshots are moved to a `.bak` file so recovery can
    /// proceed via WAL replay.
    pub fn load(path: &Path, migrations: &MigrationRegistry) -> Result<Option<Self>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }

        let compressed = fs::read(path)?;
        let frame = zstd::decode_all(compressed.as_slice())
            .map_err(SnapshotError::Io)
            .and_then(|raw| serde_json::from_slice::<SnapshotFrame>(&raw).map_err(Into::into));

        let mut frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                let bak_path = rotate_bak_path(path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak_path.display(),
                    "corrupt snapshot, moving to .bak and recovering from WAL",
                );
                fs::rename(path, &bak_path)?;
                return Ok(None);
            }
        };

        if frame.version < CURRENT_SNAPSHOT_VERSION {
            migrations.apply(frame.version, CURRENT_SNAPSHOT_VERSION, &mut frame.state);
        }

        match serde_json::from_value::<StoreState>(frame.state) {
            Ok(state) => Ok(Some(Self {
                seq: frame.seq,
                state,
                created_at: frame.created_at,
            })),
            Err(e) => {
                let bak_path = rotate_bak_path(path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    "snapshot state does not deserialize, moving to .bak",
                );
                fs::rename(path, &bak_path)?;
                Ok(None)
            }
        }
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let from = bak(n);
        if from.exists() {
            let _ = fs::rename(&from, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;

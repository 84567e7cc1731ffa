// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe snapshot persistence for the counter engine.
//!
//! The write sequence is: serialize to a temporary file in the same
//! directory, fsync, atomically rename onto the primary path, then copy the
//! primary to the backup path. Recovery loads the primary; if it fails to
//! parse or its schema version mismatches, the backup is tried; if both
//! fail the engine starts empty.

use crate::stats::StatsSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wb_core::{GlobalStats, HandlerStat, StatKey};

/// Current snapshot schema version
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

/// A snapshot of the counters at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    /// When this snapshot was created
    pub saved_at: DateTime<Utc>,
    pub global: GlobalStats,
    /// Per-handler counters in first-seen order.
    pub per_handler: Vec<(StatKey, HandlerStat)>,
}

impl PersistedSnapshot {
    pub fn from_stats(snapshot: &StatsSnapshot, saved_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_SCHEMA_VERSION,
            saved_at,
            global: snapshot.global.clone(),
            per_handler: snapshot.per_handler.clone(),
        }
    }
}

/// Where a recovered snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Backup,
    /// Neither file was usable; starting empty.
    Empty,
}

/// Result of [`SnapshotStore::load`].
#[derive(Debug)]
pub struct LoadOutcome {
    pub snapshot: Option<PersistedSnapshot>,
    pub source: LoadSource,
}

/// Primary + backup snapshot files with atomic replace.
pub struct SnapshotStore {
    primary: PathBuf,
    backup: PathBuf,
}

impl SnapshotStore {
    /// Store rooted at `primary`; the backup lives alongside with a `.bak`
    /// extension appended.
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let backup = backup_path(&primary);
        Self { primary, backup }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Persist a snapshot with the crash-safe write sequence.
    pub fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), PersistError> {
        if let Some(parent) = self.primary.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.primary.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(snapshot)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.primary)?;

        // The backup copy is best-effort ordering-wise: the primary is
        // already durable when this runs.
        fs::copy(&self.primary, &self.backup)?;
        Ok(())
    }

    /// Recover the most recent usable snapshot.
    ///
    /// Never fails: an unreadable primary falls back to the backup, and an
    /// unreadable backup yields an empty outcome for the caller to log.
    pub fn load(&self) -> LoadOutcome {
        match load_file(&self.primary) {
            Ok(Some(snapshot)) => {
                return LoadOutcome { snapshot: Some(snapshot), source: LoadSource::Primary }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(path = %self.primary.display(), error = %e, "primary snapshot unusable, trying backup");
            }
        }
        match load_file(&self.backup) {
            Ok(Some(snapshot)) => {
                LoadOutcome { snapshot: Some(snapshot), source: LoadSource::Backup }
            }
            Ok(None) => LoadOutcome { snapshot: None, source: LoadSource::Empty },
            Err(e) => {
                tracing::warn!(path = %self.backup.display(), error = %e, "backup snapshot unusable, starting empty");
                LoadOutcome { snapshot: None, source: LoadSource::Empty }
            }
        }
    }
}

/// `stats.snapshot` -> `stats.snapshot.bak`
fn backup_path(primary: &Path) -> PathBuf {
    let mut name = primary.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    primary.with_file_name(name)
}

fn load_file(path: &Path) -> Result<Option<PersistedSnapshot>, PersistError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snapshot: PersistedSnapshot = serde_json::from_slice(&bytes)?;
    if snapshot.version != SNAPSHOT_SCHEMA_VERSION {
        return Err(PersistError::Version(snapshot.version));
    }
    Ok(Some(snapshot))
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;

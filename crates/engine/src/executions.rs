// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional persisted execution log.
//!
//! Appends one JSON line per execution to `executions.jsonl` under the data
//! directory and keeps a small in-memory tail for the dashboard activity
//! view. Rows older than the retention window are pruned by rewriting the
//! file; pruning runs opportunistically on append.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;
use wb_core::Method;

/// In-memory tail length for the activity view.
const RECENT_CAPACITY: usize = 256;

/// Minimum spacing between prune passes.
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum ExecutionLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One recorded execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub handler: String,
    pub method: Method,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// SHA-256 of the encoded input payload.
    pub input_digest: String,
    /// SHA-256 of the encoded output payload, absent on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handler: impl Into<String>,
        method: Method,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        input: &[u8],
        output: Option<&[u8]>,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            handler: handler.into(),
            method,
            started_at,
            duration_ms,
            input_digest: digest(input),
            output_digest: output.map(digest),
            error,
        }
    }
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

struct Inner {
    recent: VecDeque<Execution>,
    last_prune: Option<DateTime<Utc>>,
}

/// Append-only execution log with wall-clock retention.
pub struct ExecutionLog {
    path: PathBuf,
    retention: chrono::Duration,
    inner: Mutex<Inner>,
}

impl ExecutionLog {
    /// Open the log, loading the retained tail into memory.
    pub fn open(path: impl Into<PathBuf>, retention: Duration) -> Result<Self, ExecutionLogError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let retention =
            chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(30));
        let recent = load_tail(&path)?;
        Ok(Self { path, retention, inner: Mutex::new(Inner { recent, last_prune: None }) })
    }

    /// Append one execution row.
    pub fn append(&self, execution: Execution) -> Result<(), ExecutionLogError> {
        let line = serde_json::to_string(&execution)?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;

        let now = Utc::now();
        let due = {
            let mut inner = self.inner.lock();
            if inner.recent.len() == RECENT_CAPACITY {
                inner.recent.pop_front();
            }
            inner.recent.push_back(execution);
            let due = inner
                .last_prune
                .map_or(true, |last| now - last > chrono::Duration::from_std(PRUNE_INTERVAL)
                    .unwrap_or_else(|_| chrono::Duration::hours(1)));
            if due {
                inner.last_prune = Some(now);
            }
            due
        };
        if due {
            self.prune(now)?;
        }
        Ok(())
    }

    /// The most recent executions, newest last.
    pub fn recent(&self, limit: usize) -> Vec<Execution> {
        let inner = self.inner.lock();
        let skip = inner.recent.len().saturating_sub(limit);
        inner.recent.iter().skip(skip).cloned().collect()
    }

    /// Drop rows older than the retention window by rewriting the file.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<(), ExecutionLogError> {
        let cutoff = now - self.retention;
        let kept: Vec<String> = match fs::File::open(&self.path) {
            Ok(file) => BufReader::new(file)
                .lines()
                .map_while(Result::ok)
                .filter(|line| {
                    serde_json::from_str::<Execution>(line)
                        .map(|e| e.started_at >= cutoff)
                        .unwrap_or(false)
                })
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            for line in &kept {
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Load the most recent rows from the file into the in-memory tail.
fn load_tail(path: &Path) -> Result<VecDeque<Execution>, ExecutionLogError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VecDeque::new()),
        Err(e) => return Err(e.into()),
    };
    let mut recent = VecDeque::with_capacity(RECENT_CAPACITY);
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        // Skip rows that fail to parse (torn final write after a crash).
        if let Ok(execution) = serde_json::from_str::<Execution>(&line) {
            if recent.len() == RECENT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(execution);
        }
    }
    Ok(recent)
}

#[cfg(test)]
#[path = "executions_tests.rs"]
mod tests;

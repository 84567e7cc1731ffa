// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background snapshot save loop.

use crate::persist::{PersistedSnapshot, SnapshotStore};
use crate::stats::StatsEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wb_core::Clock;

/// Spawn the periodic snapshot saver.
///
/// Saves every `interval` and once more on cancellation, so a clean
/// shutdown always flushes a final snapshot. The returned handle completes
/// after the final save.
pub fn spawn_saver<C: Clock>(
    stats: Arc<StatsEngine<C>>,
    store: Arc<SnapshotStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    save_once(&stats, &store);
                }
                _ = shutdown.cancelled() => {
                    save_once(&stats, &store);
                    return;
                }
            }
        }
    })
}

fn save_once<C: Clock>(stats: &StatsEngine<C>, store: &SnapshotStore) {
    let snapshot = PersistedSnapshot::from_stats(&stats.snapshot(), chrono::Utc::now());
    match store.save(&snapshot) {
        Ok(()) => tracing::debug!(
            path = %store.primary_path().display(),
            total_requests = snapshot.global.total_requests,
            "saved stats snapshot"
        ),
        Err(e) => tracing::warn!(error = %e, "failed to save stats snapshot"),
    }
}

#[cfg(test)]
#[path = "saver_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::persist::LoadSource;
use wb_core::{Method, SystemClock};

#[tokio::test]
async fn saves_on_interval() {
    let dir = tempfile::tempdir().unwrap();
    let stats = Arc::new(StatsEngine::new(SystemClock));
    let store = Arc::new(SnapshotStore::new(dir.path().join("stats.snapshot")));
    let shutdown = CancellationToken::new();

    stats.record_request();
    let handle = spawn_saver(
        Arc::clone(&stats),
        Arc::clone(&store),
        Duration::from_millis(20),
        shutdown.clone(),
    );

    tokio::time::sleep(Duration::from_millis(80)).await;
    let outcome = store.load();
    assert_eq!(outcome.source, LoadSource::Primary);
    assert_eq!(outcome.snapshot.unwrap().global.total_requests, 1);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn cancellation_flushes_a_final_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let stats = Arc::new(StatsEngine::new(SystemClock));
    let store = Arc::new(SnapshotStore::new(dir.path().join("stats.snapshot")));
    let shutdown = CancellationToken::new();

    // Long interval: only the shutdown path can save.
    let handle = spawn_saver(
        Arc::clone(&stats),
        Arc::clone(&store),
        Duration::from_secs(3600),
        shutdown.clone(),
    );

    stats.record_execution("echo", Method::Post, std::time::Instant::now());
    shutdown.cancel();
    handle.await.unwrap();

    let loaded = store.load().snapshot.unwrap();
    assert_eq!(loaded.global.total_executions, 1);
    assert_eq!(loaded.per_handler.len(), 1);
}

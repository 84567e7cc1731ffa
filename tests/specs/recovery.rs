// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence recovery across daemon restarts.

use std::io::{Seek, SeekFrom, Write};
use std::time::{Duration, Instant};
use wb_core::Method;
use wb_daemon::lifecycle::{exit_codes, Bridge};
use wb_daemon::Config;

fn config_for(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.tracking.data_dir = Some(dir.to_path_buf());
    config.lifecycle.drain_window = Duration::from_millis(200);
    config
}

#[tokio::test]
async fn counters_survive_a_corrupted_primary_snapshot() {
    let dir = tempfile::tempdir().unwrap();

    // Record 100 executions and flush a snapshot via clean shutdown.
    let running = Bridge::start(config_for(dir.path()), true, None).await.unwrap();
    for _ in 0..100 {
        running.app.stats.record_execution("echo", Method::Post, Instant::now());
    }
    let code = running.stop(Duration::from_secs(5)).await;
    assert_eq!(code, exit_codes::CLEAN);

    // Corrupt the primary file's first byte.
    let primary = dir.path().join("stats.snapshot");
    assert!(primary.exists());
    let mut file = std::fs::OpenOptions::new().write(true).open(&primary).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(b"X").unwrap();
    drop(file);

    // Restart: the backup carries the counters.
    let running = Bridge::start(config_for(dir.path()), true, None).await.unwrap();
    let snapshot = running.app.stats.snapshot();
    assert_eq!(snapshot.global.total_executions, 100);
    let (key, stat) = &snapshot.per_handler[0];
    assert_eq!(key.handler, "echo");
    assert_eq!(stat.count, 100);
    running.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn both_snapshots_corrupt_starts_empty() {
    let dir = tempfile::tempdir().unwrap();

    let running = Bridge::start(config_for(dir.path()), true, None).await.unwrap();
    running.app.stats.record_request();
    running.stop(Duration::from_secs(5)).await;

    std::fs::write(dir.path().join("stats.snapshot"), b"garbage").unwrap();
    std::fs::write(dir.path().join("stats.snapshot.bak"), b"garbage").unwrap();

    let running = Bridge::start(config_for(dir.path()), true, None).await.unwrap();
    assert_eq!(running.app.stats.snapshot().global.total_requests, 0);
    running.stop(Duration::from_secs(5)).await;
}

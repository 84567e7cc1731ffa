// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write as _};
use wb_core::Method;

fn sample_snapshot(requests: u64) -> PersistedSnapshot {
    let mut stat = HandlerStat::default();
    stat.record(12.5, 1_000);
    PersistedSnapshot {
        version: SNAPSHOT_SCHEMA_VERSION,
        saved_at: Utc::now(),
        global: GlobalStats {
            total_requests: requests,
            total_executions: requests,
            total_errors: 0,
            start_time_ms: 500,
        },
        per_handler: vec![(StatKey::new("echo", Method::Post), stat)],
    }
}

#[test]
fn save_then_load_from_primary() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("stats.snapshot"));
    let snapshot = sample_snapshot(100);

    store.save(&snapshot).unwrap();
    let outcome = store.load();

    assert_eq!(outcome.source, LoadSource::Primary);
    assert_eq!(outcome.snapshot.unwrap().global.total_requests, 100);
}

#[test]
fn save_writes_backup_alongside_primary() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("stats.snapshot"));
    store.save(&sample_snapshot(1)).unwrap();

    assert!(store.primary_path().exists());
    assert_eq!(
        store.backup_path().file_name().unwrap().to_str().unwrap(),
        "stats.snapshot.bak"
    );
    assert!(store.backup_path().exists());
}

#[test]
fn corrupted_primary_falls_back_to_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("stats.snapshot"));
    store.save(&sample_snapshot(100)).unwrap();

    // Corrupt the primary's first byte
    let mut file = OpenOptions::new().write(true).open(store.primary_path()).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(b"X").unwrap();

    let outcome = store.load();
    assert_eq!(outcome.source, LoadSource::Backup);
    assert_eq!(outcome.snapshot.unwrap().global.total_requests, 100);
}

#[test]
fn both_files_corrupt_yields_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("stats.snapshot"));
    store.save(&sample_snapshot(1)).unwrap();

    std::fs::write(store.primary_path(), b"garbage").unwrap();
    std::fs::write(store.backup_path(), b"garbage").unwrap();

    let outcome = store.load();
    assert_eq!(outcome.source, LoadSource::Empty);
    assert!(outcome.snapshot.is_none());
}

#[test]
fn missing_files_yield_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("stats.snapshot"));
    let outcome = store.load();
    assert_eq!(outcome.source, LoadSource::Empty);
}

#[test]
fn version_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("stats.snapshot"));
    let mut snapshot = sample_snapshot(1);
    snapshot.version = 99;

    // Write the future-versioned snapshot as both files
    std::fs::write(store.primary_path(), serde_json::to_vec(&snapshot).unwrap()).unwrap();
    std::fs::write(store.backup_path(), serde_json::to_vec(&snapshot).unwrap()).unwrap();

    let outcome = store.load();
    assert_eq!(outcome.source, LoadSource::Empty);
}

#[test]
fn save_replaces_previous_snapshot_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("stats.snapshot"));
    store.save(&sample_snapshot(1)).unwrap();
    store.save(&sample_snapshot(2)).unwrap();

    let outcome = store.load();
    assert_eq!(outcome.snapshot.unwrap().global.total_requests, 2);
    // No stray temp file left behind
    assert!(!dir.path().join("stats.tmp").exists());
}

proptest! {
    /// load(save(state)) == state when the schema version matches.
    #[test]
    fn roundtrip_preserves_counters(
        requests in 0u64..10_000,
        errors in 0u64..100,
        latency in 0.0f64..10_000.0,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("stats.snapshot"));

        let mut stat = HandlerStat { errors, ..HandlerStat::default() };
        stat.record(latency, 42);
        let snapshot = PersistedSnapshot {
            version: SNAPSHOT_SCHEMA_VERSION,
            saved_at: Utc::now(),
            global: GlobalStats {
                total_requests: requests,
                total_executions: requests,
                total_errors: errors,
                start_time_ms: 1,
            },
            per_handler: vec![(StatKey::new("echo", Method::Post), stat)],
        };

        store.save(&snapshot).unwrap();
        let loaded = store.load().snapshot.unwrap();
        prop_assert_eq!(loaded.global, snapshot.global);
        prop_assert_eq!(loaded.per_handler, snapshot.per_handler);
    }
}

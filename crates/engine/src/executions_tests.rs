// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn execution(handler: &str, started_at: DateTime<Utc>) -> Execution {
    Execution::new(handler, Method::Post, started_at, 10, b"{\"x\":1}", Some(b"{}"), None)
}

#[test]
fn append_and_read_recent() {
    let dir = tempfile::tempdir().unwrap();
    let log = ExecutionLog::open(dir.path().join("executions.jsonl"), Duration::from_secs(86400))
        .unwrap();

    log.append(execution("echo", Utc::now())).unwrap();
    log.append(execution("slow", Utc::now())).unwrap();

    let recent = log.recent(10);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].handler, "echo");
    assert_eq!(recent[1].handler, "slow");
}

#[test]
fn recent_limit_returns_newest() {
    let dir = tempfile::tempdir().unwrap();
    let log = ExecutionLog::open(dir.path().join("executions.jsonl"), Duration::from_secs(86400))
        .unwrap();
    for i in 0..5 {
        log.append(execution(&format!("h{i}"), Utc::now())).unwrap();
    }
    let recent = log.recent(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].handler, "h3");
    assert_eq!(recent[1].handler, "h4");
}

#[test]
fn digests_cover_input_and_output() {
    let e = Execution::new(
        "echo",
        Method::Post,
        Utc::now(),
        5,
        b"input",
        Some(b"output"),
        None,
    );
    assert_eq!(e.input_digest.len(), 64);
    assert_ne!(e.input_digest, e.output_digest.unwrap());
}

#[test]
fn failed_execution_has_no_output_digest() {
    let e = Execution::new(
        "echo",
        Method::Post,
        Utc::now(),
        5,
        b"input",
        None,
        Some("boom".into()),
    );
    assert_eq!(e.output_digest, None);
    assert_eq!(e.error.as_deref(), Some("boom"));
}

#[test]
fn reopen_recovers_the_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("executions.jsonl");
    {
        let log = ExecutionLog::open(&path, Duration::from_secs(86400)).unwrap();
        log.append(execution("echo", Utc::now())).unwrap();
    }
    let log = ExecutionLog::open(&path, Duration::from_secs(86400)).unwrap();
    assert_eq!(log.recent(10).len(), 1);
}

#[test]
fn prune_drops_rows_outside_retention() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("executions.jsonl");
    let log = ExecutionLog::open(&path, Duration::from_secs(3600)).unwrap();

    let old = Utc::now() - chrono::Duration::hours(2);
    log.append(execution("old", old)).unwrap();
    log.append(execution("new", Utc::now())).unwrap();

    log.prune(Utc::now()).unwrap();

    let log = ExecutionLog::open(&path, Duration::from_secs(3600)).unwrap();
    let recent = log.recent(10);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].handler, "new");
}

#[test]
fn torn_trailing_line_is_skipped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("executions.jsonl");
    {
        let log = ExecutionLog::open(&path, Duration::from_secs(86400)).unwrap();
        log.append(execution("echo", Utc::now())).unwrap();
    }
    // Simulate a crash mid-append
    let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"{\"id\":\"trunc").unwrap();

    let log = ExecutionLog::open(&path, Duration::from_secs(86400)).unwrap();
    assert_eq!(log.recent(10).len(), 1);
}

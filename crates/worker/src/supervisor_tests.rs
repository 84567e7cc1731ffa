// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::interpreter::test_support::{fake_interpreter, standard_fake};
use crate::interpreter::{InterpreterConfig, InterpreterStrategy};

struct Harness {
    supervisor: Arc<WorkerSupervisor>,
    logs: mpsc::Receiver<LogEvent>,
    shutdown: CancellationToken,
    _dir: tempfile::TempDir,
}

/// Build a supervisor whose "interpreter" is a fake shell script and whose
/// worker script is `script_body`.
fn harness(script_body: &str, config: SupervisorConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let interp = standard_fake(dir.path(), "3.11.4");
    let script = fake_interpreter(dir.path(), "worker.sh", script_body);

    let discovery = Arc::new(Discovery::new(InterpreterConfig {
        strategy: InterpreterStrategy::CustomPath,
        custom_path: Some(interp),
        probe_timeout: Duration::from_secs(5),
        ..InterpreterConfig::default()
    }));
    let (logs_tx, logs_rx) = mpsc::channel(256);
    let shutdown = CancellationToken::new();
    let supervisor =
        WorkerSupervisor::new(SupervisorConfig { script, ..config }, discovery, logs_tx, shutdown.clone());
    Harness { supervisor, logs: logs_rx, shutdown, _dir: dir }
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn start_succeeds_once_port_is_reachable() {
    // The test itself provides the listening socket; the child just sleeps.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let h = harness(
        "sleep 30",
        SupervisorConfig {
            worker_port: port,
            readiness_timeout: Duration::from_secs(5),
            ..SupervisorConfig::default()
        },
    );

    h.supervisor.start().await.unwrap();
    let status = h.supervisor.status();
    assert_eq!(status.state, WorkerState::Ready);
    assert!(status.pid.is_some());
    assert!(status.started_at_ms.is_some());
    assert!(status.interpreter.is_some());

    h.supervisor.stop(Duration::from_secs(2)).await;
    h.shutdown.cancel();
}

#[tokio::test]
async fn start_is_rejected_while_running() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let h = harness(
        "sleep 30",
        SupervisorConfig {
            worker_port: port,
            readiness_timeout: Duration::from_secs(5),
            ..SupervisorConfig::default()
        },
    );

    h.supervisor.start().await.unwrap();
    assert!(matches!(h.supervisor.start().await, Err(SupervisorError::AlreadyRunning)));
    h.supervisor.stop(Duration::from_secs(2)).await;
    h.shutdown.cancel();
}

#[tokio::test]
async fn readiness_deadline_kills_the_child() {
    // Nothing listens on the port; the child sleeps well past the deadline.
    let port = free_port().await;
    let h = harness(
        "sleep 30",
        SupervisorConfig {
            worker_port: port,
            readiness_timeout: Duration::from_millis(500),
            term_grace: Duration::from_millis(500),
            ..SupervisorConfig::default()
        },
    );

    let err = h.supervisor.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotReady(_)));
    let status = h.supervisor.status();
    assert_eq!(status.state, WorkerState::Exited);
    assert!(status.last_error.is_some());
    h.shutdown.cancel();
}

#[tokio::test]
async fn early_child_exit_fails_readiness() {
    let port = free_port().await;
    let h = harness(
        "exit 3",
        SupervisorConfig {
            worker_port: port,
            readiness_timeout: Duration::from_secs(10),
            ..SupervisorConfig::default()
        },
    );

    let started = Instant::now();
    let err = h.supervisor.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotReady(_)));
    // Early exit must fail fast, not wait out the deadline.
    assert!(started.elapsed() < Duration::from_secs(5));
    h.shutdown.cancel();
}

#[tokio::test]
async fn stop_is_idempotent() {
    let port = free_port().await;
    let h = harness("exit 0", SupervisorConfig { worker_port: port, ..SupervisorConfig::default() });
    h.supervisor.stop(Duration::from_secs(1)).await;
    h.supervisor.stop(Duration::from_secs(1)).await;
    assert_eq!(h.supervisor.state(), WorkerState::Exited);
    h.shutdown.cancel();
}

#[tokio::test]
async fn worker_output_is_forwarded_as_system_logs() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let h = harness(
        r#"echo "plugin scan complete"; sleep 30"#,
        SupervisorConfig {
            worker_port: port,
            readiness_timeout: Duration::from_secs(5),
            ..SupervisorConfig::default()
        },
    );

    let mut logs = h.logs;
    h.supervisor.start().await.unwrap();

    let found = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = logs.recv().await {
            assert_eq!(event.source, wb_core::LogSource::System);
            if event.message.contains("plugin scan complete") {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(found, "worker stdout line should be forwarded");

    h.supervisor.stop(Duration::from_secs(2)).await;
    h.shutdown.cancel();
}

#[tokio::test]
async fn restart_ceiling_reaches_failed() {
    let port = free_port().await;
    let h = harness(
        // Child exits immediately after becoming "ready".
        "exit 1",
        SupervisorConfig {
            worker_port: port,
            readiness_timeout: Duration::from_secs(1),
            max_restarts_per_window: 1,
            restart_window: Duration::from_secs(60),
            ..SupervisorConfig::default()
        },
    );

    // Provide readiness by listening ourselves, so start() succeeds and
    // the exit watcher takes over.
    let _listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    h.supervisor.start().await.unwrap();

    let mut watch = h.supervisor.state_watch();
    let reached_failed = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            if *watch.borrow_and_update() == WorkerState::Failed {
                return true;
            }
            if watch.changed().await.is_err() {
                return false;
            }
        }
    })
    .await
    .unwrap_or(false);

    assert!(reached_failed, "repeated exits must reach the failed state");
    let status = h.supervisor.status();
    assert!(status.restart_count >= 2);
    assert!(status.last_error.unwrap_or_default().contains("restart ceiling"));

    // start() on a failed supervisor reports the terminal state.
    assert!(matches!(
        h.supervisor.start().await,
        Err(SupervisorError::PermanentlyFailed(_))
    ));
    h.shutdown.cancel();
}

#[tokio::test]
async fn restart_clears_failed_state() {
    let port = free_port().await;
    let h = harness(
        "exit 1",
        SupervisorConfig {
            worker_port: port,
            readiness_timeout: Duration::from_millis(300),
            term_grace: Duration::from_millis(300),
            max_restarts_per_window: 0,
            ..SupervisorConfig::default()
        },
    );

    // Force the failed state via the ceiling (0 restarts allowed).
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    h.supervisor.start().await.unwrap();
    let mut watch = h.supervisor.state_watch();
    tokio::time::timeout(Duration::from_secs(10), async {
        while *watch.borrow_and_update() != WorkerState::Failed {
            watch.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    drop(listener);

    // restart() is an explicit operator action: it clears the ceiling and
    // tries again (and fails readiness here, but not with PermanentlyFailed).
    let err = h.supervisor.restart().await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotReady(_)));
    h.shutdown.cancel();
}

#[tokio::test]
async fn missing_interpreter_surfaces_discovery_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_interpreter(dir.path(), "worker.sh", "sleep 1");
    let discovery = Arc::new(Discovery::new(InterpreterConfig {
        strategy: InterpreterStrategy::CustomPath,
        custom_path: None,
        ..InterpreterConfig::default()
    }));
    let (logs_tx, _logs_rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let supervisor = WorkerSupervisor::new(
        SupervisorConfig { script, ..SupervisorConfig::default() },
        discovery,
        logs_tx,
        shutdown.clone(),
    );

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::Discovery(DiscoveryError::NoInterpreter)));
    assert_eq!(supervisor.state(), WorkerState::Exited);
    shutdown.cancel();
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge lifecycle: startup ordering, graceful shutdown, signal handling.
//!
//! Start order: interpreter discovery, worker supervisor, channel,
//! tracking engine loops, monitor loops, HTTP front-end. Stop order is
//! the reverse, against a single deadline budget.

pub mod signals;

use crate::app::{AppInner, AppState, DescriptorCache};
use crate::config::{Config, ConfigError};
use crate::http;
use fs2::FileExt;
use std::fs::File;
use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wb_core::{
    LogEvent, LogLevel, MonitorEvent, SystemClock, WorkerState,
};
use wb_engine::{
    spawn_saver, ExecutionLog, LoadSource, LogRing, MonitorHub, SnapshotStore, StatsEngine,
};
use wb_worker::{
    Channel, Discovery, DiscoveryError, SupervisorError, WorkerSupervisor,
};

/// Interval between metrics_tick monitor events.
const METRICS_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Lifecycle errors. All are fatal at startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("another instance holds the lock at {0}")]
    LockHeld(PathBuf),

    #[error("failed to bind {0}: {1}")]
    Bind(String, #[source] std::io::Error),

    #[error("interpreter startup failed: {0}")]
    Interpreter(#[from] DiscoveryError),

    #[error("worker startup failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process exit codes (see the external interface contract).
pub mod exit_codes {
    pub const CLEAN: u8 = 0;
    pub const STARTUP_FAILURE: u8 = 1;
    pub const WORKER_FAILED: u8 = 2;
}

/// Namespace for bridge startup.
pub struct Bridge;

/// A started bridge and the handles needed to stop it.
pub struct Running {
    pub app: AppState,
    pub local_addr: SocketAddr,
    server: JoinHandle<std::io::Result<()>>,
    saver: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
    /// Stops the HTTP front-end accepting and the periodic loops.
    accept_token: CancellationToken,
    /// Cancels in-flight dispatcher calls (drain expiry).
    calls_token: CancellationToken,
    /// Closes the worker channel.
    channel_token: CancellationToken,
    /// Stops the supervisor's background restarts.
    supervisor_token: CancellationToken,
    saver_token: CancellationToken,
    store: Arc<SnapshotStore>,
    lock_path: PathBuf,
    // NOTE(lifetime): held to maintain the exclusive PID lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl std::fmt::Debug for Running {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Running").field("local_addr", &self.local_addr).finish_non_exhaustive()
    }
}

impl Bridge {
    /// Start the bridge. `no_worker` (the `--no-python` flag) skips
    /// discovery, supervisor, and channel; the dispatcher then answers
    /// 503 for every webhook.
    pub async fn start(
        config: Config,
        no_worker: bool,
        config_path: Option<PathBuf>,
    ) -> Result<Running, LifecycleError> {
        config.validate()?;

        // 1. Data directory and single-instance lock
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;
        let lock_path = data_dir.join("wbd.pid");
        let mut lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(|_| LifecycleError::LockHeld(lock_path.clone()))?;
        lock_file.set_len(0)?;
        writeln!(lock_file, "{}", std::process::id())?;

        // 2. Tracking engine, log ring, monitor hub (passive until their
        //    loops start below)
        let stats = Arc::new(StatsEngine::new(SystemClock));
        let logs = Arc::new(LogRing::new(config.tracking.log_buffer));
        let monitor = Arc::new(MonitorHub::new(config.tracking.monitor_queue));

        let store = Arc::new(SnapshotStore::new(data_dir.join("stats.snapshot")));
        let had_snapshot_files =
            store.primary_path().exists() || store.backup_path().exists();
        let outcome = store.load();
        match (&outcome.snapshot, outcome.source) {
            (Some(snapshot), source) => {
                info!(
                    source = ?source,
                    total_requests = snapshot.global.total_requests,
                    "recovered stats snapshot"
                );
                stats.restore(snapshot.global.clone(), snapshot.per_handler.clone());
                if source == LoadSource::Backup {
                    add_system_log(
                        &logs,
                        &monitor,
                        LogLevel::Warn,
                        "primary stats snapshot was unusable; recovered from backup",
                    );
                }
            }
            (None, _) if had_snapshot_files => {
                add_system_log(
                    &logs,
                    &monitor,
                    LogLevel::Warn,
                    "stats snapshots were unusable; starting with empty counters",
                );
            }
            (None, _) => info!("no stats snapshot found, starting empty"),
        }

        let executions = if config.execution_log.enabled {
            let log = ExecutionLog::open(
                data_dir.join("executions.jsonl"),
                config.execution_log.retention,
            )
            .map_err(|e| LifecycleError::Io(std::io::Error::other(e.to_string())))?;
            Some(Arc::new(log))
        } else {
            None
        };

        // 3. Worker stack: discovery, supervisor, channel
        let accept_token = CancellationToken::new();
        let calls_token = CancellationToken::new();
        let channel_token = CancellationToken::new();
        let supervisor_token = CancellationToken::new();
        let saver_token = CancellationToken::new();
        let mut background = Vec::new();

        let (discovery, supervisor, channel) = if no_worker || !config.worker.enabled {
            info!("worker disabled; webhooks will answer 503");
            (None, None, None)
        } else {
            let discovery = Arc::new(Discovery::new(config.interpreter_config()?));

            let (worker_logs_tx, worker_logs_rx) = mpsc::channel::<LogEvent>(256);
            background.push(spawn_worker_log_forwarder(
                worker_logs_rx,
                Arc::clone(&logs),
                Arc::clone(&monitor),
            ));

            let supervisor = WorkerSupervisor::new(
                config.supervisor_config(config_path.clone()),
                Arc::clone(&discovery),
                worker_logs_tx,
                supervisor_token.clone(),
            );
            match supervisor.start().await {
                Ok(()) => {}
                Err(SupervisorError::Discovery(e)) => return Err(e.into()),
                Err(SupervisorError::Spawn(e)) => {
                    return Err(LifecycleError::Worker(e.to_string()))
                }
                Err(e @ SupervisorError::NotReady(_)) => {
                    // Not fatal: the channel keeps dialing and the
                    // dispatcher answers 503 until an operator intervenes.
                    warn!(error = %e, "worker did not become ready at startup");
                    add_system_log(&logs, &monitor, LogLevel::Error, e.to_string());
                }
                Err(e) => return Err(LifecycleError::Worker(e.to_string())),
            }

            let channel = Channel::spawn(config.channel_config(), channel_token.clone());
            (Some(discovery), Some(supervisor), Some(channel))
        };

        // 4. Shared state
        let app = AppState(Arc::new(AppInner {
            config: config.clone(),
            stats: Arc::clone(&stats),
            logs: Arc::clone(&logs),
            monitor: Arc::clone(&monitor),
            executions,
            channel: channel.clone(),
            supervisor: supervisor.clone(),
            discovery,
            descriptors: DescriptorCache::default(),
            start_time: Instant::now(),
            calls_token: calls_token.clone(),
        }));

        // 5. Background loops: snapshot saver, metrics ticker, channel
        //    state watcher
        let saver = spawn_saver(
            Arc::clone(&stats),
            Arc::clone(&store),
            config.tracking.save_interval,
            saver_token.clone(),
        );
        background.push(spawn_metrics_ticker(app.clone(), accept_token.clone()));
        if channel.is_some() {
            background.push(spawn_channel_watcher(app.clone(), accept_token.clone()));
        }

        // 6. HTTP front-end (bind LAST, after everything it serves exists)
        let bind_addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| LifecycleError::Bind(bind_addr.clone(), e))?;
        let local_addr = listener.local_addr()?;
        let router = http::router(app.clone());
        let server_token = accept_token.clone();
        let server = tokio::spawn(http::serve(listener, router, server_token));

        info!(addr = %local_addr, version = crate::env::VERSION, "bridge started");
        add_system_log(&logs, &monitor, LogLevel::Info, format!("listening on {local_addr}"));

        Ok(Running {
            app,
            local_addr,
            server,
            saver,
            background,
            accept_token,
            calls_token,
            channel_token,
            supervisor_token,
            saver_token,
            store,
            lock_path,
            lock_file,
        })
    }
}

impl Running {
    /// Stop everything, spending at most `deadline`.
    ///
    /// Order: stop accepting and let open requests drain; cancel whatever
    /// is still in flight; flush the final stats snapshot; close the
    /// channel; stop the worker with the remaining budget.
    pub async fn stop(self, deadline: Duration) -> u8 {
        let started = Instant::now();
        info!("shutting down bridge...");

        // 1. Stop accepting; end streaming subscriptions so their
        //    connections close instead of pinning the drain window.
        self.accept_token.cancel();
        self.app.monitor.close_all();

        // 2. Drain window for in-flight requests, then cancel them.
        let drain = self.app.config.lifecycle.drain_window.min(deadline);
        let mut server = self.server;
        let drained = match tokio::time::timeout(drain, &mut server).await {
            Ok(result) => {
                log_server_exit(result);
                true
            }
            Err(_) => false,
        };
        self.calls_token.cancel();
        if !drained {
            let remaining =
                deadline.saturating_sub(started.elapsed()).max(Duration::from_millis(100));
            match tokio::time::timeout(remaining / 2, &mut server).await {
                Ok(result) => log_server_exit(result),
                Err(_) => {
                    warn!("HTTP server did not drain in time");
                    server.abort();
                }
            }
        }

        // 3. Final stats snapshot.
        self.saver_token.cancel();
        if let Err(e) = self.saver.await {
            warn!(error = %e, "snapshot saver did not finish cleanly");
        } else {
            info!(path = %self.store.primary_path().display(), "saved final stats snapshot");
        }

        // 4. Close the channel.
        self.channel_token.cancel();

        // 5. Stop the worker with the remaining budget.
        let worker_failed = if let Some(supervisor) = &self.app.supervisor {
            let remaining =
                deadline.saturating_sub(started.elapsed()).max(Duration::from_millis(500));
            let failed = supervisor.state() == WorkerState::Failed;
            supervisor.stop(remaining).await;
            failed
        } else {
            false
        };
        self.supervisor_token.cancel();

        for task in self.background {
            task.abort();
        }

        let _ = std::fs::remove_file(&self.lock_path);
        info!("bridge shutdown complete");

        if worker_failed {
            exit_codes::WORKER_FAILED
        } else {
            exit_codes::CLEAN
        }
    }
}

fn log_server_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "HTTP server exited with error"),
        Err(e) => warn!(error = %e, "HTTP server task failed"),
    }
}

fn add_system_log(
    logs: &Arc<LogRing>,
    monitor: &Arc<MonitorHub>,
    level: LogLevel,
    message: impl Into<String>,
) {
    let event = LogEvent::system(epoch_ms(), level, message);
    monitor.publish(&MonitorEvent::Log { event: event.clone() });
    logs.add(event);
}

/// Forward worker stdout/stderr and supervisor lifecycle events into the
/// log ring and monitor fan-out.
fn spawn_worker_log_forwarder(
    mut rx: mpsc::Receiver<LogEvent>,
    logs: Arc<LogRing>,
    monitor: Arc<MonitorHub>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            monitor.publish(&MonitorEvent::Log { event: event.clone() });
            logs.add(event);
        }
    })
}

/// Publish a metrics_tick with the global counters every few seconds.
fn spawn_metrics_ticker(app: AppState, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(METRICS_TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = app.stats.snapshot();
                    app.monitor.publish(&MonitorEvent::MetricsTick {
                        timestamp_ms: epoch_ms(),
                        global: snapshot.global,
                    });
                }
                _ = token.cancelled() => return,
            }
        }
    })
}

/// Watch channel transitions: invalidate the descriptor cache on
/// reconnect and publish handler_update events.
fn spawn_channel_watcher(app: AppState, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(channel) = app.channel.clone() else { return };
        let mut watch = channel.state_watch();
        loop {
            let state = *watch.borrow_and_update();
            if state == wb_core::ChannelState::Connected {
                // Descriptors cached before the reconnect may be stale.
                app.descriptors.invalidate();
            }
            app.monitor.publish(&MonitorEvent::HandlerUpdate {
                timestamp_ms: epoch_ms(),
                channel_state: state,
                handlers: None,
            });
            tokio::select! {
                changed = watch.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = token.cancelled() => return,
            }
        }
    })
}

fn epoch_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

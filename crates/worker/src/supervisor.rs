// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker child process supervision.
//!
//! Launches the worker with the selected interpreter, probes TCP
//! readiness, restarts on unexpected exit (bounded per window), and tears
//! the child down on shutdown. Worker stdout/stderr lines are tagged as
//! system log events and forwarded to the tracking engine.

use crate::interpreter::{Discovery, DiscoveryError};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use wb_core::{LogEvent, LogLevel, WorkerState};

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Address the worker is told to bind.
    pub worker_host: String,
    pub worker_port: u16,
    /// Worker entry script, run through the discovered interpreter.
    pub script: PathBuf,
    /// Configuration file forwarded to the worker.
    pub config_path: Option<PathBuf>,
    pub extra_args: Vec<String>,
    /// Budget for the TCP readiness probe after spawn.
    pub readiness_timeout: Duration,
    /// SIGTERM grace before SIGKILL during stop.
    pub term_grace: Duration,
    /// Unexpected-exit restarts allowed per window before the terminal
    /// `failed` state.
    pub max_restarts_per_window: u32,
    pub restart_window: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            worker_host: "127.0.0.1".to_string(),
            worker_port: 50051,
            script: PathBuf::from("worker/main.py"),
            config_path: None,
            extra_args: Vec::new(),
            readiness_timeout: Duration::from_secs(30),
            term_grace: Duration::from_secs(2),
            max_restarts_per_window: 5,
            restart_window: Duration::from_secs(60),
        }
    }
}

/// Supervisor errors.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("worker did not become ready within {0:?}")]
    NotReady(Duration),

    #[error("worker permanently failed after {0} restarts")]
    PermanentlyFailed(u64),

    #[error("worker is already running")]
    AlreadyRunning,
}

/// Cloneable status snapshot for the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub pid: Option<u32>,
    /// Milliseconds since the Unix epoch of the last successful start.
    pub started_at_ms: Option<u64>,
    pub restart_count: u64,
    pub last_error: Option<String>,
    /// Interpreter path used for the current (or last) launch.
    pub interpreter: Option<PathBuf>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            state: WorkerState::Exited,
            pid: None,
            started_at_ms: None,
            restart_count: 0,
            last_error: None,
            interpreter: None,
        }
    }
}

struct Inner {
    status: WorkerStatus,
    /// Unexpected-exit timestamps within the restart window.
    exits: VecDeque<Instant>,
    /// Bumped on every explicit stop so the exit watcher for the old child
    /// does not restart over a deliberate shutdown.
    generation: u64,
}

/// The worker supervisor. One per bridge; shared via `Arc`.
pub struct WorkerSupervisor {
    config: SupervisorConfig,
    discovery: Arc<Discovery>,
    /// Worker output and lifecycle events, forwarded to the engine.
    logs: mpsc::Sender<LogEvent>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<WorkerState>,
    shutdown: CancellationToken,
}

impl WorkerSupervisor {
    pub fn new(
        config: SupervisorConfig,
        discovery: Arc<Discovery>,
        logs: mpsc::Sender<LogEvent>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(WorkerState::Exited);
        Arc::new(Self {
            config,
            discovery,
            logs,
            inner: Mutex::new(Inner {
                status: WorkerStatus::default(),
                exits: VecDeque::new(),
                generation: 0,
            }),
            state_tx,
            shutdown,
        })
    }

    /// Current status snapshot.
    pub fn status(&self) -> WorkerStatus {
        self.inner.lock().status.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.inner.lock().status.state
    }

    /// Watch lifecycle state transitions.
    pub fn state_watch(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    /// Launch the worker and wait for readiness.
    pub async fn start(self: &Arc<Self>) -> Result<(), SupervisorError> {
        {
            let inner = self.inner.lock();
            match inner.status.state {
                WorkerState::Starting | WorkerState::Ready => {
                    return Err(SupervisorError::AlreadyRunning)
                }
                WorkerState::Failed => {
                    return Err(SupervisorError::PermanentlyFailed(inner.status.restart_count))
                }
                WorkerState::Exiting | WorkerState::Exited => {}
            }
        }
        self.start_once().await
    }

    /// Type-erased wrapper around `start_once`, used at the mutually
    /// recursive `watch_exit` call site to keep the compiler from trying
    /// (and failing) to resolve `Send` for the self-referential opaque
    /// future type.
    fn start_once_boxed(
        self: &Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), SupervisorError>> + Send + '_>>
    {
        Box::pin(self.start_once())
    }

    /// One launch attempt: discover, spawn, probe readiness.
    async fn start_once(self: &Arc<Self>) -> Result<(), SupervisorError> {
        self.set_state(WorkerState::Starting);

        let interpreter = match self.discovery.discover().await {
            Ok(record) => record,
            Err(e) => {
                self.record_error(e.to_string());
                self.set_state(WorkerState::Exited);
                return Err(e.into());
            }
        };

        let spawn_result = match self.spawn_child(&interpreter.path).await {
            Err(SupervisorError::Spawn(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                // The interpreter vanished between discovery and launch:
                // evict it and re-discover once.
                self.discovery.evict(&interpreter.path);
                match self.discovery.discover().await {
                    Ok(fresh) => self.spawn_child(&fresh.path).await,
                    Err(e) => Err(e.into()),
                }
            }
            other => other,
        };
        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                self.record_error(e.to_string());
                self.set_state(WorkerState::Exited);
                return Err(e);
            }
        };

        let pid = child.id();
        {
            let mut inner = self.inner.lock();
            inner.status.pid = pid;
            inner.status.interpreter = Some(interpreter.path.clone());
        }
        self.system_log(
            LogLevel::Info,
            format!("worker spawned (pid {})", pid.unwrap_or_default()),
        )
        .await;

        match self.wait_ready(&mut child).await {
            Ok(()) => {}
            Err(e) => {
                self.system_log(LogLevel::Error, "worker readiness probe failed, terminating")
                    .await;
                terminate(&mut child, self.config.term_grace).await;
                self.record_error(e.to_string());
                self.set_state(WorkerState::Exited);
                return Err(e);
            }
        }

        {
            let mut inner = self.inner.lock();
            inner.status.started_at_ms = Some(epoch_ms());
            inner.status.last_error = None;
        }
        self.set_state(WorkerState::Ready);
        self.system_log(LogLevel::Info, "worker ready").await;

        // Watch for exit; restart on unexpected death.
        let supervisor = Arc::clone(self);
        let generation = self.inner.lock().generation;
        tokio::spawn(async move {
            supervisor.watch_exit(child, generation).await;
        });
        Ok(())
    }

    async fn spawn_child(&self, interpreter: &std::path::Path) -> Result<Child, SupervisorError> {
        let mut command = Command::new(interpreter);
        command
            .arg(&self.config.script)
            .arg("--host")
            .arg(&self.config.worker_host)
            .arg("--port")
            .arg(self.config.worker_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(config_path) = &self.config.config_path {
            command.arg("--config").arg(config_path);
        }
        command.args(&self.config.extra_args);

        let mut child = command.spawn().map_err(SupervisorError::Spawn)?;

        // Tag each output line as a system event and forward it.
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, LogLevel::Info, self.logs.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, LogLevel::Warn, self.logs.clone());
        }
        Ok(child)
    }

    /// Poll TCP reachability of the worker's advertised port with
    /// exponential back-off (200ms doubling to a 2s cap) until the
    /// readiness deadline. Fails early if the child exits.
    async fn wait_ready(&self, child: &mut Child) -> Result<(), SupervisorError> {
        let deadline = Instant::now() + self.config.readiness_timeout;
        let target = format!("{}:{}", self.config.worker_host, self.config.worker_port);
        let mut delay = Duration::from_millis(200);

        loop {
            if tokio::net::TcpStream::connect(&target).await.is_ok() {
                return Ok(());
            }
            if let Ok(Some(status)) = child.try_wait() {
                self.system_log(
                    LogLevel::Error,
                    format!("worker exited during startup ({status})"),
                )
                .await;
                return Err(SupervisorError::NotReady(self.config.readiness_timeout));
            }
            if Instant::now() + delay > deadline {
                return Err(SupervisorError::NotReady(self.config.readiness_timeout));
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    return Err(SupervisorError::NotReady(self.config.readiness_timeout));
                }
            }
            delay = (delay * 2).min(Duration::from_secs(2));
        }
    }

    /// Wait for the child to exit. Restart unless the exit was part of an
    /// explicit stop or the restart ceiling is hit.
    async fn watch_exit(self: Arc<Self>, mut child: Child, generation: u64) {
        let status = child.wait().await;

        let restart = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || self.shutdown.is_cancelled() {
                // Deliberate stop; the stopper owns the state transition.
                false
            } else {
                inner.status.pid = None;
                let now = Instant::now();
                inner.exits.push_back(now);
                while inner
                    .exits
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > self.config.restart_window)
                {
                    inner.exits.pop_front();
                }
                inner.status.restart_count += 1;

                if inner.exits.len() as u32 > self.config.max_restarts_per_window {
                    inner.status.state = WorkerState::Failed;
                    inner.status.last_error = Some(format!(
                        "restart ceiling hit: {} exits within {:?}",
                        inner.exits.len(),
                        self.config.restart_window
                    ));
                    false
                } else {
                    inner.status.state = WorkerState::Exited;
                    true
                }
            }
        };

        let exit_msg = match &status {
            Ok(status) => format!("worker exited ({status})"),
            Err(e) => format!("worker exited (wait failed: {e})"),
        };

        if !restart {
            let state = self.state();
            let _ = self.state_tx.send(state);
            if state == WorkerState::Failed {
                self.system_log(LogLevel::Error, format!("{exit_msg}; giving up")).await;
            }
            return;
        }

        let _ = self.state_tx.send(WorkerState::Exited);
        let attempt = self.inner.lock().exits.len() as u32;
        let delay = crate::channel::Backoff::default().delay(attempt.saturating_sub(1));
        self.system_log(
            LogLevel::Warn,
            format!("{exit_msg} unexpectedly; restarting in {delay:?}"),
        )
        .await;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.shutdown.cancelled() => return,
        }
        if let Err(e) = self.start_once_boxed().await {
            tracing::error!(error = %e, "worker restart failed");
        }
    }

    /// Stop the worker: SIGTERM, wait up to `deadline`, then SIGKILL.
    /// Idempotent.
    pub async fn stop(&self, deadline: Duration) {
        let pid = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            match inner.status.pid.take() {
                Some(pid) => {
                    inner.status.state = WorkerState::Exiting;
                    pid
                }
                None => {
                    inner.status.state = WorkerState::Exited;
                    let _ = self.state_tx.send(WorkerState::Exited);
                    return;
                }
            }
        };
        let _ = self.state_tx.send(WorkerState::Exiting);
        self.system_log(LogLevel::Info, format!("stopping worker (pid {pid})")).await;

        signal_pid(pid, Signal::SIGTERM);
        if !wait_for_exit(pid, deadline).await {
            self.system_log(
                LogLevel::Warn,
                format!("worker ignored SIGTERM for {deadline:?}, sending SIGKILL"),
            )
            .await;
            signal_pid(pid, Signal::SIGKILL);
            wait_for_exit(pid, Duration::from_secs(2)).await;
        }

        let mut inner = self.inner.lock();
        inner.status.state = WorkerState::Exited;
        drop(inner);
        let _ = self.state_tx.send(WorkerState::Exited);
    }

    /// Stop then start. Used by interpreter activation.
    pub async fn restart(self: &Arc<Self>) -> Result<(), SupervisorError> {
        self.stop(self.config.term_grace).await;
        // Clear a terminal failed state; restart is an explicit operator
        // action.
        {
            let mut inner = self.inner.lock();
            inner.exits.clear();
            if inner.status.state == WorkerState::Failed {
                inner.status.state = WorkerState::Exited;
            }
        }
        self.start().await
    }

    fn set_state(&self, state: WorkerState) {
        self.inner.lock().status.state = state;
        let _ = self.state_tx.send(state);
    }

    fn record_error(&self, error: String) {
        self.inner.lock().status.last_error = Some(error);
    }

    async fn system_log(&self, level: LogLevel, message: impl Into<String>) {
        let event = LogEvent::system(epoch_ms(), level, message);
        let _ = self.logs.send(event).await;
    }
}

/// Read lines from a child stream and forward them as system log events.
fn spawn_line_reader(
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    level: LogLevel,
    logs: mpsc::Sender<LogEvent>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = LogEvent::system(epoch_ms(), level, line);
            if logs.send(event).await.is_err() {
                break;
            }
        }
    });
}

/// Terminate a child we still own directly (readiness failure path).
async fn terminate(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        signal_pid(pid, Signal::SIGTERM);
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            let _ = child.kill().await;
        }
    }
}

fn signal_pid(pid: u32, signal: Signal) {
    if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
        tracing::debug!(pid, signal = ?signal, error = %e, "signal delivery failed");
    }
}

/// Poll for process exit. True when the pid no longer accepts signal 0.
async fn wait_for_exit(pid: u32, deadline: Duration) -> bool {
    let until = Instant::now() + deadline;
    loop {
        if kill(Pid::from_raw(pid as i32), None).is_err() {
            return true;
        }
        if Instant::now() >= until {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC channel to the worker process.
//!
//! Maintains a single multiplexed connection: a dial loop with exponential
//! back-off keeps the connection alive, a writer task submits request
//! frames, and a reader task routes reply frames to waiting callers by
//! call id. State transitions:
//!
//! ```text
//! disconnected → connecting → connected
//! connecting ─fail→ reconnecting ─backoff→ connecting
//! connected ─transport error→ reconnecting
//! reconnecting ─max_reconnects→ failed
//! any ─shutdown→ disconnected (terminal)
//! ```

mod backoff;
mod conn;

pub use backoff::Backoff;

use conn::Outbound;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio_util::sync::CancellationToken;
use wb_core::{
    decode_payload, encode_payload, ChannelState, HandlerDescriptor, HandlerRequest,
    HandlerResult,
};
use wb_wire::{
    read_frame, schema_compatible, write_frame, RequestEnvelope, ResponseEnvelope, WorkerRequest,
    WorkerResponse, SCHEMA_VERSION,
};

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    /// Per-attempt TCP connect + handshake budget.
    pub connect_timeout: Duration,
    pub backoff: Backoff,
    /// Consecutive failed reconnect attempts before the terminal `failed`
    /// state. A successful call resets the counter.
    pub max_reconnects: u32,
    /// How long an opted-in caller waits for the next transition to
    /// `connected` before failing fast.
    pub dial_grace: Duration,
    /// Upper bound on a decoded reply payload.
    pub max_reply_bytes: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
            connect_timeout: Duration::from_secs(5),
            backoff: Backoff::default(),
            max_reconnects: 10,
            dial_grace: Duration::from_secs(2),
            max_reply_bytes: 4 * 1024 * 1024,
        }
    }
}

impl ChannelConfig {
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Channel call errors, mapped to the error taxonomy by the dispatcher.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel unavailable (state: {state})")]
    Unavailable {
        state: ChannelState,
        /// Whether the call had already been written to the transport
        /// when the connection failed. A submitted call may have
        /// executed on the worker and must not be retried.
        submitted: bool,
    },

    #[error("call deadline exceeded")]
    Timeout,

    #[error("call cancelled")]
    Cancelled,

    #[error("worker error {code}: {message}")]
    Remote { code: String, message: String },

    #[error("unexpected reply variant from worker")]
    UnexpectedReply,

    #[error("reply of {0} bytes exceeds the output limit")]
    ReplyTooLarge(usize),
}

/// Dashboard projection of channel state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub target: String,
    pub state: ChannelState,
    pub reconnect_attempts: u32,
    pub max_reconnects: u32,
    pub last_error: Option<String>,
}

/// Health probe reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp_ms: u64,
}

struct Shared {
    config: ChannelConfig,
    state_tx: watch::Sender<ChannelState>,
    /// Submit queue of the live connection; `None` while not connected.
    calls: Mutex<Option<mpsc::Sender<Outbound>>>,
    attempts: Mutex<Attempts>,
    next_id: AtomicU64,
    redial: Notify,
    shutdown: CancellationToken,
}

struct Attempts {
    reconnects: u32,
    last_error: Option<String>,
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::info!(from = %current, to = %state, "channel state changed");
            *current = state;
            true
        });
    }

    fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }
}

/// The connection manager. One per bridge; shared via `Arc`.
pub struct Channel {
    shared: Arc<Shared>,
}

impl Channel {
    /// Create the channel and start its dial loop.
    ///
    /// `shutdown` cancellation closes the channel permanently; use
    /// [`Channel::close`] for the same effect from the owner.
    pub fn spawn(config: ChannelConfig, shutdown: CancellationToken) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ChannelState::Disconnected);
        let shared = Arc::new(Shared {
            config,
            state_tx,
            calls: Mutex::new(None),
            attempts: Mutex::new(Attempts { reconnects: 0, last_error: None }),
            // Id 0 is reserved for the Hello handshake.
            next_id: AtomicU64::new(1),
            redial: Notify::new(),
            shutdown,
        });
        let channel = Arc::new(Self { shared: Arc::clone(&shared) });
        tokio::spawn(run_dial_loop(shared));
        channel
    }

    /// Current state snapshot.
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Watch channel state transitions.
    pub fn state_watch(&self) -> watch::Receiver<ChannelState> {
        self.shared.state_tx.subscribe()
    }

    /// Dashboard projection.
    pub fn info(&self) -> ChannelInfo {
        let attempts = self.shared.attempts.lock();
        ChannelInfo {
            target: self.shared.config.target(),
            state: self.shared.state(),
            reconnect_attempts: attempts.reconnects,
            max_reconnects: self.shared.config.max_reconnects,
            last_error: attempts.last_error.clone(),
        }
    }

    /// Request an immediate transition to `reconnecting`.
    ///
    /// Resets the reconnect counter, so a `failed` channel dials again.
    pub fn force_reconnect(&self) {
        self.shared.attempts.lock().reconnects = 0;
        self.shared.redial.notify_one();
    }

    /// Close the channel. Terminal within the process lifetime.
    pub fn close(&self) {
        self.shared.shutdown.cancel();
    }

    /// Execute a handler on the worker.
    pub async fn call_handler(
        &self,
        request: &HandlerRequest,
        deadline: Duration,
        cancel: &CancellationToken,
        wait_grace: bool,
    ) -> Result<HandlerResult, ChannelError> {
        let body = WorkerRequest::Execute {
            plugin: request.handler_name.clone(),
            method: request.method,
            data: encode_payload(&request.payload),
        };
        match self.call(body, deadline, cancel, wait_grace).await? {
            WorkerResponse::Execute { status_code, message, data, error } => {
                let reply_len: usize = data.values().map(String::len).sum();
                if reply_len > self.shared.config.max_reply_bytes {
                    return Err(ChannelError::ReplyTooLarge(reply_len));
                }
                Ok(HandlerResult::normalized(
                    status_code,
                    message,
                    decode_payload(&data),
                    error,
                ))
            }
            _ => Err(ChannelError::UnexpectedReply),
        }
    }

    /// List the handlers the worker advertises.
    pub async fn list_handlers(
        &self,
        deadline: Duration,
        cancel: &CancellationToken,
        wait_grace: bool,
    ) -> Result<Vec<HandlerDescriptor>, ChannelError> {
        match self.call(WorkerRequest::ListPlugins, deadline, cancel, wait_grace).await? {
            WorkerResponse::Plugins { plugins } => {
                Ok(plugins.into_iter().map(Into::into).collect())
            }
            _ => Err(ChannelError::UnexpectedReply),
        }
    }

    /// Lightweight liveness probe.
    pub async fn health(
        &self,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<HealthStatus, ChannelError> {
        match self.call(WorkerRequest::HealthCheck, deadline, cancel, false).await? {
            WorkerResponse::Health { status, timestamp_ms } => {
                Ok(HealthStatus { status, timestamp_ms })
            }
            _ => Err(ChannelError::UnexpectedReply),
        }
    }

    /// Issue one call: submit, then wait for the reply, the deadline, or
    /// cancellation, whichever comes first.
    async fn call(
        &self,
        body: WorkerRequest,
        deadline: Duration,
        cancel: &CancellationToken,
        wait_grace: bool,
    ) -> Result<WorkerResponse, ChannelError> {
        let shared = &self.shared;
        let deadline_at = tokio::time::Instant::now() + deadline;

        let sender = match self.current_sender() {
            Some(sender) => sender,
            None if wait_grace => {
                let grace = shared.config.dial_grace.min(deadline);
                self.wait_connected(grace).await?
            }
            None => {
                return Err(ChannelError::Unavailable {
                    state: shared.state(),
                    submitted: false,
                })
            }
        };

        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        let outbound = Outbound { envelope: RequestEnvelope { id, body }, reply: reply_tx };
        if sender.send(outbound).await.is_err() {
            // The connection died before the writer saw the call; the
            // frame was never written.
            return Err(ChannelError::Unavailable { state: shared.state(), submitted: false });
        }

        tokio::select! {
            reply = reply_rx => match reply {
                Ok(WorkerResponse::Error { code, message }) => {
                    Err(ChannelError::Remote { code, message })
                }
                Ok(response) => {
                    // Reset the reconnect counter before returning.
                    shared.attempts.lock().reconnects = 0;
                    Ok(response)
                }
                // Connection dropped with the call in flight. The frame
                // may have reached the worker, so the error is marked
                // submitted and callers must not retry it.
                Err(_) => Err(ChannelError::Unavailable {
                    state: shared.state(),
                    submitted: true,
                }),
            },
            _ = tokio::time::sleep_until(deadline_at) => Err(ChannelError::Timeout),
            _ = cancel.cancelled() => Err(ChannelError::Cancelled),
        }
    }

    fn current_sender(&self) -> Option<mpsc::Sender<Outbound>> {
        self.shared.calls.lock().clone()
    }

    /// Wait up to `grace` for the channel to become connected.
    async fn wait_connected(
        &self,
        grace: Duration,
    ) -> Result<mpsc::Sender<Outbound>, ChannelError> {
        let mut watch = self.shared.state_tx.subscribe();
        let result = tokio::time::timeout(grace, async {
            loop {
                if *watch.borrow_and_update() == ChannelState::Connected {
                    if let Some(sender) = self.current_sender() {
                        return sender;
                    }
                }
                if watch.changed().await.is_err() {
                    // Sender gone: shutdown in progress; park until the
                    // outer timeout expires.
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;
        result.map_err(|_| ChannelError::Unavailable {
            state: self.shared.state(),
            submitted: false,
        })
    }
}

/// The dial loop: connect, run the connection, back off, repeat.
async fn run_dial_loop(shared: Arc<Shared>) {
    loop {
        if shared.shutdown.is_cancelled() {
            break;
        }
        shared.set_state(ChannelState::Connecting);

        match dial(&shared).await {
            Ok(stream) => {
                shared.set_state(ChannelState::Connected);
                let (call_tx, call_rx) = mpsc::channel(64);
                *shared.calls.lock() = Some(call_tx);

                let reason = conn::run_connection(&shared, stream, call_rx).await;
                *shared.calls.lock() = None;

                if shared.shutdown.is_cancelled() {
                    break;
                }
                let attempt = {
                    let mut attempts = shared.attempts.lock();
                    attempts.last_error = Some(reason);
                    attempts.reconnects
                };
                shared.set_state(ChannelState::Reconnecting);
                let delay = shared.config.backoff.delay(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shared.redial.notified() => {}
                    _ = shared.shutdown.cancelled() => break,
                }
            }
            Err(error) => {
                let attempt = {
                    let mut attempts = shared.attempts.lock();
                    attempts.reconnects += 1;
                    attempts.last_error = Some(error.clone());
                    attempts.reconnects
                };
                tracing::warn!(
                    addr = %shared.config.target(),
                    attempt,
                    error = %error,
                    "worker dial failed"
                );

                if attempt >= shared.config.max_reconnects {
                    shared.set_state(ChannelState::Failed);
                    // Terminal until forced or shut down.
                    tokio::select! {
                        _ = shared.redial.notified() => continue,
                        _ = shared.shutdown.cancelled() => break,
                    }
                }

                shared.set_state(ChannelState::Reconnecting);
                let delay = shared.config.backoff.delay(attempt.saturating_sub(1));
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shared.redial.notified() => {}
                    _ = shared.shutdown.cancelled() => break,
                }
            }
        }
    }
    *shared.calls.lock() = None;
    shared.set_state(ChannelState::Disconnected);
}

/// Connect and complete the Hello handshake.
async fn dial(shared: &Shared) -> Result<TcpStream, String> {
    let target = shared.config.target();
    let timeout = shared.config.connect_timeout;

    let connect = TcpStream::connect(&target);
    let mut stream = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| format!("connect to {target} timed out"))?
        .map_err(|e| format!("connect to {target} failed: {e}"))?;

    let hello = RequestEnvelope {
        id: 0,
        body: WorkerRequest::Hello { major: SCHEMA_VERSION.0, minor: SCHEMA_VERSION.1 },
    };
    write_frame(&mut stream, &hello, timeout).await.map_err(|e| format!("hello failed: {e}"))?;
    let reply: ResponseEnvelope =
        read_frame(&mut stream, timeout).await.map_err(|e| format!("hello reply failed: {e}"))?;
    match reply.body {
        WorkerResponse::Hello { major, minor } if schema_compatible((major, minor)) => Ok(stream),
        WorkerResponse::Hello { major, minor } => {
            Err(format!("incompatible worker schema {major}.{minor}"))
        }
        _ => Err("worker did not answer hello".to_string()),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process fake worker for tests.
//!
//! Speaks the real wire protocol over loopback TCP. Plugins: `echo`
//! returns its input data, `slow` echoes after a configurable delay,
//! `fail` returns an error result. Each request is served on its own task
//! so a slow call never blocks health probes, matching the multiplexing
//! contract of the real worker.

// Test support: panics are acceptable here, as in #[cfg(test)] code.
#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use wb_core::Method;
use wb_wire::{
    read_frame_unbounded, write_frame, PluginInfo, RequestEnvelope, ResponseEnvelope,
    WorkerRequest, WorkerResponse, SCHEMA_VERSION,
};

/// Shared, mutable fake behavior.
pub struct FakeBehavior {
    /// Delay applied to `slow` executions.
    pub slow_delay: Mutex<Duration>,
    /// Hello major version to report (for mismatch tests).
    pub hello_major: AtomicU64,
    /// Completed `Execute` calls.
    pub executed: AtomicU64,
    /// When set, an `Execute` request is accepted (and counted) but the
    /// connection is dropped before any reply is written. Exercises the
    /// in-flight connection-loss path.
    pub drop_before_reply: AtomicBool,
}

/// A fake worker bound to an ephemeral loopback port.
pub struct FakeWorker {
    addr: SocketAddr,
    behavior: Arc<FakeBehavior>,
    stop: CancellationToken,
}

impl FakeWorker {
    /// Bind an ephemeral port and start serving.
    pub async fn start() -> Self {
        Self::bind("127.0.0.1:0".to_string()).await
    }

    /// Bind a specific loopback port. Used by tests that spawn a channel
    /// before the worker exists.
    pub async fn start_on(port: u16) -> Self {
        Self::bind(format!("127.0.0.1:{port}")).await
    }

    async fn bind(addr: String) -> Self {
        let listener = TcpListener::bind(&addr).await.expect("fake worker loopback bind");
        let addr = listener.local_addr().expect("fake worker local addr");
        let behavior = Arc::new(FakeBehavior {
            slow_delay: Mutex::new(Duration::from_millis(500)),
            hello_major: AtomicU64::new(SCHEMA_VERSION.0 as u64),
            executed: AtomicU64::new(0),
            drop_before_reply: AtomicBool::new(false),
        });
        let stop = CancellationToken::new();

        let accept_behavior = Arc::clone(&behavior);
        let accept_stop = stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let behavior = Arc::clone(&accept_behavior);
                        let stop = accept_stop.clone();
                        tokio::spawn(async move {
                            let _ = serve_connection(stream, behavior, stop).await;
                        });
                    }
                    _ = accept_stop.cancelled() => break,
                }
            }
        });

        Self { addr, behavior, stop }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn behavior(&self) -> &Arc<FakeBehavior> {
        &self.behavior
    }

    pub fn set_slow_delay(&self, delay: Duration) {
        *self.behavior.slow_delay.lock() = delay;
    }

    /// Accept the next `Execute` frames but drop the connection before
    /// replying to them.
    pub fn set_drop_before_reply(&self, drop_before_reply: bool) {
        self.behavior.drop_before_reply.store(drop_before_reply, Ordering::Relaxed);
    }

    pub fn executed_count(&self) -> u64 {
        self.behavior.executed.load(Ordering::Relaxed)
    }

    /// Stop accepting and close existing connections.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }
}

impl Drop for FakeWorker {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

pub fn plugin_list() -> Vec<PluginInfo> {
    vec![
        PluginInfo {
            name: "echo".to_string(),
            path: "plugins/echo.py".to_string(),
            supported_methods: vec![Method::Get, Method::Post, Method::Put, Method::Delete],
            is_active: true,
        },
        PluginInfo {
            name: "slow".to_string(),
            path: "plugins/slow.py".to_string(),
            supported_methods: vec![Method::Get, Method::Post],
            is_active: true,
        },
        PluginInfo {
            name: "fail".to_string(),
            path: "plugins/fail.py".to_string(),
            supported_methods: vec![Method::Post],
            is_active: true,
        },
    ]
}

async fn serve_connection(
    stream: TcpStream,
    behavior: Arc<FakeBehavior>,
    stop: CancellationToken,
) -> Result<(), wb_wire::ProtocolError> {
    let (mut read_half, write_half) = stream.into_split();
    let writer = Arc::new(AsyncMutex::new(write_half));

    loop {
        let envelope: RequestEnvelope = tokio::select! {
            frame = read_frame_unbounded(&mut read_half) => frame?,
            _ = stop.cancelled() => return Ok(()),
        };
        if matches!(envelope.body, WorkerRequest::Execute { .. })
            && behavior.drop_before_reply.load(Ordering::Relaxed)
        {
            // The request reached the worker (count it as executed), but
            // the connection dies before a reply goes out.
            behavior.executed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        let behavior = Arc::clone(&behavior);
        let writer = Arc::clone(&writer);
        tokio::spawn(async move {
            let body = respond(&behavior, envelope.body).await;
            let reply = ResponseEnvelope { id: envelope.id, body };
            let mut writer = writer.lock().await;
            let _ = write_frame(&mut *writer, &reply, Duration::from_secs(5)).await;
        });
    }
}

async fn respond(behavior: &FakeBehavior, request: WorkerRequest) -> WorkerResponse {
    match request {
        WorkerRequest::Hello { .. } => WorkerResponse::Hello {
            major: behavior.hello_major.load(Ordering::Relaxed) as u32,
            minor: SCHEMA_VERSION.1,
        },
        WorkerRequest::Execute { plugin, data, .. } => {
            let response = match plugin.as_str() {
                "echo" => WorkerResponse::Execute {
                    status_code: 200,
                    message: "success".to_string(),
                    data,
                    error: None,
                },
                "slow" => {
                    let delay = *behavior.slow_delay.lock();
                    tokio::time::sleep(delay).await;
                    WorkerResponse::Execute {
                        status_code: 200,
                        message: "success".to_string(),
                        data,
                        error: None,
                    }
                }
                "fail" => WorkerResponse::Execute {
                    status_code: 500,
                    message: "failed".to_string(),
                    data: Default::default(),
                    error: Some("handler raised an exception".to_string()),
                },
                other => WorkerResponse::Error {
                    code: "plugin_not_found".to_string(),
                    message: format!("no plugin named {other}"),
                },
            };
            behavior.executed.fetch_add(1, Ordering::Relaxed);
            response
        }
        WorkerRequest::ListPlugins => WorkerResponse::Plugins { plugins: plugin_list() },
        WorkerRequest::HealthCheck => WorkerResponse::Health {
            status: "ok".to_string(),
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        },
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP front-end: webhook endpoint, dashboard API, health, monitor stream.
//!
//! Every handler runs on its own task; streaming endpoints hold a monitor
//! subscription that is released when the client disconnects.

pub mod dashboard;
pub mod health;
pub mod stream;
pub mod webhook;

use crate::app::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Build the daemon router.
pub fn router(state: AppState) -> Router {
    let webhook_path = format!("/{}/webhook/{{name}}", state.config.server.api_prefix);
    Router::new()
        .route(
            &webhook_path,
            get(webhook::dispatch)
                .post(webhook::dispatch)
                .put(webhook::dispatch)
                .delete(webhook::dispatch),
        )
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/api/dashboard/status", get(dashboard::status))
        .route("/api/dashboard/stats", get(dashboard::stats))
        .route("/api/dashboard/stats/reset", post(dashboard::stats_reset))
        .route("/api/dashboard/plugins", get(dashboard::plugins))
        .route("/api/dashboard/workers", get(dashboard::workers))
        .route("/api/dashboard/logs", get(dashboard::logs))
        .route("/api/dashboard/activity", get(dashboard::activity))
        .route("/api/dashboard/interpreters", get(dashboard::interpreters))
        .route(
            "/api/dashboard/interpreters/{name}",
            delete(dashboard::interpreter_remove),
        )
        .route(
            "/api/dashboard/interpreters/{name}/activate",
            post(dashboard::interpreter_activate),
        )
        .route(
            "/api/dashboard/interpreters/{name}/validate",
            post(dashboard::interpreter_validate),
        )
        .route("/api/dashboard/connection", get(dashboard::connection))
        .route("/api/dashboard/reconnect", post(dashboard::reconnect))
        .route("/api/dashboard/monitor/stream", get(stream::monitor_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the token is cancelled, then stop accepting connections.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
pub(crate) async fn test_state(config: crate::config::Config) -> AppState {
    use std::sync::Arc;
    use wb_core::SystemClock;
    use wb_engine::{LogRing, MonitorHub, StatsEngine};

    AppState(Arc::new(crate::app::AppInner {
        config,
        stats: Arc::new(StatsEngine::new(SystemClock)),
        logs: Arc::new(LogRing::new(100)),
        monitor: Arc::new(MonitorHub::new(16)),
        executions: None,
        channel: None,
        supervisor: None,
        discovery: None,
        descriptors: crate::app::DescriptorCache::default(),
        start_time: std::time::Instant::now(),
        calls_token: CancellationToken::new(),
    }))
}

/// Test state wired to an existing channel, connected or not.
#[cfg(test)]
pub(crate) async fn test_state_with_channel(
    config: crate::config::Config,
    channel: std::sync::Arc<wb_worker::Channel>,
) -> AppState {
    use std::sync::Arc;

    let state = test_state(config).await;
    let mut inner = Arc::try_unwrap(state.0).map_err(|_| ()).expect("sole owner");
    inner.channel = Some(channel);
    AppState(Arc::new(inner))
}

/// Test state with a channel connected to a fake worker.
#[cfg(test)]
pub(crate) async fn test_state_with_worker(
    config: crate::config::Config,
    worker: &wb_worker::FakeWorker,
) -> AppState {
    use std::time::Duration;
    use wb_core::ChannelState;
    use wb_worker::{Channel, ChannelConfig};

    let channel = Channel::spawn(
        ChannelConfig { port: worker.port(), ..ChannelConfig::default() },
        CancellationToken::new(),
    );
    let mut watch = channel.state_watch();
    tokio::time::timeout(Duration::from_secs(5), async {
        while *watch.borrow_and_update() != ChannelState::Connected {
            if watch.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("channel should connect to the fake worker");

    test_state_with_channel(config, channel).await
}

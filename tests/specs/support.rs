// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared spec fixtures: a bridge state wired to a fake worker.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wb_core::{ChannelState, SystemClock};
use wb_daemon::app::{AppInner, AppState, DescriptorCache};
use wb_daemon::http::router;
use wb_daemon::Config;
use wb_engine::{LogRing, MonitorHub, StatsEngine};
use wb_worker::{Backoff, Channel, ChannelConfig, FakeWorker};

/// A bridge state connected to a fake worker over loopback.
pub struct SpecBridge {
    pub app: AppState,
    pub worker: FakeWorker,
    pub channel_token: CancellationToken,
}

pub async fn bridge() -> SpecBridge {
    bridge_with_config(Config::default()).await
}

pub async fn bridge_with_config(config: Config) -> SpecBridge {
    let worker = FakeWorker::start().await;
    let channel_token = CancellationToken::new();
    let channel = Channel::spawn(
        ChannelConfig {
            port: worker.port(),
            // Deterministic, slow backoff so specs can observe the
            // reconnecting state.
            backoff: Backoff { base: Duration::from_secs(2), jitter: 0.0, ..Backoff::default() },
            ..ChannelConfig::default()
        },
        channel_token.clone(),
    );

    let mut watch = channel.state_watch();
    tokio::time::timeout(Duration::from_secs(5), async {
        while *watch.borrow_and_update() != ChannelState::Connected {
            watch.changed().await.unwrap();
        }
    })
    .await
    .expect("channel should connect to the fake worker");

    let app = AppState(Arc::new(AppInner {
        config,
        stats: Arc::new(StatsEngine::new(SystemClock)),
        logs: Arc::new(LogRing::new(1000)),
        monitor: Arc::new(MonitorHub::new(64)),
        executions: None,
        channel: Some(channel),
        supervisor: None,
        discovery: None,
        descriptors: DescriptorCache::default(),
        start_time: Instant::now(),
        calls_token: CancellationToken::new(),
    }));
    SpecBridge { app, worker, channel_token }
}

impl SpecBridge {
    /// Wait until the channel observes the given state.
    pub async fn wait_channel_state(&self, target: ChannelState) {
        let channel = self.app.channel.clone().unwrap();
        let mut watch = channel.state_watch();
        tokio::time::timeout(Duration::from_secs(10), async {
            while *watch.borrow_and_update() != target {
                watch.changed().await.unwrap();
            }
        })
        .await
        .unwrap_or_else(|_| panic!("channel never reached {target}"));
    }
}

/// One request through the router; returns status and parsed JSON body.
pub async fn send(app: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(app.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub fn post_json(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

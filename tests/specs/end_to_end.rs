// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook round trips against the fake worker.

use super::support::{bridge, bridge_with_config, get, post_json, send};
use axum::http::StatusCode;
use serde_json::json;
use std::time::Duration;
use wb_core::{ChannelState, Method};
use wb_daemon::Config;

#[tokio::test]
async fn happy_path_post_echo() {
    let spec = bridge().await;

    let (status, body) = send(&spec.app, post_json("/v1/webhook/echo", r#"{"x":1}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status_code": 200,
            "message": "success",
            "data": {
                "plugin": "echo",
                "src_data": {"x": 1},
                "result": {"status": "success", "data": {"x": 1}}
            }
        })
    );

    let snapshot = spec.app.stats.snapshot();
    assert_eq!(snapshot.global.total_requests, 1);
    assert_eq!(snapshot.global.total_executions, 1);
    let (key, stat) = &snapshot.per_handler[0];
    assert_eq!(key.handler, "echo");
    assert_eq!(key.method, Method::Post);
    assert_eq!(stat.count, 1);
}

#[tokio::test]
async fn handler_not_found_is_404_and_not_an_error_stat() {
    let spec = bridge().await;

    let (status, _) = send(&spec.app, get("/v1/webhook/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let snapshot = spec.app.stats.snapshot();
    assert_eq!(snapshot.global.total_requests, 1);
    assert_eq!(snapshot.global.total_errors, 0);
}

#[tokio::test]
async fn dead_worker_surfaces_reconnecting_channel_state() {
    let spec = bridge().await;

    spec.worker.shutdown();
    spec.wait_channel_state(ChannelState::Reconnecting).await;

    let (status, body) = send(&spec.app, post_json("/v1/webhook/echo", "{}")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["channel_state"], "reconnecting");
    assert_eq!(body["code"], "unavailable");
}

#[tokio::test]
async fn slow_handler_times_out_and_health_stays_connected() {
    let mut config = Config::default();
    config.tracking.call_timeout = Duration::from_millis(100);
    let spec = bridge_with_config(config).await;
    spec.worker.set_slow_delay(Duration::from_millis(500));

    let (status, _) = send(&spec.app, post_json("/v1/webhook/slow", "{}")).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

    // The timeout is an errored execution.
    let snapshot = spec.app.stats.snapshot();
    assert_eq!(snapshot.global.total_errors, 1);

    // The channel survived; health still reports connected.
    let (status, body) = send(&spec.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channel_state"], "connected");
}

#[tokio::test]
async fn descriptor_cache_is_reused_within_ttl() {
    let spec = bridge().await;

    send(&spec.app, post_json("/v1/webhook/echo", "{}")).await;
    send(&spec.app, post_json("/v1/webhook/echo", "{}")).await;

    // Two dispatches, but only one ListPlugins round trip: both echo
    // executions plus a single descriptor fetch.
    assert_eq!(spec.worker.executed_count(), 2);

    let fresh = spec.app.descriptors.fresh().expect("descriptor cache is fresh");
    assert_eq!(fresh.len(), 3);
}

#[tokio::test]
async fn stats_invariants_hold_across_mixed_outcomes() {
    let spec = bridge().await;

    for _ in 0..3 {
        send(&spec.app, post_json("/v1/webhook/echo", "{}")).await;
    }
    for _ in 0..2 {
        send(&spec.app, post_json("/v1/webhook/fail", "{}")).await;
    }

    let snapshot = spec.app.stats.snapshot();
    assert_eq!(snapshot.global.total_requests, 5);
    assert_eq!(snapshot.global.total_executions, 5);
    assert_eq!(snapshot.global.total_errors, 2);
    let error_sum: u64 = snapshot.per_handler.iter().map(|(_, s)| s.errors).sum();
    assert_eq!(snapshot.global.total_errors, error_sum);
    for (_, stat) in &snapshot.per_handler {
        assert!(stat.count >= stat.errors);
    }
}

#[tokio::test]
async fn dashboard_stats_reflect_webhook_traffic() {
    let spec = bridge().await;
    send(&spec.app, post_json("/v1/webhook/echo", r#"{"x":1}"#)).await;

    let (status, body) = send(&spec.app, get("/api/dashboard/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["global"]["total_executions"], 1);
    assert_eq!(body["data"]["per_handler"][0]["handler"], "echo");
}

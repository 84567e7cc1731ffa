// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::Config;
use crate::http::{router, test_state};
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use wb_core::{GlobalStats, LogEvent, LogLevel, MonitorEvent};

#[test]
fn category_parsing_ignores_unknown_tokens() {
    let parsed = parse_categories("log, metrics_tick, bogus");
    assert!(parsed.contains(&EventCategory::Log));
    assert!(parsed.contains(&EventCategory::MetricsTick));
    assert_eq!(parsed.len(), 2);
}

#[tokio::test]
async fn stream_delivers_published_events() {
    let app = test_state(Config::default()).await;

    let request = Request::builder()
        .uri("/api/dashboard/monitor/stream")
        .body(Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(router(app.clone()), request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    // Publish after the subscription exists, then read one frame.
    app.log_event(LogEvent::system(1, LogLevel::Info, "streamed"));

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(frame.data_ref().unwrap()).into_owned();
    assert!(text.contains("event: log"), "unexpected frame: {text}");
    assert!(text.contains("streamed"));
}

#[tokio::test]
async fn category_filter_excludes_other_events() {
    let app = test_state(Config::default()).await;

    let request = Request::builder()
        .uri("/api/dashboard/monitor/stream?categories=metrics_tick")
        .body(Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(router(app.clone()), request).await.unwrap();

    // A log event is filtered out; a tick is delivered.
    app.log_event(LogEvent::system(1, LogLevel::Info, "ignored"));
    app.monitor.publish(&MonitorEvent::MetricsTick {
        timestamp_ms: 2,
        global: GlobalStats::default(),
    });

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(frame.data_ref().unwrap()).into_owned();
    assert!(text.contains("event: metrics_tick"), "unexpected frame: {text}");
    assert!(!text.contains("ignored"));
}

#[tokio::test]
async fn dropping_the_stream_releases_the_subscription() {
    let app = test_state(Config::default()).await;

    let request = Request::builder()
        .uri("/api/dashboard/monitor/stream")
        .body(Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(router(app.clone()), request).await.unwrap();
    assert_eq!(app.monitor.subscriber_count(), 1);

    drop(response);
    // Dropping the response drops the SSE stream and its subscription.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(app.monitor.subscriber_count(), 0);
}

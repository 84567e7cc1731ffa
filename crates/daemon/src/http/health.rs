// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health and version endpoints.

use crate::app::AppState;
use crate::env;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use wb_core::ChannelState;

/// `GET /health`.
///
/// 200 when the front-end is serving and either the channel is connected
/// or the bridge runs without a worker; 503 otherwise.
pub async fn health(State(app): State<AppState>) -> Response {
    let channel_state = app.channel.as_ref().map(|c| c.state());
    let worker_state = app.supervisor.as_ref().map(|s| s.state());

    let healthy = match channel_state {
        None => true,
        Some(ChannelState::Connected) => true,
        Some(_) => false,
    };

    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "version": env::VERSION,
        "uptime_secs": app.uptime_secs(),
        "channel_state": channel_state.map(|s| s.as_str()),
        "worker_state": worker_state.map(|s| s.as_str()),
    });
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body)).into_response()
}

/// `GET /version`.
pub async fn version() -> Json<serde_json::Value> {
    Json(json!({ "version": env::VERSION }))
}

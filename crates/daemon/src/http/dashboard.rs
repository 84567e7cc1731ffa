// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dashboard API: read-only projections of the engine, channel,
//! supervisor, and discovery state, plus the few mutations the dashboard
//! is allowed (interpreter selection, reconnect, stats reset).
//!
//! Every response uses the envelope
//! `{ "success": bool, "data": value, "error": {code, message} | null }`.

use crate::app::AppState;
use crate::env;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use wb_core::{ErrorCode, LogLevel};
use wb_engine::LogQuery;
use wb_worker::InterpreterRecord;

/// Wrap a successful payload in the dashboard envelope.
fn ok(data: Value) -> Response {
    Json(json!({ "success": true, "data": data, "error": null })).into_response()
}

/// Wrap a failure in the dashboard envelope.
fn fail(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({
        "success": false,
        "data": null,
        "error": { "code": code, "message": message },
    });
    (status, Json(body)).into_response()
}

fn unavailable(what: &str) -> Response {
    fail(
        StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Unavailable.as_str(),
        &format!("{what} is not running"),
    )
}

/// `GET /api/dashboard/status`.
pub async fn status(State(app): State<AppState>) -> Response {
    let snapshot = app.stats.snapshot();
    ok(json!({
        "version": env::VERSION,
        "mode": app.config.server.mode.as_str(),
        "uptime_secs": app.uptime_secs(),
        "worker_enabled": app.channel.is_some(),
        "channel_state": app.channel.as_ref().map(|c| c.state().as_str()),
        "worker_state": app.supervisor.as_ref().map(|s| s.state().as_str()),
        "total_requests": snapshot.global.total_requests,
        "total_executions": snapshot.global.total_executions,
        "total_errors": snapshot.global.total_errors,
    }))
}

/// `GET /api/dashboard/stats`.
pub async fn stats(State(app): State<AppState>) -> Response {
    let snapshot = app.stats.snapshot();
    let per_handler: Vec<Value> = snapshot
        .per_handler
        .iter()
        .map(|(key, stat)| {
            json!({
                "handler": key.handler,
                "method": key.method.as_str(),
                "count": stat.count,
                "errors": stat.errors,
                "avg_latency_ms": stat.avg_latency_ms,
                "last_execution_ms": stat.last_execution_ms,
            })
        })
        .collect();
    ok(json!({
        "global": snapshot.global,
        "per_handler": per_handler,
        "reset_generation": snapshot.reset_generation,
    }))
}

/// `POST /api/dashboard/stats/reset`.
pub async fn stats_reset(State(app): State<AppState>) -> Response {
    app.stats.reset();
    let generation = app.stats.snapshot().reset_generation;
    ok(json!({ "reset_generation": generation }))
}

/// `GET /api/dashboard/plugins`.
pub async fn plugins(State(app): State<AppState>) -> Response {
    let Some(channel) = &app.channel else {
        return unavailable("worker channel");
    };
    match app.descriptors.get(channel, &app.calls_token).await {
        Ok(list) => ok(json!(list)),
        Err(e) => fail(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Unavailable.as_str(),
            &e.to_string(),
        ),
    }
}

/// `GET /api/dashboard/workers`.
pub async fn workers(State(app): State<AppState>) -> Response {
    let workers: Vec<Value> = app
        .supervisor
        .iter()
        .map(|s| {
            let status = s.status();
            json!({
                "state": status.state.as_str(),
                "pid": status.pid,
                "started_at_ms": status.started_at_ms,
                "restart_count": status.restart_count,
                "last_error": status.last_error,
                "interpreter": status.interpreter,
            })
        })
        .collect();
    ok(json!(workers))
}

#[derive(Debug, Deserialize)]
pub struct LogsParams {
    pub level: Option<String>,
    pub source: Option<String>,
    pub handler: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /api/dashboard/logs`.
pub async fn logs(State(app): State<AppState>, Query(params): Query<LogsParams>) -> Response {
    let level = match params.level.as_deref().map(str::parse::<LogLevel>) {
        Some(Ok(level)) => Some(level),
        Some(Err(e)) => return fail(StatusCode::BAD_REQUEST, "invalid_query", &e),
        None => None,
    };
    let source = match params.source.as_deref() {
        Some("system") => Some(wb_core::LogSource::System),
        Some("handler") => Some(wb_core::LogSource::Handler),
        Some(other) => {
            return fail(
                StatusCode::BAD_REQUEST,
                "invalid_query",
                &format!("unknown source: {other}"),
            )
        }
        None => None,
    };
    let query = LogQuery {
        level,
        source,
        handler: params.handler.clone(),
        limit: params.limit.unwrap_or(100),
    };
    let events = app.logs.query(&query);
    ok(json!({
        "events": events,
        "handlers_seen": app.logs.handlers_seen(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    pub limit: Option<usize>,
}

/// `GET /api/dashboard/activity`.
///
/// Recent executions from the execution log when enabled, otherwise the
/// recent handler-sourced log events.
pub async fn activity(
    State(app): State<AppState>,
    Query(params): Query<ActivityParams>,
) -> Response {
    let limit = params.limit.unwrap_or(50);
    if let Some(executions) = &app.executions {
        return ok(json!({ "executions": executions.recent(limit) }));
    }
    let events = app.logs.query(&LogQuery {
        source: Some(wb_core::LogSource::Handler),
        limit,
        ..LogQuery::default()
    });
    ok(json!({ "events": events }))
}

fn interpreter_json(record: &InterpreterRecord, active: Option<&PathBuf>) -> Value {
    json!({
        "name": record.name,
        "path": record.path,
        "version": record.version,
        "required_packages": record.required_packages,
        "validated": record.validated,
        "last_validated_ms": record.last_validated_ms,
        "validation_error": record.validation_error,
        "active": active == Some(&record.path),
    })
}

/// `GET /api/dashboard/interpreters`.
pub async fn interpreters(State(app): State<AppState>) -> Response {
    let Some(discovery) = &app.discovery else {
        return unavailable("interpreter discovery");
    };
    let active = discovery.active().map(|r| r.path);
    let records: Vec<Value> =
        discovery.records().iter().map(|r| interpreter_json(r, active.as_ref())).collect();
    ok(json!({
        "interpreters": records,
        "active": active,
    }))
}

/// Resolve an interpreter path from a dashboard name (record name or
/// path string).
fn resolve_interpreter(app: &AppState, name: &str) -> Option<PathBuf> {
    let discovery = app.discovery.as_ref()?;
    discovery
        .records()
        .iter()
        .find(|r| r.name == name || r.path.to_string_lossy() == name)
        .map(|r| r.path.clone())
        .or_else(|| {
            let path = PathBuf::from(name);
            path.is_file().then_some(path)
        })
}

/// `POST /api/dashboard/interpreters/{name}/activate`.
///
/// Validates the interpreter, makes it active, and restarts the worker on
/// it.
pub async fn interpreter_activate(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let Some(discovery) = app.discovery.clone() else {
        return unavailable("interpreter discovery");
    };
    let Some(path) = resolve_interpreter(&app, &name) else {
        return fail(
            StatusCode::NOT_FOUND,
            "interpreter_not_found",
            &format!("no interpreter named {name:?}"),
        );
    };
    let record = match discovery.activate(&path).await {
        Ok(record) => record,
        Err(e) => {
            return fail(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::InterpreterUnusable.as_str(),
                &e.to_string(),
            )
        }
    };

    if let Some(supervisor) = &app.supervisor {
        if let Err(e) = supervisor.restart().await {
            return fail(
                StatusCode::BAD_GATEWAY,
                ErrorCode::WorkerNotReady.as_str(),
                &format!("interpreter activated but worker restart failed: {e}"),
            );
        }
    }
    ok(interpreter_json(&record, Some(&record.path)))
}

/// `POST /api/dashboard/interpreters/{name}/validate`.
pub async fn interpreter_validate(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let Some(discovery) = app.discovery.clone() else {
        return unavailable("interpreter discovery");
    };
    let Some(path) = resolve_interpreter(&app, &name) else {
        return fail(
            StatusCode::NOT_FOUND,
            "interpreter_not_found",
            &format!("no interpreter named {name:?}"),
        );
    };
    discovery.evict(&path);
    match discovery.validate(&path).await {
        Ok(record) => {
            let active = discovery.active().map(|r| r.path);
            ok(interpreter_json(&record, active.as_ref()))
        }
        Err(e) => fail(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InterpreterUnusable.as_str(),
            &e.to_string(),
        ),
    }
}

/// `DELETE /api/dashboard/interpreters/{name}`.
pub async fn interpreter_remove(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let Some(discovery) = app.discovery.clone() else {
        return unavailable("interpreter discovery");
    };
    let Some(path) = resolve_interpreter(&app, &name) else {
        return fail(
            StatusCode::NOT_FOUND,
            "interpreter_not_found",
            &format!("no interpreter named {name:?}"),
        );
    };
    discovery.remove(&path);
    ok(json!({ "removed": path }))
}

/// `GET /api/dashboard/connection`.
pub async fn connection(State(app): State<AppState>) -> Response {
    let Some(channel) = &app.channel else {
        return unavailable("worker channel");
    };
    let info = channel.info();
    ok(json!({
        "target": info.target,
        "state": info.state.as_str(),
        "reconnect_attempts": info.reconnect_attempts,
        "max_reconnects": info.max_reconnects,
        "last_error": info.last_error,
    }))
}

/// `POST /api/dashboard/reconnect`.
pub async fn reconnect(State(app): State<AppState>) -> Response {
    let Some(channel) = &app.channel else {
        return unavailable("worker channel");
    };
    channel.force_reconnect();
    ok(json!({ "state": channel.state().as_str() }))
}

#[cfg(test)]
#[path = "dashboard_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher: HTTP webhook in, RPC call out, HTTP response back.
//!
//! Semantics are at-most-once: a call already submitted to the transport
//! is never retried. The single allowed retry is for idempotent methods
//! that failed fast with `Unavailable` before submission, and it waits out
//! the dial grace window.

use crate::app::AppState;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use wb_core::{
    ChannelState, ErrorCode, HandlerRequest, HandlerResult, LogEvent, LogLevel, Method, Payload,
};
use wb_engine::Execution;
use wb_worker::ChannelError;

/// Deadline override header, milliseconds.
pub const DEADLINE_HEADER: &str = "x-webhook-deadline-ms";

/// Entry point for all four webhook methods.
pub async fn dispatch(
    State(app): State<AppState>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
    method: axum::http::Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    app.stats.record_request();

    // Only the four routed methods reach this handler.
    let method = match method.as_str().parse::<Method>() {
        Ok(method) => method,
        Err(_) => {
            return error_response(&app, ErrorCode::Internal, "unroutable method", None);
        }
    };

    if body.len() > app.config.tracking.max_input_size {
        return error_response(
            &app,
            ErrorCode::PayloadTooLarge,
            &format!(
                "payload of {} bytes exceeds limit of {}",
                body.len(),
                app.config.tracking.max_input_size
            ),
            None,
        );
    }

    let payload = match normalize_payload(method, query.as_deref(), &headers, &body) {
        Ok(payload) => payload,
        Err(reject) => return reject.into_response(&app),
    };

    let request = match HandlerRequest::new(name.clone(), method, payload) {
        Ok(request) => request,
        Err(_) => {
            return error_response(&app, ErrorCode::HandlerNotFound, "invalid handler name", None)
        }
    };

    let Some(channel) = app.channel.clone() else {
        return error_response(
            &app,
            ErrorCode::Unavailable,
            "worker is disabled",
            Some(ChannelState::Disconnected),
        );
    };

    // Cancelled when the drain window expires, or (via the guard) when
    // the client disconnects and axum drops this future.
    let call_token = app.calls_token.child_token();
    let _cancel_on_drop = call_token.clone().drop_guard();
    let mut outcome_guard = CancelGuard::new(&app, &name, method);

    // Handler resolution: a fresh descriptor cache that lacks the name is
    // definitive. An expired cache is refreshed opportunistically; if the
    // refresh fails the worker itself arbitrates unknown names.
    let known = match app.descriptors.fresh() {
        Some(list) => Some(list.iter().any(|d| d.name == request.handler_name)),
        None => match app.descriptors.get(&channel, &call_token).await {
            Ok(list) => Some(list.iter().any(|d| d.name == request.handler_name)),
            Err(_) => None,
        },
    };
    if known == Some(false) {
        outcome_guard.disarm();
        return error_response(
            &app,
            ErrorCode::HandlerNotFound,
            &format!("no handler named {:?}", request.handler_name),
            None,
        );
    }

    let deadline = call_deadline(&app, &headers);
    let started = Instant::now();

    let mut result = channel.call_handler(&request, deadline, &call_token, false).await;
    if matches!(result, Err(ChannelError::Unavailable { submitted: false, .. }))
        && method.is_idempotent()
    {
        // The call never reached the transport, so one retry with grace
        // is safe, on whatever deadline budget remains. A submitted call
        // may already have executed and is never retried.
        let remaining = deadline.saturating_sub(started.elapsed());
        result = channel.call_handler(&request, remaining, &call_token, true).await;
    }

    outcome_guard.disarm();
    match result {
        Ok(handler_result) => finish_success(&app, &request, handler_result, started),
        Err(error) => finish_error(&app, &request, error, started),
    }
}

/// Records a cancelled outcome if the handler future is dropped before a
/// result is produced (client disconnect).
struct CancelGuard {
    app: AppState,
    handler: String,
    method: Method,
    armed: bool,
}

impl CancelGuard {
    fn new(app: &AppState, handler: &str, method: Method) -> Self {
        Self { app: app.clone(), handler: handler.to_string(), method, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut data = Payload::new();
        data.insert("outcome".to_string(), json!("cancelled"));
        data.insert("method".to_string(), json!(self.method.as_str()));
        let event = LogEvent::handler(
            epoch_ms(),
            LogLevel::Warn,
            self.handler.clone(),
            "request cancelled by client",
        )
        .with_data(data);
        self.app.log_event(event);
    }
}

/// Per-call deadline: the configured default, shrunk by the request's
/// deadline header when present.
fn call_deadline(app: &AppState, headers: &HeaderMap) -> Duration {
    let configured = app.config.tracking.call_timeout;
    headers
        .get(DEADLINE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .map_or(configured, |requested| requested.min(configured))
}

/// Payload rejection reasons local to normalization.
enum Reject {
    UnsupportedMedia(String),
    InvalidPayload(String),
}

impl Reject {
    fn into_response(self, app: &AppState) -> Response {
        match self {
            Reject::UnsupportedMedia(detail) => {
                error_response(app, ErrorCode::UnsupportedMedia, &detail, None)
            }
            Reject::InvalidPayload(detail) => {
                let body = json!({
                    "status_code": 400,
                    "message": detail,
                    "code": "invalid_payload",
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}

/// Build the payload: query parameters for GET/DELETE, parsed body for
/// POST/PUT. JSON bodies keep their value types; everything else is
/// stringified.
fn normalize_payload(
    method: Method,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Payload, Reject> {
    if !method.has_body() {
        let pairs: Vec<(String, String)> = query
            .map(serde_urlencoded::from_str)
            .transpose()
            .map_err(|e| Reject::InvalidPayload(format!("bad query string: {e}")))?
            .unwrap_or_default();
        let mut payload = Payload::new();
        for (key, value) in pairs {
            payload.insert(key, Value::String(value));
        }
        return Ok(payload);
    }

    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());

    match content_type.as_deref() {
        Some("application/json") => {
            if body.is_empty() {
                return Ok(Payload::new());
            }
            match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => {
                    // A non-object JSON body is wrapped under one key.
                    let mut payload = Payload::new();
                    payload.insert("payload".to_string(), other);
                    Ok(payload)
                }
                Err(e) => Err(Reject::InvalidPayload(format!("malformed JSON body: {e}"))),
            }
        }
        Some("application/x-www-form-urlencoded") => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
                .map_err(|e| Reject::InvalidPayload(format!("bad form body: {e}")))?;
            let mut payload = Payload::new();
            for (key, value) in pairs {
                payload.insert(key, Value::String(value));
            }
            Ok(payload)
        }
        None if body.is_empty() => Ok(Payload::new()),
        Some(other) => Err(Reject::UnsupportedMedia(format!("unsupported content type: {other}"))),
        None => {
            Err(Reject::UnsupportedMedia("missing content type on non-empty body".to_string()))
        }
    }
}

/// Successful RPC: record, log, shape the stable response body.
fn finish_success(
    app: &AppState,
    request: &HandlerRequest,
    result: HandlerResult,
    started: Instant,
) -> Response {
    let duration = started.elapsed();
    app.stats.record_execution(&request.handler_name, request.method, started);
    let success = result.is_success();
    if !success {
        app.stats.record_error(&request.handler_name, request.method);
    }

    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut data = Payload::new();
    data.insert("method".to_string(), json!(request.method.as_str()));
    data.insert("status_code".to_string(), json!(result.status_code));
    data.insert("duration_ms".to_string(), json!(duration.as_millis() as u64));
    app.log_event(
        LogEvent::handler(
            epoch_ms(),
            level,
            request.handler_name.clone(),
            format!(
                "executed {} {} ({}) in {}ms",
                request.method,
                request.handler_name,
                result.status_code,
                duration.as_millis()
            ),
        )
        .with_data(data),
    );

    record_execution_row(app, request, Some(&result), duration, result.error.clone());

    let status_code = result.status_code.clamp(200, 599);
    let mut result_obj = json!({
        "status": if success { "success" } else { "error" },
        "data": result.data,
    });
    if let Some(error) = &result.error {
        result_obj["error"] = json!(error);
    }
    let body = json!({
        "status_code": status_code,
        "message": result.message,
        "data": {
            "plugin": request.handler_name,
            "src_data": request.payload,
            "result": result_obj,
        },
    });
    let status =
        StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

/// Failed RPC: map the channel error to the taxonomy, record where the
/// execution actually ran (timeouts and remote failures), and shape a
/// stable error body.
fn finish_error(
    app: &AppState,
    request: &HandlerRequest,
    error: ChannelError,
    started: Instant,
) -> Response {
    let (code, message) = match error {
        ChannelError::Unavailable { state, .. } => {
            let message = format!("worker channel is {state}");
            return error_response(app, ErrorCode::Unavailable, &message, Some(state));
        }
        ChannelError::Timeout => {
            app.stats.record_execution(&request.handler_name, request.method, started);
            app.stats.record_error(&request.handler_name, request.method);
            record_execution_row(
                app,
                request,
                None,
                started.elapsed(),
                Some("timeout".to_string()),
            );
            (ErrorCode::Timeout, "handler execution deadline exceeded".to_string())
        }
        ChannelError::Cancelled => {
            (ErrorCode::Cancelled, "request cancelled".to_string())
        }
        ChannelError::Remote { code, message } if code == "plugin_not_found" => {
            (ErrorCode::HandlerNotFound, message)
        }
        ChannelError::Remote { code, message } => {
            app.stats.record_execution(&request.handler_name, request.method, started);
            app.stats.record_error(&request.handler_name, request.method);
            record_execution_row(app, request, None, started.elapsed(), Some(message.clone()));
            (ErrorCode::RemoteError, format!("worker error {code}: {message}"))
        }
        ChannelError::ReplyTooLarge(len) => {
            app.stats.record_execution(&request.handler_name, request.method, started);
            app.stats.record_error(&request.handler_name, request.method);
            (ErrorCode::RemoteError, format!("worker reply of {len} bytes exceeds limit"))
        }
        ChannelError::UnexpectedReply => {
            (ErrorCode::Internal, "unexpected reply from worker".to_string())
        }
    };

    let mut data = Payload::new();
    data.insert("method".to_string(), json!(request.method.as_str()));
    data.insert("code".to_string(), json!(code.as_str()));
    app.log_event(
        LogEvent::handler(
            epoch_ms(),
            LogLevel::Error,
            request.handler_name.clone(),
            format!("{} {} failed: {message}", request.method, request.handler_name),
        )
        .with_data(data),
    );

    error_response(app, code, &message, None)
}

/// Append to the optional execution log.
fn record_execution_row(
    app: &AppState,
    request: &HandlerRequest,
    result: Option<&HandlerResult>,
    duration: Duration,
    error: Option<String>,
) {
    let Some(executions) = &app.executions else { return };
    let input = serde_json::to_vec(&request.payload).unwrap_or_default();
    let output = result.and_then(|r| serde_json::to_vec(&r.data).ok());
    let row = Execution::new(
        request.handler_name.clone(),
        request.method,
        chrono::Utc::now(),
        duration.as_millis() as u64,
        &input,
        output.as_deref(),
        error,
    );
    if let Err(e) = executions.append(row) {
        tracing::warn!(error = %e, "execution log append failed");
    }
}

/// Stable error body shared by every dispatcher failure path.
pub(crate) fn error_response(
    app: &AppState,
    code: ErrorCode,
    message: &str,
    channel_state: Option<ChannelState>,
) -> Response {
    // Release mode keeps internal failure detail out of response bodies.
    let detail = match (app.config.server.mode, code) {
        (crate::config::Mode::Release, ErrorCode::Internal) => "internal error".to_string(),
        _ => message.to_string(),
    };
    let mut body = json!({
        "status_code": code.http_status(),
        "message": detail,
        "code": code.as_str(),
    });
    if let Some(state) = channel_state {
        body["channel_state"] = json!(state.as_str());
    }
    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;

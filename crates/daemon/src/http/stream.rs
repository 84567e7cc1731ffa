// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-sent event stream over a monitor subscription.
//!
//! The subscription lives exactly as long as the HTTP connection: axum
//! drops the stream when the client disconnects, and dropping the
//! subscription removes it from the hub.

use crate::app::AppState;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;
use wb_core::EventCategory;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Comma-separated category filter, e.g. `log,metrics_tick`.
    /// Absent means all categories.
    pub categories: Option<String>,
}

/// `GET /api/dashboard/monitor/stream`.
pub async fn monitor_stream(
    State(app): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = params.categories.as_deref().map(parse_categories);
    let subscription = app.monitor.subscribe(filter);

    let stream = stream::unfold(subscription, |subscription| async move {
        let event = subscription.recv().await?;
        let sse = Event::default()
            .event(event.category().as_str())
            .data(serde_json::to_string(&event).unwrap_or_default());
        Some((Ok(sse), subscription))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn parse_categories(raw: &str) -> HashSet<EventCategory> {
    raw.split(',')
        .filter_map(|part| match part.trim() {
            "log" => Some(EventCategory::Log),
            "handler_update" => Some(EventCategory::HandlerUpdate),
            "metrics_tick" => Some(EventCategory::MetricsTick),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution statistics and shared state enums.

use crate::method::Method;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key for per-handler statistics: one counter set per (handler, method).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatKey {
    pub handler: String,
    pub method: Method,
}

impl StatKey {
    pub fn new(handler: impl Into<String>, method: Method) -> Self {
        Self { handler: handler.into(), method }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.handler, self.method)
    }
}

/// Counters for one (handler, method) key.
///
/// Invariants: `count >= errors`; counters are monotonic between resets;
/// `avg_latency_ms` is the incremental mean of observed durations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerStat {
    pub count: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    /// Milliseconds since the Unix epoch of the most recent execution.
    pub last_execution_ms: Option<u64>,
}

impl HandlerStat {
    /// Fold one execution sample into the incremental mean.
    pub fn record(&mut self, duration_ms: f64, now_ms: u64) {
        self.count += 1;
        self.avg_latency_ms += (duration_ms - self.avg_latency_ms) / self.count as f64;
        self.last_execution_ms = Some(now_ms);
    }
}

/// Bridge-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_requests: u64,
    pub total_executions: u64,
    pub total_errors: u64,
    /// Milliseconds since the Unix epoch when the engine started.
    pub start_time_ms: u64,
}

/// Worker child process lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Starting,
    Ready,
    Exiting,
    Exited,
    /// Restart ceiling breached; terminal.
    Failed,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Starting => "starting",
            WorkerState::Ready => "ready",
            WorkerState::Exiting => "exiting",
            WorkerState::Exited => "exited",
            WorkerState::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RPC channel state as observed by the dispatcher and the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Reconnecting => "reconnecting",
            ChannelState::Failed => "failed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events streamed to monitor subscribers.

use crate::log::LogEvent;
use crate::stats::{ChannelState, GlobalStats};
use serde::{Deserialize, Serialize};

/// Category tag used for subscriber filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Log,
    HandlerUpdate,
    MetricsTick,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Log => "log",
            EventCategory::HandlerUpdate => "handler_update",
            EventCategory::MetricsTick => "metrics_tick",
        }
    }
}

/// An event published to the monitor fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A log event was retained.
    Log { event: LogEvent },
    /// Handler list or channel state changed.
    HandlerUpdate {
        timestamp_ms: u64,
        channel_state: ChannelState,
        /// Handler names currently advertised, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handlers: Option<Vec<String>>,
    },
    /// Periodic counters snapshot.
    MetricsTick { timestamp_ms: u64, global: GlobalStats },
}

impl MonitorEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            MonitorEvent::Log { .. } => EventCategory::Log,
            MonitorEvent::HandlerUpdate { .. } => EventCategory::HandlerUpdate,
            MonitorEvent::MetricsTick { .. } => EventCategory::MetricsTick,
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory retention of recent log events.
//!
//! The ring holds the most recent N events; older events are discarded on
//! append. Lives behind its own lock, separate from the counter engine, so
//! log appends never contend with counter updates.

use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use wb_core::{LogEvent, LogLevel, LogSource};

/// Default retention when the config does not override it.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Filters for [`LogRing::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// Minimum severity.
    pub level: Option<LogLevel>,
    pub source: Option<LogSource>,
    pub handler: Option<String>,
    /// Maximum events returned, most recent last. 0 means no limit.
    pub limit: usize,
}

/// Ring buffer of recent log events.
pub struct LogRing {
    inner: Mutex<VecDeque<LogEvent>>,
    capacity: usize,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { inner: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    /// Append an event, discarding the oldest when at capacity.
    pub fn add(&self, event: LogEvent) {
        let mut ring = self.inner.lock();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(event);
    }

    /// Events matching the query, oldest first.
    pub fn query(&self, query: &LogQuery) -> Vec<LogEvent> {
        let ring = self.inner.lock();
        let matches: Vec<LogEvent> = ring
            .iter()
            .filter(|event| {
                query.level.map_or(true, |min| event.level >= min)
                    && query.source.map_or(true, |s| event.source == s)
                    && query
                        .handler
                        .as_deref()
                        .map_or(true, |h| event.handler_name.as_deref() == Some(h))
            })
            .cloned()
            .collect();
        if query.limit > 0 && matches.len() > query.limit {
            matches[matches.len() - query.limit..].to_vec()
        } else {
            matches
        }
    }

    /// Distinct handler names seen in retained events, sorted.
    pub fn handlers_seen(&self) -> BTreeSet<String> {
        let ring = self.inner.lock();
        ring.iter().filter_map(|e| e.handler_name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;

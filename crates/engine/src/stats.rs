// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-handler execution counters under a single lock.
//!
//! Writers hold the lock only for the counter update; readers clone a
//! consistent snapshot out. Counter updates within one (handler, method)
//! key are totally ordered because the lock serializes writers.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::time::Instant;
use wb_core::{Clock, GlobalStats, HandlerStat, Method, StatKey};

/// A consistent point-in-time copy of all counters.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub global: GlobalStats,
    /// Per-handler counters in first-seen order.
    pub per_handler: Vec<(StatKey, HandlerStat)>,
    /// Bumped by [`StatsEngine::reset`] so subscribers can detect the
    /// discontinuity.
    pub reset_generation: u64,
}

struct Inner {
    global: GlobalStats,
    per_handler: IndexMap<StatKey, HandlerStat>,
    reset_generation: u64,
}

/// The counter engine. One per bridge; shared via `Arc`.
pub struct StatsEngine<C: Clock> {
    clock: C,
    inner: Mutex<Inner>,
}

impl<C: Clock> StatsEngine<C> {
    pub fn new(clock: C) -> Self {
        let start_time_ms = clock.epoch_ms();
        Self {
            clock,
            inner: Mutex::new(Inner {
                global: GlobalStats { start_time_ms, ..GlobalStats::default() },
                per_handler: IndexMap::new(),
                reset_generation: 0,
            }),
        }
    }

    /// Restore counters from a recovered snapshot, keeping the current
    /// start time.
    pub fn restore(&self, global: GlobalStats, per_handler: Vec<(StatKey, HandlerStat)>) {
        let mut inner = self.inner.lock();
        let start_time_ms = inner.global.start_time_ms;
        inner.global = GlobalStats { start_time_ms, ..global };
        inner.per_handler = per_handler.into_iter().collect();
    }

    /// Count one inbound request, before handler resolution.
    pub fn record_request(&self) {
        self.inner.lock().global.total_requests += 1;
    }

    /// Count one completed execution and fold its duration into the mean.
    pub fn record_execution(&self, handler: &str, method: Method, started_at: Instant) {
        let duration_ms = self.clock.now().duration_since(started_at).as_secs_f64() * 1000.0;
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        inner.global.total_executions += 1;
        inner
            .per_handler
            .entry(StatKey::new(handler, method))
            .or_default()
            .record(duration_ms, now_ms);
    }

    /// Count one failed execution.
    pub fn record_error(&self, handler: &str, method: Method) {
        let mut inner = self.inner.lock();
        inner.global.total_errors += 1;
        inner.per_handler.entry(StatKey::new(handler, method)).or_default().errors += 1;
    }

    /// Atomic read of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        StatsSnapshot {
            global: inner.global.clone(),
            per_handler: inner.per_handler.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            reset_generation: inner.reset_generation,
        }
    }

    /// Zero all counters and bump the reset generation.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let start_time_ms = inner.global.start_time_ms;
        inner.global = GlobalStats { start_time_ms, ..GlobalStats::default() };
        inner.per_handler.clear();
        inner.reset_generation += 1;
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "stats_property_tests.rs"]
mod property_tests;

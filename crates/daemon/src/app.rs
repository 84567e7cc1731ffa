// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state passed to all HTTP handlers.

use crate::config::Config;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wb_core::{
    HandlerDescriptor, LogEvent, MonitorEvent, SystemClock,
};
use wb_engine::{ExecutionLog, LogRing, MonitorHub, StatsEngine};
use wb_worker::{Channel, ChannelError, Discovery, WorkerSupervisor};

/// Shared daemon context, cloned into every handler via axum `State`.
#[derive(Clone)]
pub struct AppState(pub Arc<AppInner>);

impl std::ops::Deref for AppState {
    type Target = AppInner;

    fn deref(&self) -> &AppInner {
        &self.0
    }
}

/// The daemon's wiring. Worker-facing parts are `None` in no-worker mode.
pub struct AppInner {
    pub config: Config,
    pub stats: Arc<StatsEngine<SystemClock>>,
    pub logs: Arc<LogRing>,
    pub monitor: Arc<MonitorHub>,
    pub executions: Option<Arc<ExecutionLog>>,
    pub channel: Option<Arc<Channel>>,
    pub supervisor: Option<Arc<WorkerSupervisor>>,
    pub discovery: Option<Arc<Discovery>>,
    pub descriptors: DescriptorCache,
    pub start_time: Instant,
    /// Cancelled once the drain window expires; every in-flight dispatch
    /// call derives its token from this one.
    pub calls_token: CancellationToken,
}

impl AppState {
    /// Retain a log event and publish it to monitor subscribers.
    pub fn log_event(&self, event: LogEvent) {
        self.monitor.publish(&MonitorEvent::Log { event: event.clone() });
        self.logs.add(event);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Cached handler descriptors with a short TTL.
///
/// Invalidated on worker reconnect by the channel-state watcher task; a
/// fresh cache that lacks a name is definitive for 404s.
pub struct DescriptorCache {
    entry: Mutex<Option<CachedDescriptors>>,
    ttl: Duration,
}

struct CachedDescriptors {
    fetched_at: Instant,
    list: Vec<HandlerDescriptor>,
}

/// Default descriptor cache TTL.
pub const DESCRIPTOR_TTL: Duration = Duration::from_secs(10);

/// Budget for the descriptor list RPC itself.
const LIST_DEADLINE: Duration = Duration::from_secs(5);

impl DescriptorCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: Mutex::new(None), ttl }
    }

    /// The cached list when still fresh.
    pub fn fresh(&self) -> Option<Vec<HandlerDescriptor>> {
        let entry = self.entry.lock();
        entry
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() <= self.ttl)
            .map(|cached| cached.list.clone())
    }

    /// The fresh cache, or a refetch through the channel.
    pub async fn get(
        &self,
        channel: &Channel,
        cancel: &CancellationToken,
    ) -> Result<Vec<HandlerDescriptor>, ChannelError> {
        if let Some(list) = self.fresh() {
            return Ok(list);
        }
        let list = channel.list_handlers(LIST_DEADLINE, cancel, false).await?;
        *self.entry.lock() =
            Some(CachedDescriptors { fetched_at: Instant::now(), list: list.clone() });
        Ok(list)
    }

    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }

    /// Replace the cache contents (used by tests and the reconnect watcher).
    pub fn store(&self, list: Vec<HandlerDescriptor>) {
        *self.entry.lock() = Some(CachedDescriptors { fetched_at: Instant::now(), list });
    }
}

impl Default for DescriptorCache {
    fn default() -> Self {
        Self::new(DESCRIPTOR_TTL)
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution tracking and monitoring engine.
//!
//! Owns the per-handler counters, the bounded log ring, the optional
//! execution log, snapshot persistence, and the monitor fan-out. No HTTP
//! or RPC concerns live here; the daemon wires this engine to both.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod executions;
mod logs;
mod monitor;
mod persist;
mod saver;
mod stats;

pub use executions::{Execution, ExecutionLog, ExecutionLogError};
pub use logs::{LogQuery, LogRing};
pub use monitor::{MonitorHub, Subscription};
pub use persist::{
    LoadOutcome, LoadSource, PersistError, PersistedSnapshot, SnapshotStore,
    SNAPSHOT_SCHEMA_VERSION,
};
pub use saver::spawn_saver;
pub use stats::{StatsEngine, StatsSnapshot};

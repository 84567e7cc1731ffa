// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process management: interpreter discovery, child supervision,
//! and the RPC channel to the running worker.
//!
//! The worker itself is a black box reached over loopback TCP; this crate
//! never loads user code. The daemon owns the wiring between these parts
//! and the tracking engine.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod channel;
pub mod interpreter;
pub mod supervisor;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use channel::{Backoff, Channel, ChannelConfig, ChannelError, ChannelInfo, HealthStatus};
pub use interpreter::{
    Discovery, DiscoveryError, InterpreterConfig, InterpreterRecord, InterpreterStrategy,
};
pub use supervisor::{SupervisorConfig, SupervisorError, WorkerStatus, WorkerSupervisor};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeWorker;

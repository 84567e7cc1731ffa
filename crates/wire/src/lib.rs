// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC protocol between the bridge and the worker process.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. Each
//! message is an envelope carrying a call id, so any number of calls can be
//! in flight on one connection; the worker replies in any order and the
//! client matches replies to calls by id.
//!
//! The protocol is schema-versioned: the first exchange on a connection is
//! `Hello`, and a major-version mismatch fails the dial.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod message;

pub use frame::{
    decode, encode, read_frame, read_frame_unbounded, write_frame, ProtocolError, MAX_FRAME_LEN,
};
pub use message::{
    schema_compatible, PluginInfo, RequestEnvelope, ResponseEnvelope, WorkerRequest,
    WorkerResponse, SCHEMA_VERSION,
};

#[cfg(test)]
mod property_tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bridge error taxonomy.
//!
//! Every failure surfaced to a caller maps to one of these kinds. The kind
//! carries its stable wire code (used in error bodies and dashboard
//! responses) and its HTTP status mapping. Layer-specific error enums in the
//! worker and daemon crates convert into an [`ErrorCode`] at the HTTP
//! boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Abstract error kinds with stable wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Invalid configuration at load.
    Config,
    /// Discovery found no usable interpreter.
    NoInterpreter,
    /// Interpreter version or package check failed.
    InterpreterUnusable,
    /// Required packages absent from the interpreter environment.
    MissingPackages,
    /// Worker readiness deadline exceeded.
    WorkerNotReady,
    /// Worker restart ceiling breached; terminal.
    #[serde(rename = "worker_failed")]
    WorkerPermanentlyFailed,
    /// Channel not connected.
    Unavailable,
    /// Per-call deadline exceeded.
    Timeout,
    /// Client disconnected before the reply.
    Cancelled,
    /// Content type rejected.
    UnsupportedMedia,
    /// Request payload exceeds the configured input limit.
    PayloadTooLarge,
    /// Handler name absent from the descriptor cache.
    HandlerNotFound,
    /// Worker returned an error reply.
    RemoteError,
    /// Panic or unexpected state, caught at the HTTP boundary.
    Internal,
}

impl ErrorCode {
    /// The stable machine-readable code carried in error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Config => "config",
            ErrorCode::NoInterpreter => "no_interpreter",
            ErrorCode::InterpreterUnusable => "interpreter_unusable",
            ErrorCode::MissingPackages => "missing_packages",
            ErrorCode::WorkerNotReady => "worker_not_ready",
            ErrorCode::WorkerPermanentlyFailed => "worker_failed",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::UnsupportedMedia => "unsupported_media",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::HandlerNotFound => "handler_not_found",
            ErrorCode::RemoteError => "remote_error",
            ErrorCode::Internal => "internal",
        }
    }

    /// The HTTP status this kind surfaces as at the dispatcher.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Config => 500,
            ErrorCode::NoInterpreter => 503,
            ErrorCode::InterpreterUnusable => 503,
            ErrorCode::MissingPackages => 503,
            ErrorCode::WorkerNotReady => 503,
            ErrorCode::WorkerPermanentlyFailed => 503,
            ErrorCode::Unavailable => 503,
            ErrorCode::Timeout => 504,
            ErrorCode::Cancelled => 499,
            ErrorCode::UnsupportedMedia => 415,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::HandlerNotFound => 404,
            ErrorCode::RemoteError => 502,
            ErrorCode::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

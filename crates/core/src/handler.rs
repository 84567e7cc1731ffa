// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler request, result, and descriptor types.

use crate::method::Method;
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error from constructing an invalid [`HandlerRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerRequestError {
    #[error("handler name must not be empty")]
    EmptyName,
    #[error("handler name must not contain path separators: {0}")]
    PathSeparator(String),
}

/// A normalized webhook invocation, ready for RPC dispatch.
///
/// Invariant: `handler_name` is non-empty and contains no path separators.
/// Enforced by [`HandlerRequest::new`]; deserialized values are validated
/// at the dispatcher boundary before construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerRequest {
    pub handler_name: String,
    pub method: Method,
    pub payload: Payload,
}

impl HandlerRequest {
    pub fn new(
        handler_name: impl Into<String>,
        method: Method,
        payload: Payload,
    ) -> Result<Self, HandlerRequestError> {
        let handler_name = handler_name.into();
        if handler_name.is_empty() {
            return Err(HandlerRequestError::EmptyName);
        }
        if handler_name.contains(['/', '\\']) {
            return Err(HandlerRequestError::PathSeparator(handler_name));
        }
        Ok(Self { handler_name, method, payload })
    }
}

/// The structured reply from a handler execution.
///
/// Invariant: `error` non-empty implies `status_code >= 400`. Replies that
/// violate this are normalized by [`HandlerResult::normalized`] rather than
/// rejected; the worker is user code and its output is untrusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    pub status_code: u16,
    pub message: String,
    #[serde(default)]
    pub data: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandlerResult {
    /// Normalize a raw worker reply so the error invariant holds.
    ///
    /// An empty error string becomes `None`; a present error with a
    /// success status forces the status to 500.
    pub fn normalized(
        status_code: u16,
        message: String,
        data: Payload,
        error: Option<String>,
    ) -> Self {
        let error = error.filter(|e| !e.is_empty());
        let status_code = match &error {
            Some(_) if status_code < 400 => 500,
            _ => status_code,
        };
        Self { status_code, message, data, error }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status_code < 400
    }
}

/// A handler as advertised by the worker.
///
/// Produced by the `ListPlugins` RPC; cached by the dispatcher for a short
/// TTL and invalidated on worker reconnect. `path` is opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerDescriptor {
    pub name: String,
    pub path: String,
    pub supported_methods: Vec<Method>,
    pub is_active: bool,
}

impl HandlerDescriptor {
    pub fn supports(&self, method: Method) -> bool {
        self.supported_methods.contains(&method)
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed request and response messages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wb_core::Method;

/// Protocol schema version, negotiated in `Hello`.
///
/// Major bumps break compatibility; the minor component is informational.
pub const SCHEMA_VERSION: (u32, u32) = (1, 0);

/// Whether a peer's schema version can interoperate with ours.
pub fn schema_compatible(theirs: (u32, u32)) -> bool {
    theirs.0 == SCHEMA_VERSION.0
}

/// A request frame: call id plus body. Ids are assigned by the client and
/// must be unique among in-flight calls on the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    pub body: WorkerRequest,
}

/// A response frame: the id of the call it answers, plus body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub body: WorkerResponse,
}

/// Requests the bridge sends to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Version handshake; must be the first request on a connection.
    Hello { major: u32, minor: u32 },

    /// Execute a named plugin.
    Execute {
        plugin: String,
        method: Method,
        #[serde(default)]
        data: HashMap<String, String>,
    },

    /// List the plugins the worker currently hosts.
    ListPlugins,

    /// Lightweight liveness probe.
    HealthCheck,
}

/// Replies the worker sends to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    /// Version handshake reply.
    Hello { major: u32, minor: u32 },

    /// Result of an `Execute` call.
    Execute {
        status_code: u16,
        message: String,
        #[serde(default)]
        data: HashMap<String, String>,
        #[serde(default)]
        error: Option<String>,
    },

    /// Plugin listing.
    Plugins { plugins: Vec<PluginInfo> },

    /// Health probe reply.
    Health { status: String, timestamp_ms: u64 },

    /// The worker could not process the request.
    Error { code: String, message: String },
}

/// One plugin as advertised by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub path: String,
    pub supported_methods: Vec<Method>,
    pub is_active: bool,
}

impl From<PluginInfo> for wb_core::HandlerDescriptor {
    fn from(info: PluginInfo) -> Self {
        Self {
            name: info.name,
            path: info.path,
            supported_methods: info.supported_methods,
            is_active: info.is_active,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

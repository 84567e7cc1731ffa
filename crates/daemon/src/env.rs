// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! Environment variables override their configuration-file counterparts;
//! command-line flags override both.

use std::path::PathBuf;

/// Daemon version (from Cargo.toml plus the build's git hash)
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH"));

/// HTTP bind host override
pub fn host() -> Option<String> {
    var("WB_HOST")
}

/// HTTP bind port override
pub fn port() -> Option<u16> {
    var("WB_PORT").and_then(|s| s.parse().ok())
}

/// Run mode override (`debug` or `release`)
pub fn mode() -> Option<String> {
    var("WB_MODE")
}

/// Data directory override
pub fn data_dir() -> Option<PathBuf> {
    var("WB_DATA_DIR").map(PathBuf::from)
}

/// Worker RPC port override
pub fn worker_port() -> Option<u16> {
    var("WB_WORKER_PORT").and_then(|s| s.parse().ok())
}

/// Worker entry script override
pub fn worker_script() -> Option<PathBuf> {
    var("WB_WORKER_SCRIPT").map(PathBuf::from)
}

/// Interpreter path override (forces the custom-path strategy)
pub fn interpreter_path() -> Option<PathBuf> {
    var("WB_INTERPRETER").map(PathBuf::from)
}

/// Log filter override, passed to the tracing subscriber
pub fn log_filter() -> Option<String> {
    var("WB_LOG")
}

/// Default data directory when neither config nor environment sets one:
/// `$XDG_STATE_HOME/webhook-bridge` or `~/.local/state/webhook-bridge`,
/// falling back to `./data`.
pub fn default_data_dir() -> PathBuf {
    dirs::state_dir()
        .map(|d| d.join("webhook-bridge"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

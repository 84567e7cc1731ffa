// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Layered: built-in defaults, then the TOML file, then environment
//! variables, then command-line flags. Durations are written as strings
//! ("500ms", "30s", "5m").

use crate::env;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use wb_core::parse_duration;
use wb_worker::{Backoff, ChannelConfig, InterpreterConfig, InterpreterStrategy, SupervisorConfig};

/// Configuration errors. Fatal at startup (exit code 1).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Logging verbosity and error-body detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Debug,
    #[default]
    Release,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Debug => "debug",
            Mode::Release => "release",
        }
    }

    /// Default tracing filter for this mode.
    pub fn default_filter(&self) -> &'static str {
        match self {
            Mode::Debug => "debug",
            Mode::Release => "info",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Mode::Debug),
            "release" => Ok(Mode::Release),
            other => Err(format!("unknown mode: {other} (expected debug|release)")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path prefix for the webhook endpoint: `/{api_prefix}/webhook/{name}`.
    pub api_prefix: String,
    pub mode: Mode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_prefix: "v1".to_string(),
            mode: Mode::Release,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSection {
    /// `false` runs the bridge without worker, supervisor, or channel.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub script: PathBuf,
    pub extra_args: Vec<String>,
    #[serde(deserialize_with = "de_duration")]
    pub readiness_timeout: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub term_grace: Duration,
    pub max_restarts_per_window: u32,
    #[serde(deserialize_with = "de_duration")]
    pub restart_window: Duration,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 50051,
            script: PathBuf::from("worker/main.py"),
            extra_args: Vec::new(),
            readiness_timeout: Duration::from_secs(30),
            term_grace: Duration::from_secs(2),
            max_restarts_per_window: 5,
            restart_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterpreterSection {
    /// One of `auto`, `custom_path`, `managed_env`, `system_search`.
    pub strategy: String,
    pub custom_path: Option<PathBuf>,
    pub project_dir: PathBuf,
    pub names: Vec<String>,
    /// Minimum version, "major.minor".
    pub min_version: String,
    pub required_packages: Vec<String>,
    pub strict: bool,
    #[serde(deserialize_with = "de_duration")]
    pub cache_ttl: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub probe_timeout: Duration,
}

impl Default for InterpreterSection {
    fn default() -> Self {
        let defaults = InterpreterConfig::default();
        Self {
            strategy: "auto".to_string(),
            custom_path: None,
            project_dir: defaults.project_dir,
            names: defaults.names,
            min_version: "3.8".to_string(),
            required_packages: defaults.required_packages,
            strict: defaults.strict,
            cache_ttl: defaults.cache_ttl,
            probe_timeout: defaults.probe_timeout,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSection {
    #[serde(deserialize_with = "de_duration")]
    pub connect_timeout: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub backoff_base: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub backoff_cap: Duration,
    pub max_reconnects: u32,
    #[serde(deserialize_with = "de_duration")]
    pub dial_grace: Duration,
}

impl Default for ChannelSection {
    fn default() -> Self {
        let defaults = ChannelConfig::default();
        Self {
            connect_timeout: defaults.connect_timeout,
            backoff_base: defaults.backoff.base,
            backoff_cap: defaults.backoff.cap,
            max_reconnects: defaults.max_reconnects,
            dial_grace: defaults.dial_grace,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingSection {
    pub data_dir: Option<PathBuf>,
    #[serde(deserialize_with = "de_duration")]
    pub save_interval: Duration,
    pub log_buffer: usize,
    pub monitor_queue: usize,
    /// Enforced at the dispatcher before RPC submission.
    pub max_input_size: usize,
    /// Enforced at the channel when decoding replies.
    pub max_output_size: usize,
    #[serde(deserialize_with = "de_duration")]
    pub call_timeout: Duration,
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            save_interval: Duration::from_secs(30),
            log_buffer: 1000,
            monitor_queue: 64,
            max_input_size: 1024 * 1024,
            max_output_size: 4 * 1024 * 1024,
            call_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionLogSection {
    pub enabled: bool,
    #[serde(deserialize_with = "de_duration")]
    pub retention: Duration,
}

impl Default for ExecutionLogSection {
    fn default() -> Self {
        Self { enabled: false, retention: Duration::from_secs(30 * 86400) }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleSection {
    #[serde(deserialize_with = "de_duration")]
    pub shutdown_timeout: Duration,
    /// Flush window for open connections before in-flight calls are
    /// cancelled.
    #[serde(deserialize_with = "de_duration")]
    pub drain_window: Duration,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
            drain_window: Duration::from_secs(2),
        }
    }
}

/// The complete daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub worker: WorkerSection,
    pub interpreter: InterpreterSection,
    pub channel: ChannelSection,
    pub tracking: TrackingSection,
    pub execution_log: ExecutionLogSection,
    pub lifecycle: LifecycleSection,
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: Config =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Some(host) = env::host() {
            self.server.host = host;
        }
        if let Some(port) = env::port() {
            self.server.port = port;
        }
        if let Some(mode) = env::mode() {
            if let Ok(mode) = mode.parse() {
                self.server.mode = mode;
            }
        }
        if let Some(dir) = env::data_dir() {
            self.tracking.data_dir = Some(dir);
        }
        if let Some(port) = env::worker_port() {
            self.worker.port = port;
        }
        if let Some(script) = env::worker_script() {
            self.worker.script = script;
        }
        if let Some(path) = env::interpreter_path() {
            self.interpreter.strategy = "custom_path".to_string();
            self.interpreter.custom_path = Some(path);
        }
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.interpreter_strategy()?;
        self.min_version()?;
        if self.server.api_prefix.is_empty() || self.server.api_prefix.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "server.api_prefix must be a single path segment, got {:?}",
                self.server.api_prefix
            )));
        }
        if self.worker.enabled && self.worker.script.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("worker.script must be set".to_string()));
        }
        if self.tracking.max_input_size == 0 {
            return Err(ConfigError::Invalid("tracking.max_input_size must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn interpreter_strategy(&self) -> Result<InterpreterStrategy, ConfigError> {
        match self.interpreter.strategy.as_str() {
            "auto" => Ok(InterpreterStrategy::Auto),
            "custom_path" => Ok(InterpreterStrategy::CustomPath),
            "managed_env" => Ok(InterpreterStrategy::ManagedEnv),
            "system_search" => Ok(InterpreterStrategy::SystemSearch),
            other => Err(ConfigError::Invalid(format!("unknown interpreter.strategy: {other}"))),
        }
    }

    fn min_version(&self) -> Result<(u32, u32), ConfigError> {
        let mut parts = self.interpreter.min_version.split('.');
        let major = parts.next().and_then(|p| p.parse().ok());
        let minor = parts.next().and_then(|p| p.parse().ok());
        match (major, minor) {
            (Some(major), Some(minor)) => Ok((major, minor)),
            _ => Err(ConfigError::Invalid(format!(
                "interpreter.min_version must be \"major.minor\", got {:?}",
                self.interpreter.min_version
            ))),
        }
    }

    /// Effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.tracking.data_dir.clone().unwrap_or_else(env::default_data_dir)
    }

    pub fn interpreter_config(&self) -> Result<InterpreterConfig, ConfigError> {
        Ok(InterpreterConfig {
            strategy: self.interpreter_strategy()?,
            custom_path: self.interpreter.custom_path.clone(),
            project_dir: self.interpreter.project_dir.clone(),
            names: self.interpreter.names.clone(),
            min_version: self.min_version()?,
            required_packages: self.interpreter.required_packages.clone(),
            strict: self.interpreter.strict,
            cache_ttl: self.interpreter.cache_ttl,
            probe_timeout: self.interpreter.probe_timeout,
        })
    }

    pub fn supervisor_config(&self, config_path: Option<PathBuf>) -> SupervisorConfig {
        SupervisorConfig {
            worker_host: self.worker.host.clone(),
            worker_port: self.worker.port,
            script: self.worker.script.clone(),
            config_path,
            extra_args: self.worker.extra_args.clone(),
            readiness_timeout: self.worker.readiness_timeout,
            term_grace: self.worker.term_grace,
            max_restarts_per_window: self.worker.max_restarts_per_window,
            restart_window: self.worker.restart_window,
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            host: self.worker.host.clone(),
            port: self.worker.port,
            connect_timeout: self.channel.connect_timeout,
            backoff: Backoff {
                base: self.channel.backoff_base,
                cap: self.channel.backoff_cap,
                ..Backoff::default()
            },
            max_reconnects: self.channel.max_reconnects,
            dial_grace: self.channel.dial_grace,
            max_reply_bytes: self.tracking.max_output_size,
        }
    }
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

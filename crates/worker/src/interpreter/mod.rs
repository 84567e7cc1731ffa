// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interpreter discovery and validation.
//!
//! Finds a usable dynamic-language interpreter by strategy, probes it for
//! version and required packages, and caches validation results keyed on
//! the absolute interpreter path.

mod probe;

pub use probe::{parse_version, Version};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// How to locate a candidate interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpreterStrategy {
    /// Only the configured custom path.
    CustomPath,
    /// Only a managed environment under the project directory.
    ManagedEnv,
    /// Only executables on the process PATH.
    SystemSearch,
    /// Custom path, then managed environment, then PATH search.
    #[default]
    Auto,
}

/// Discovery configuration.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    pub strategy: InterpreterStrategy,
    pub custom_path: Option<PathBuf>,
    /// Directory checked for a managed venv (`.venv/bin/python`, `venv/bin/python`).
    pub project_dir: PathBuf,
    /// Executable names tried during PATH search, in order.
    pub names: Vec<String>,
    pub min_version: (u32, u32),
    pub required_packages: Vec<String>,
    /// In strict mode every required package must import; otherwise a
    /// version match alone is acceptable.
    pub strict: bool,
    pub cache_ttl: Duration,
    pub probe_timeout: Duration,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            strategy: InterpreterStrategy::Auto,
            custom_path: None,
            project_dir: PathBuf::from("."),
            names: vec!["python3".to_string(), "python".to_string()],
            min_version: (3, 8),
            required_packages: Vec::new(),
            strict: true,
            cache_ttl: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

/// A validated (or failed) interpreter candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterRecord {
    /// Executable name or user-facing label.
    pub name: String,
    pub path: PathBuf,
    pub version: String,
    pub required_packages: Vec<String>,
    pub validated: bool,
    /// Milliseconds since the Unix epoch of the last validation.
    pub last_validated_ms: u64,
    pub validation_error: Option<String>,
}

/// Discovery and validation errors.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("no usable interpreter found")]
    NoInterpreter,

    #[error("interpreter {path} version {version} is below minimum {minimum}")]
    Unusable { path: PathBuf, version: String, minimum: String },

    #[error("interpreter {path} is missing packages: {}", packages.join(", "))]
    MissingPackages { path: PathBuf, packages: Vec<String> },

    #[error("probe failed for {path}: {message}")]
    Probe { path: PathBuf, message: String },
}

/// Why a probed candidate failed validation. Cached alongside the record
/// so repeated lookups within the TTL reproduce the same outcome.
#[derive(Debug, Clone)]
enum Failure {
    BelowMinimum { version: String, minimum: String },
    MissingPackages(Vec<String>),
    Probe(String),
}

struct CacheEntry {
    record: InterpreterRecord,
    failure: Option<Failure>,
    validated_at: Instant,
}

/// Interpreter discovery with a TTL'd validation cache.
pub struct Discovery {
    config: InterpreterConfig,
    cache: Mutex<HashMap<PathBuf, CacheEntry>>,
    active: Mutex<Option<InterpreterRecord>>,
}

impl Discovery {
    pub fn new(config: InterpreterConfig) -> Self {
        Self { config, cache: Mutex::new(HashMap::new()), active: Mutex::new(None) }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Locate the first candidate that validates, caching the result and
    /// recording it as the active interpreter.
    pub async fn discover(&self) -> Result<InterpreterRecord, DiscoveryError> {
        let mut last_error = None;
        for candidate in self.candidates() {
            match self.validate(&candidate).await {
                Ok(record) => {
                    *self.active.lock() = Some(record.clone());
                    return Ok(record);
                }
                Err(e) => {
                    tracing::debug!(path = %candidate.display(), error = %e, "interpreter candidate rejected");
                    last_error = Some(e);
                }
            }
        }
        // Candidates existed but none validated: surface the last reason.
        Err(last_error.unwrap_or(DiscoveryError::NoInterpreter))
    }

    /// Validate one interpreter path, using the cache when fresh.
    ///
    /// A cached failure is returned without re-probing until the TTL
    /// expires or the entry is evicted.
    pub async fn validate(&self, path: &Path) -> Result<InterpreterRecord, DiscoveryError> {
        if let Some(outcome) = self.cached(path) {
            return outcome;
        }
        let (record, failure) = self.probe_uncached(path).await;
        self.cache.lock().insert(
            path.to_path_buf(),
            CacheEntry {
                record: record.clone(),
                failure: failure.clone(),
                validated_at: Instant::now(),
            },
        );
        self.outcome(record, failure)
    }

    /// Drop a cached validation, forcing the next probe to re-run.
    pub fn evict(&self, path: &Path) {
        self.cache.lock().remove(path);
    }

    /// Validate `path` fresh and make it the active interpreter.
    pub async fn activate(&self, path: &Path) -> Result<InterpreterRecord, DiscoveryError> {
        self.evict(path);
        let record = self.validate(path).await?;
        *self.active.lock() = Some(record.clone());
        Ok(record)
    }

    /// The currently active interpreter, if discovery has run.
    pub fn active(&self) -> Option<InterpreterRecord> {
        self.active.lock().clone()
    }

    /// All cached validation records, for the dashboard.
    pub fn records(&self) -> Vec<InterpreterRecord> {
        let mut records: Vec<InterpreterRecord> =
            self.cache.lock().values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// Drop a record from the cache and deactivate it if active.
    pub fn remove(&self, path: &Path) {
        self.evict(path);
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|r| r.path == path) {
            *active = None;
        }
    }

    fn cached(&self, path: &Path) -> Option<Result<InterpreterRecord, DiscoveryError>> {
        let cache = self.cache.lock();
        let entry = cache.get(path)?;
        if entry.validated_at.elapsed() > self.config.cache_ttl {
            return None;
        }
        Some(self.outcome(entry.record.clone(), entry.failure.clone()))
    }

    /// Apply strictness to a probe outcome.
    fn outcome(
        &self,
        record: InterpreterRecord,
        failure: Option<Failure>,
    ) -> Result<InterpreterRecord, DiscoveryError> {
        match failure {
            None => Ok(record),
            // Non-strict mode accepts a version match with missing packages.
            Some(Failure::MissingPackages(_)) if !self.config.strict => Ok(record),
            Some(Failure::MissingPackages(packages)) => {
                Err(DiscoveryError::MissingPackages { path: record.path, packages })
            }
            Some(Failure::BelowMinimum { version, minimum }) => {
                Err(DiscoveryError::Unusable { path: record.path, version, minimum })
            }
            Some(Failure::Probe(message)) => {
                Err(DiscoveryError::Probe { path: record.path, message })
            }
        }
    }

    /// Candidate paths in strategy order. Paths that do not exist are
    /// skipped here so probes only run against real files.
    fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        let strategy = self.config.strategy;

        if matches!(strategy, InterpreterStrategy::CustomPath | InterpreterStrategy::Auto) {
            if let Some(path) = &self.config.custom_path {
                candidates.push(path.clone());
            }
        }
        if matches!(strategy, InterpreterStrategy::ManagedEnv | InterpreterStrategy::Auto) {
            for venv in [".venv", "venv"] {
                for name in &self.config.names {
                    candidates.push(self.config.project_dir.join(venv).join("bin").join(name));
                }
            }
        }
        if matches!(strategy, InterpreterStrategy::SystemSearch | InterpreterStrategy::Auto) {
            candidates.extend(path_search(&self.config.names));
        }

        candidates.retain(|p| p.is_file());
        candidates.dedup();
        candidates
    }

    async fn probe_uncached(&self, path: &Path) -> (InterpreterRecord, Option<Failure>) {
        let now_ms = epoch_ms();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let base = InterpreterRecord {
            name,
            path: path.to_path_buf(),
            version: String::new(),
            required_packages: self.config.required_packages.clone(),
            validated: false,
            last_validated_ms: now_ms,
            validation_error: None,
        };

        let version = match probe::version(path, self.config.probe_timeout).await {
            Ok(version) => version,
            Err(e) => {
                let record = InterpreterRecord { validation_error: Some(e.clone()), ..base };
                return (record, Some(Failure::Probe(e)));
            }
        };
        let version_str = version.to_string();
        if (version.major, version.minor) < self.config.min_version {
            let minimum = format!("{}.{}", self.config.min_version.0, self.config.min_version.1);
            let record = InterpreterRecord {
                version: version_str.clone(),
                validation_error: Some(format!(
                    "version {version_str} is below minimum {minimum}"
                )),
                ..base
            };
            return (record, Some(Failure::BelowMinimum { version: version_str, minimum }));
        }

        let mut missing = Vec::new();
        for package in &self.config.required_packages {
            match probe::has_package(path, package, self.config.probe_timeout).await {
                Ok(true) => {}
                Ok(false) => missing.push(package.clone()),
                Err(e) => {
                    let record = InterpreterRecord {
                        version: version_str,
                        validation_error: Some(e.clone()),
                        ..base
                    };
                    return (record, Some(Failure::Probe(e)));
                }
            }
        }

        if missing.is_empty() {
            (InterpreterRecord { version: version_str, validated: true, ..base }, None)
        } else {
            let record = InterpreterRecord {
                version: version_str,
                validation_error: Some(format!("missing packages: {}", missing.join(", "))),
                ..base
            };
            (record, Some(Failure::MissingPackages(missing)))
        }
    }
}

fn path_search(names: &[String]) -> Vec<PathBuf> {
    let Some(path_var) = std::env::var_os("PATH") else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for dir in std::env::split_paths(&path_var) {
        for name in names {
            let candidate = dir.join(name);
            if candidate.is_file() {
                found.push(candidate);
            }
        }
    }
    found
}

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

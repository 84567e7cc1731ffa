// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version and package probes, run against candidate interpreters.

use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// A parsed interpreter version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parse a version out of interpreter output like `Python 3.11.4`.
///
/// Takes the first dotted numeric token; a missing patch component
/// defaults to zero.
pub fn parse_version(output: &str) -> Option<Version> {
    for token in output.split_whitespace() {
        let mut parts = token.split('.');
        let major = parts.next()?.parse().ok();
        let Some(major) = major else { continue };
        let minor = parts.next().and_then(|p| p.parse().ok());
        let Some(minor) = minor else { continue };
        let patch = parts
            .next()
            .map(|p| p.chars().take_while(char::is_ascii_digit).collect::<String>())
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);
        return Some(Version { major, minor, patch });
    }
    None
}

/// Run `<path> --version` and parse the reported version.
///
/// Checks stdout first, then stderr (older interpreters print the version
/// banner to stderr).
pub async fn version(path: &Path, timeout: Duration) -> Result<Version, String> {
    let output = run(Command::new(path).arg("--version"), timeout).await?;
    parse_version(&output)
        .ok_or_else(|| format!("unparseable version output: {}", output.trim()))
}

/// Run `<path> -c "import <package>"` and report whether the import succeeds.
pub async fn has_package(path: &Path, package: &str, timeout: Duration) -> Result<bool, String> {
    let code = format!("import {package}");
    let status = tokio::time::timeout(
        timeout,
        Command::new(path)
            .arg("-c")
            .arg(code)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status(),
    )
    .await
    .map_err(|_| format!("import probe for {package} timed out"))?
    .map_err(|e| format!("import probe for {package} failed to run: {e}"))?;
    Ok(status.success())
}

async fn run(command: &mut Command, timeout: Duration) -> Result<String, String> {
    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| "probe timed out".to_string())?
        .map_err(|e| format!("probe failed to run: {e}"))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return Ok(stdout.into_owned());
    }
    Ok(String::from_utf8_lossy(&output.stderr).into_owned())
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;

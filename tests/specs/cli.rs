// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary surface: flags and startup exit codes.

use assert_cmd::Command;

#[test]
fn help_lists_the_core_flags() {
    let assert = Command::cargo_bin("wbd").unwrap().arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    for flag in ["--config", "--host", "--port", "--mode", "--no-python"] {
        assert!(output.contains(flag), "help should mention {flag}");
    }
}

#[test]
fn version_prints_the_build_string() {
    Command::cargo_bin("wbd").unwrap().arg("--version").assert().success();
}

#[test]
fn missing_config_file_exits_one() {
    Command::cargo_bin("wbd")
        .unwrap()
        .args(["--config", "/nonexistent/bridge.toml"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn invalid_config_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bridge.toml");
    std::fs::write(&path, "[interpreter]\nstrategy = \"bogus\"\n").unwrap();

    Command::cargo_bin("wbd")
        .unwrap()
        .args(["--config", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn invalid_mode_flag_is_rejected() {
    Command::cargo_bin("wbd").unwrap().args(["--mode", "verbose"]).assert().failure();
}

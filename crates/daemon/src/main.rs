// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wbd`, the webhook bridge daemon.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use wb_daemon::lifecycle::{exit_codes, signals, Bridge};
use wb_daemon::{Config, Mode};

#[derive(Debug, Parser)]
#[command(name = "wbd", version = wb_daemon::env::VERSION, about = "Webhook bridge daemon")]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP bind host (overrides config and environment)
    #[arg(long)]
    host: Option<String>,

    /// HTTP bind port (overrides config and environment)
    #[arg(long)]
    port: Option<u16>,

    /// Logging verbosity and error-body detail
    #[arg(long, value_parser = parse_mode)]
    mode: Option<Mode>,

    /// Run without the worker: no interpreter discovery, no child
    /// process, no channel; webhooks answer 503
    #[arg(long = "no-python")]
    no_python: bool,
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    s.parse()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("wbd: {message}");
            return ExitCode::from(exit_codes::STARTUP_FAILURE);
        }
    };

    // The guard flushes the daemon log file on exit.
    let _log_guard = init_tracing(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("wbd: failed to start runtime: {e}");
            return ExitCode::from(exit_codes::STARTUP_FAILURE);
        }
    };

    let code = runtime.block_on(run(config, cli));
    ExitCode::from(code)
}

/// Layer the configuration: defaults, file, environment, CLI flags.
fn load_config(cli: &Cli) -> Result<Config, String> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    config.apply_env();
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(mode) = cli.mode {
        config.server.mode = mode;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Stderr plus a non-blocking daemon log file under the data directory.
fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = wb_daemon::env::log_filter()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(config.server.mode.default_filter()));

    let file_layer = std::fs::create_dir_all(config.data_dir()).ok().map(|()| {
        let appender = tracing_appender::rolling::never(config.data_dir(), "wbd.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer);
        (layer, guard)
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match file_layer {
        Some((file_layer, guard)) => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).with(file_layer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).init();
            None
        }
    }
}

async fn run(config: Config, cli: Cli) -> u8 {
    let shutdown_timeout = config.lifecycle.shutdown_timeout;
    let running = match Bridge::start(config, cli.no_python, cli.config.clone()).await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return exit_codes::STARTUP_FAILURE;
        }
    };

    signals::wait_for_shutdown_signal().await;
    running.stop(shutdown_timeout).await
}

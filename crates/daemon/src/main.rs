// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Propeller manager daemon (propellerd)
//!
//! Background process that owns the orchestration loops: pub/sub control
//! plane, task dispatch, result ingestion, and FL round progression.

use propeller_daemon::{lifecycle, Config};
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("propellerd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("propellerd {}", env!("CARGO_PKG_VERSION"));
                println!("Propeller manager daemon - dispatches wasm workloads to proplets");
                println!();
                println!("USAGE:");
                println!("    propellerd [--config <path>]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <path>  Path to a TOML config file");
                println!("    -h, --help           Print help information");
                println!("    -v, --version        Print version information");
                return Ok(());
            }
            "--config" | "-c" => {
                let Some(path) = args.next() else {
                    eprintln!("error: --config requires a path");
                    std::process::exit(1);
                };
                config_path = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: propellerd [--config <path>]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load(config_path.as_deref())?;
    let _log_guard = setup_logging(&config)?;

    let manager = match lifecycle::startup(&config).await {
        Ok(manager) => manager,
        Err(e) => {
            error!("failed to start manager: {e}");
            return Err(e.into());
        }
    };

    info!("manager ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    manager.shutdown().await;
    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().map(PathBuf::from).unwrap_or_else(|| {
                PathBuf::from("propellerd.log")
            });
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}

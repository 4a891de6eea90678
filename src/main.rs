//! GPU Workload Watchdog
//!
//! Restarts a docker compose GPU workload when something says it is broken.
//!
//! # Architecture Overview
//!
//! ```text
//!   docker compose logs -f ──▶ LogWatcher (primary) ─────────┐
//!                                                              │   RestartQueue
//!   journalctl -k --follow ──▶ KernelWatcher ─(unit active?)──┼──▶ (bounded) ──▶ Actuator ──▶ docker compose
//!                                   ▲                          │                              restart -t 0
//!                                   └── systemd (D-Bus)        │
//!   FIFO / Unix socket ──────▶ ControlHandler (allow-list) ───┘
//!
//!   every source ──▶ MetricSink ──▶ MetricsWorker ──▶ restarts{reason} ──▶ GET /metrics
//! ```

use std::process::ExitCode;

use clap::Parser;

use gpu_watchdog::config::{load_config, validate_config, CliArgs, ConfigError, WatchdogConfig};
use gpu_watchdog::lifecycle::signals::shutdown_on_signal;
use gpu_watchdog::observability::logging::init_logging;
use gpu_watchdog::{start, Collaborators, WatchdogError};

fn load(args: CliArgs) -> Result<WatchdogConfig, WatchdogError> {
    let file = match &args.config {
        Some(path) => load_config(path)?,
        None => WatchdogConfig::default(),
    };
    let config = args.overlay(file);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

async fn run(config: WatchdogConfig) -> Result<(), WatchdogError> {
    let collaborators = Collaborators::connect(&config).await?;
    let watchdog = start(config, collaborators).await?;

    let shutdown = watchdog.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = shutdown_on_signal(shutdown).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    });

    watchdog.wait().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load(CliArgs::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("gpu-watchdog: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging.level, config.logging.format);
    tracing::info!(
        project_dir = %config.compose.project_dir.display(),
        services = ?config.compose.services,
        control = ?config.control.path,
        metrics_port = ?config.metrics.port,
        "gpu-watchdog v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Watchdog failed");
            ExitCode::FAILURE
        }
    }
}

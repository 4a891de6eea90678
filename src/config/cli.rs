//! Command-line flags. Any flag given overrides the config file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::WatchdogConfig;
use crate::observability::logging::LogFormat;
use crate::sources::control::ControlKind;

#[derive(Debug, Parser)]
#[command(name = "gpu-watchdog")]
#[command(about = "Restarts a GPU workload when its logs, the kernel, or an operator say so", long_about = None)]
pub struct CliArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Main directory with docker-compose.yml
    #[arg(short = 'd', long)]
    pub docker_dir: Option<PathBuf>,

    /// Compose service to watch and restart (the primary workload)
    #[arg(short = 's', long)]
    pub service: Option<String>,

    /// Services that are also allowed to be restarted
    #[arg(short = 'a', long = "allowed-service")]
    pub allowed_services: Vec<String>,

    /// FIFO control file
    #[arg(short = 'f', long, conflicts_with = "control_socket")]
    pub fifo_path: Option<PathBuf>,

    /// Unix socket control endpoint
    #[arg(long)]
    pub control_socket: Option<PathBuf>,

    /// Prometheus HTTP metrics port
    #[arg(short = 'p', long)]
    pub prometheus_port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl CliArgs {
    /// Apply flags on top of `config`.
    pub fn overlay(self, mut config: WatchdogConfig) -> WatchdogConfig {
        if let Some(dir) = self.docker_dir {
            config.compose.project_dir = dir;
        }

        if let Some(primary) = self.service {
            let mut services = vec![primary];
            services.extend(self.allowed_services);
            config.compose.services = services;
        } else if !self.allowed_services.is_empty() {
            config.compose.services.truncate(1);
            config.compose.services.extend(self.allowed_services);
        }

        if let Some(path) = self.fifo_path {
            config.control.path = Some(path);
            config.control.kind = ControlKind::Fifo;
        }
        if let Some(path) = self.control_socket {
            config.control.path = Some(path);
            config.control.kind = ControlKind::Socket;
        }

        if let Some(port) = self.prometheus_port {
            config.metrics.port = Some(port);
        }

        if self.json_logs {
            config.logging.format = LogFormat::Json;
        }

        config
    }
}

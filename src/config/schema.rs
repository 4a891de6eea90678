//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::logging::LogFormat;
use crate::observability::metrics::RestartReason;
use crate::services::ServiceSet;
use crate::sources::control::ControlKind;
use crate::sources::signature::DEFAULT_SIGNATURES;

/// Root configuration for the watchdog.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Compose project and managed services.
    pub compose: ComposeConfig,

    /// Restart actuator settings.
    pub actuator: ActuatorConfig,

    /// Per-service log watching.
    pub log_watch: LogWatchConfig,

    /// Kernel journal watching.
    pub kernel: KernelConfig,

    /// Operator control channel.
    pub control: ControlConfig,

    /// Metrics exposition.
    pub metrics: MetricsConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

impl WatchdogConfig {
    /// Managed services, primary first. `None` when none are configured.
    pub fn service_set(&self) -> Option<ServiceSet> {
        ServiceSet::from_names(self.compose.services.iter().cloned())
    }

    /// Unit whose `ActiveState` gates kernel-fault restarts.
    pub fn primary_unit(&self) -> Option<String> {
        self.kernel.primary_unit.clone().or_else(|| {
            self.compose
                .services
                .first()
                .map(|s| format!("{s}{}", self.actuator.unit_suffix))
        })
    }
}

/// Compose project configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ComposeConfig {
    /// Directory holding `docker-compose.yml`.
    pub project_dir: PathBuf,

    /// Managed service names. The first one is the primary workload.
    pub services: Vec<String>,
}

/// Where restarts are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorBackend {
    /// `docker compose restart <service> -t 0`.
    #[default]
    Compose,
    /// systemd `RestartUnit` on `<service><unit_suffix>`.
    Systemd,
}

/// Restart actuator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub backend: ActuatorBackend,

    /// Outstanding restart requests buffered before producers wait.
    pub queue_capacity: usize,

    /// Suffix mapping a service name to its systemd unit.
    pub unit_suffix: String,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            backend: ActuatorBackend::Compose,
            queue_capacity: 10,
            unit_suffix: ".service".to_string(),
        }
    }
}

/// Log watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogWatchConfig {
    pub enabled: bool,

    /// Tail only the primary service. Auxiliaries are operator-restarted,
    /// so tailing them is opt-in.
    pub primary_only: bool,

    /// Fixed delay before reconnecting to an ended log stream.
    pub reconnect_delay_secs: u64,

    /// Lines of history replayed on each connect.
    pub tail_lines: u32,

    /// Substrings that mark a failed workload.
    pub failure_signatures: Vec<String>,
}

impl LogWatchConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for LogWatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            primary_only: true,
            reconnect_delay_secs: 5,
            tail_lines: 1,
            failure_signatures: DEFAULT_SIGNATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Kernel journal watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KernelConfig {
    pub enabled: bool,

    /// Token marking an NVIDIA GPU fault.
    pub fault_marker: String,

    /// Token attributing the fault to the workload runtime.
    pub runtime_token: String,

    /// Unit checked before restarting. Defaults to the primary service's unit.
    pub primary_unit: Option<String>,

    /// Replay the newest journal entry before following.
    pub replay_last: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fault_marker: "Xid".to_string(),
            runtime_token: "python".to_string(),
            primary_unit: None,
            replay_last: true,
        }
    }
}

/// Control channel configuration. Disabled without a path.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControlConfig {
    pub path: Option<PathBuf>,
    pub kind: ControlKind,
}

/// Metrics configuration. Exposition is disabled without a port.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub port: Option<u16>,

    pub bind_address: String,

    /// Reason recorded when an operator restarts the primary.
    pub manual_reason: RestartReason,
}

impl MetricsConfig {
    /// Listen address, or `None` when exposition is disabled or the bind
    /// address does not parse.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        let port = self.port.filter(|p| *p > 0)?;
        let ip: IpAddr = self.bind_address.parse().ok()?;
        Some(SocketAddr::new(ip, port))
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind_address: "0.0.0.0".to_string(),
            manual_reason: RestartReason::Timeout,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this crate when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

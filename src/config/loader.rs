//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::WatchdogConfig;
use crate::config::validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse configuration from TOML text. Validation happens after the command
/// line has been merged in.
pub fn parse_config(content: &str) -> Result<WatchdogConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<WatchdogConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ActuatorBackend;
    use crate::observability::metrics::RestartReason;
    use crate::sources::control::ControlKind;

    #[test]
    fn parses_full_file() {
        let config = parse_config(
            r#"
            [compose]
            project_dir = "/srv/sd"
            services = ["sd", "upscaler"]

            [actuator]
            backend = "systemd"
            queue_capacity = 32

            [log_watch]
            failure_signatures = ["CUDA error"]

            [control]
            path = "/run/watchdog/control"
            kind = "socket"

            [metrics]
            port = 9100
            manual_reason = "manual"
            "#,
        )
        .unwrap();

        assert_eq!(config.compose.services, ["sd", "upscaler"]);
        assert_eq!(config.actuator.backend, ActuatorBackend::Systemd);
        assert_eq!(config.actuator.queue_capacity, 32);
        assert_eq!(config.log_watch.failure_signatures, ["CUDA error"]);
        assert_eq!(config.log_watch.reconnect_delay_secs, 5);
        assert_eq!(config.control.kind, ControlKind::Socket);
        assert_eq!(config.metrics.port, Some(9100));
        assert_eq!(config.metrics.manual_reason, RestartReason::Manual);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.compose.services.is_empty());
        assert!(config.kernel.enabled);
    }

    #[test]
    fn unknown_reason_is_a_parse_error() {
        let err = parse_config("[metrics]\nmanual_reason = \"oops\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/watchdog.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/watchdog.toml"));
    }
}

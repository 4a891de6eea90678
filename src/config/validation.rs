//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Service names usable as compose services and control arguments
//! - Value ranges (queue capacity, delays, non-empty tokens)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WatchdogConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::actuator::MIN_QUEUE_CAPACITY;
use crate::config::schema::WatchdogConfig;
use crate::observability::metrics::RestartReason;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("compose project directory is not set")]
    MissingProjectDir,

    #[error("no managed services configured")]
    NoServices,

    #[error("service {0:?} is listed more than once")]
    DuplicateService(String),

    #[error("service name {0:?} is empty or contains whitespace")]
    InvalidServiceName(String),

    #[error("queue capacity {0} is below the minimum of {min}", min = MIN_QUEUE_CAPACITY)]
    QueueTooSmall(usize),

    #[error("log reconnect delay must be greater than zero")]
    ZeroReconnectDelay,

    #[error("at least one failure signature is required")]
    NoSignatures,

    #[error("failure signatures must not be empty strings")]
    EmptySignature,

    #[error("kernel fault marker and runtime token must not be empty")]
    EmptyFaultToken,

    #[error("metrics bind address {0:?} is not an IP address")]
    InvalidBindAddress(String),

    #[error("manual restart reason must be `timeout` or `manual`, got `{0}`")]
    InvalidManualReason(RestartReason),
}

pub fn validate_config(config: &WatchdogConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.compose.project_dir.as_os_str().is_empty() {
        errors.push(ValidationError::MissingProjectDir);
    }

    if config.compose.services.is_empty() {
        errors.push(ValidationError::NoServices);
    }

    let mut seen = HashSet::new();
    for name in &config.compose.services {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            errors.push(ValidationError::InvalidServiceName(name.clone()));
        } else if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateService(name.clone()));
        }
    }

    if config.actuator.queue_capacity < MIN_QUEUE_CAPACITY {
        errors.push(ValidationError::QueueTooSmall(config.actuator.queue_capacity));
    }

    if config.log_watch.enabled {
        if config.log_watch.reconnect_delay_secs == 0 {
            errors.push(ValidationError::ZeroReconnectDelay);
        }
        if config.log_watch.failure_signatures.is_empty() {
            errors.push(ValidationError::NoSignatures);
        } else if config.log_watch.failure_signatures.iter().any(String::is_empty) {
            errors.push(ValidationError::EmptySignature);
        }
    }

    if config.kernel.enabled
        && (config.kernel.fault_marker.is_empty() || config.kernel.runtime_token.is_empty())
    {
        errors.push(ValidationError::EmptyFaultToken);
    }

    if config.metrics.port.is_some()
        && config.metrics.bind_address.parse::<std::net::IpAddr>().is_err()
    {
        errors.push(ValidationError::InvalidBindAddress(
            config.metrics.bind_address.clone(),
        ));
    }

    if !matches!(
        config.metrics.manual_reason,
        RestartReason::Timeout | RestartReason::Manual
    ) {
        errors.push(ValidationError::InvalidManualReason(
            config.metrics.manual_reason,
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Crate-level error taxonomy.
//!
//! Runtime failures inside the watch loops are logged where they happen and
//! never surface here. Only configuration and startup failures propagate,
//! and both are fatal.

use std::net::SocketAddr;

use thiserror::Error;

use crate::backends::BackendError;
use crate::config::ConfigError;
use crate::sources::control::EndpointError;

/// Failures while bringing the watchdog up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no managed services configured")]
    NoServices,

    #[error("cannot connect to init system: {0}")]
    InitSystem(#[source] BackendError),

    #[error("cannot open kernel journal: {0}")]
    Journal(#[source] BackendError),

    #[error(transparent)]
    Control(#[from] EndpointError),

    #[error("cannot bind metrics endpoint {addr}: {source}")]
    MetricsBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error returned from `main`.
#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("startup failed: {0}")]
    Startup(#[from] StartupError),
}

//! GPU workload watchdog library.

pub mod actuator;
pub mod backends;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod services;
pub mod sources;

pub use config::WatchdogConfig;
pub use error::{StartupError, WatchdogError};
pub use lifecycle::{start, Collaborators, Shutdown, Watchdog};
pub use services::{ManagedService, RestartRequest, ServiceRole, ServiceSet};

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional TOML file
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (command-line flags overlay the file)
//!     → validation.rs (semantic checks on the merged result)
//!     → WatchdogConfig (validated, immutable)
//!     → each subsystem receives the slice it needs at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults so a bare command line is a complete config
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::CliArgs;
pub use loader::{load_config, ConfigError};
pub use schema::{
    ActuatorBackend, ActuatorConfig, ComposeConfig, ControlConfig, KernelConfig, LogWatchConfig,
    LoggingConfig, MetricsConfig, WatchdogConfig,
};
pub use validation::{validate_config, ValidationError};

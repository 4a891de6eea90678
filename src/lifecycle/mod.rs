//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → connect collaborators → create control endpoint
//!     → bind metrics → spawn workers (metrics, actuator) → spawn sources
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast to every task → join with deadline → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Consumers (metrics, actuator) start before producers (sources)
//! - Shutdown has timeout: remaining tasks are aborted after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, Collaborators, Watchdog};

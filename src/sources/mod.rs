//! Signal sources.
//!
//! # Data Flow
//! ```text
//! log.rs     (primary)          line matches signature ─┐
//! kernel.rs  (one)              Xid fault + unit active ─┼→ RestartQueue::enqueue
//! control.rs (one)              "restart <service>"     ─┘  MetricSink::record
//! ```
//!
//! # Design Decisions
//! - Sources share nothing mutable; configuration is passed in at
//!   construction and never changes
//! - Every suspension point also waits on the shutdown signal
//! - Errors are logged and the loop continues on its next natural iteration

pub mod control;
pub mod kernel;
pub mod log;
pub mod signature;

pub use control::{ControlEndpoint, ControlHandler, ControlKind};
pub use kernel::{FaultDetector, KernelWatcher};
pub use log::LogWatcher;
pub use signature::FailureSignatures;

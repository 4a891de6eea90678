//! Restart actuator subsystem.
//!
//! # Data Flow
//! ```text
//! sources (log, kernel, control)
//!     → RestartQueue::enqueue (bounded mpsc, shared by all producers)
//!     → Actuator worker (single consumer)
//!     → Restarter::restart(service) one at a time
//! ```
//!
//! # Design Decisions
//! - Exactly one worker: restarts never overlap and run in arrival order
//! - A full queue suspends the producer until space frees; duplicates are
//!   harmless because restarts are idempotent downstream
//! - Failed restarts are logged and dropped, never retried

pub mod queue;
pub mod worker;

pub use queue::{restart_queue, RestartQueue, MIN_QUEUE_CAPACITY};
pub use worker::Actuator;

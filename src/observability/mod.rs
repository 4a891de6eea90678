//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!
//! Signal sources produce:
//!     → metrics.rs MetricSink::record (non-blocking)
//!     → MetricsWorker (single consumer)
//!     → `restarts{reason}` counter
//!     → GET /metrics (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Metric recording never blocks a signal source or the actuator
//! - One counter, one low-cardinality label
//! - Exposition is optional; recording always happens

pub mod logging;
pub mod metrics;

//! Kernel journal watcher.
//!
//! Follows kernel-originated journal entries and, on an NVIDIA Xid fault
//! attributed to the workload runtime, restarts every managed service, but
//! only while the primary unit is `active`. A unit in any other state is
//! presumably already stopping or restarting, so the fault is logged and
//! ignored.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::actuator::RestartQueue;
use crate::backends::{InitSystem, Journal, JournalEntry};
use crate::observability::metrics::{MetricSink, RestartReason};
use crate::services::ServiceSet;

/// Recognizes GPU faults caused by the workload.
#[derive(Debug, Clone)]
pub struct FaultDetector {
    fault_marker: String,
    runtime_token: String,
}

impl FaultDetector {
    pub fn new(fault_marker: impl Into<String>, runtime_token: impl Into<String>) -> Self {
        Self {
            fault_marker: fault_marker.into(),
            runtime_token: runtime_token.into(),
        }
    }

    /// Both the fault marker and the runtime token must appear.
    pub fn is_fault(&self, message: &str) -> bool {
        message.contains(&self.fault_marker) && message.contains(&self.runtime_token)
    }
}

impl Default for FaultDetector {
    fn default() -> Self {
        Self::new("Xid", "python")
    }
}

/// What the watcher did with a journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Not a workload GPU fault.
    NotAFault,
    /// Fault seen while the primary unit was in the given non-active state.
    Skipped(String),
    /// Fault seen but the unit state could not be read.
    StateUnknown,
    /// Restarts queued for this many services.
    Restarted(usize),
}

/// Watches the kernel journal for workload GPU faults.
pub struct KernelWatcher {
    journal: Box<dyn Journal>,
    init: Arc<dyn InitSystem>,
    services: ServiceSet,
    primary_unit: String,
    detector: FaultDetector,
    queue: RestartQueue,
    metrics: MetricSink,
}

impl KernelWatcher {
    pub fn new(
        journal: Box<dyn Journal>,
        init: Arc<dyn InitSystem>,
        services: ServiceSet,
        primary_unit: impl Into<String>,
        detector: FaultDetector,
        queue: RestartQueue,
        metrics: MetricSink,
    ) -> Self {
        Self {
            journal,
            init,
            services,
            primary_unit: primary_unit.into(),
            detector,
            queue,
            metrics,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(unit = %self.primary_unit, "Kernel journal watcher starting");

        loop {
            let next = tokio::select! {
                next = self.journal.next_entry() => next,
                _ = shutdown.recv() => {
                    tracing::info!("Kernel watcher received shutdown signal, exiting loop");
                    break;
                }
            };

            match next {
                Ok(Some(entry)) => {
                    self.handle_entry(&entry).await;
                }
                Ok(None) => {
                    tracing::error!("Kernel journal source ended, GPU faults are no longer watched");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read journal entry");
                }
            }
        }
    }

    pub async fn handle_entry(&self, entry: &JournalEntry) -> FaultOutcome {
        if !self.detector.is_fault(&entry.message) {
            return FaultOutcome::NotAFault;
        }

        tracing::warn!(message = %entry.message, "GPU error detected");

        let state = match self.init.active_state(&self.primary_unit).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(unit = %self.primary_unit, error = %e, "Failed to query unit state");
                return FaultOutcome::StateUnknown;
            }
        };

        if state != "active" {
            tracing::info!(
                unit = %self.primary_unit,
                state = %state,
                "Unit not active, ignoring GPU error"
            );
            return FaultOutcome::Skipped(state);
        }

        tracing::info!(unit = %self.primary_unit, "Unit is active, restarting all services");
        for service in self.services.iter() {
            self.queue.enqueue(service.name.as_str()).await;
        }
        self.metrics.record(RestartReason::Xid, 1);

        FaultOutcome::Restarted(self.services.len())
    }
}

//! Restart metrics and their exposition.
//!
//! # Metrics
//! - `restarts` (counter): restarts requested, labelled by `reason`
//!   (`python`, `xid`, `timeout`, and optionally `manual`)
//!
//! # Design Decisions
//! - Producers push `MetricEvent`s into an unbounded queue so recording never
//!   stalls failure detection
//! - A single worker owns the Prometheus recorder; the HTTP endpoint only
//!   reads rendered snapshots
//! - The recorder is local to the worker rather than process-global, so every
//!   sink under test has its own registry

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

/// Counter name exposed on `/metrics`.
pub const RESTARTS_COUNTER: &str = "restarts";

/// Why a restart was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartReason {
    /// A failure signature matched in the workload's log.
    Python,
    /// The kernel reported an NVIDIA Xid fault for the workload.
    Xid,
    /// Operator restart of the primary, reported as `timeout`.
    Timeout,
    /// Operator restart of the primary, reported under its own label.
    Manual,
}

impl RestartReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartReason::Python => "python",
            RestartReason::Xid => "xid",
            RestartReason::Timeout => "timeout",
            RestartReason::Manual => "manual",
        }
    }
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for label values outside the reason vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown restart reason `{0}`")]
pub struct UnknownReason(pub String);

impl FromStr for RestartReason {
    type Err = UnknownReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(RestartReason::Python),
            "xid" => Ok(RestartReason::Xid),
            "timeout" => Ok(RestartReason::Timeout),
            "manual" => Ok(RestartReason::Manual),
            other => Err(UnknownReason(other.to_string())),
        }
    }
}

/// A reason-tagged counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricEvent {
    pub reason: RestartReason,
    pub amount: u64,
}

/// Producer handle for the metric sink. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MetricSink {
    tx: mpsc::UnboundedSender<MetricEvent>,
}

impl MetricSink {
    /// Queue a counter increment. Never blocks.
    pub fn record(&self, reason: RestartReason, amount: u64) {
        if self.tx.send(MetricEvent { reason, amount }).is_err() {
            tracing::debug!(reason = %reason, "Metric sink closed, dropping event");
        }
    }
}

/// Consumer side of the metric sink.
pub struct MetricsWorker {
    rx: mpsc::UnboundedReceiver<MetricEvent>,
    recorder: PrometheusRecorder,
}

/// Create a metric sink, its worker, and a read-only handle for exposition.
pub fn metric_sink() -> (MetricSink, MetricsWorker, PrometheusHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    (MetricSink { tx }, MetricsWorker { rx, recorder }, handle)
}

impl MetricsWorker {
    /// Apply queued events until shutdown or until every sink is dropped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.apply(event),
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::info!("Metrics worker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn apply(&self, event: MetricEvent) {
        if event.amount == 0 {
            tracing::warn!(reason = %event.reason, "Ignoring zero metric increment");
            return;
        }

        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(RESTARTS_COUNTER, "reason" => event.reason.as_str())
                .increment(event.amount);
        });
        tracing::debug!(reason = %event.reason, amount = event.amount, "Restart counter incremented");
    }
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Router serving the registry at `GET /metrics`.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(handle)
}

/// Bind the metrics listener. Called during startup so bind errors are fatal.
pub async fn bind_metrics(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Metrics endpoint listening");
    Ok(listener)
}

/// Serve `/metrics` until shutdown.
pub async fn serve_metrics(
    listener: TcpListener,
    handle: PrometheusHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    axum::serve(listener, metrics_router(handle))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Metrics endpoint stopped");
    Ok(())
}

//! Service log watcher.
//!
//! # States
//! ```text
//! Connect ──ok──▶ Stream ──end of stream──▶ Reconnect (fixed delay) ──▶ Connect
//!    └──────error (logged)──────────────────────▲
//! ```
//!
//! Runs until shutdown. A service that cannot be tailed is retried after the
//! same fixed delay; it never takes the watchdog down.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio::time::sleep;

use crate::actuator::RestartQueue;
use crate::backends::{LogStream, LogTailer};
use crate::observability::metrics::{MetricSink, RestartReason};
use crate::sources::signature::FailureSignatures;

/// Tails one service's log and requests a restart on failure signatures.
pub struct LogWatcher {
    service: String,
    tailer: Arc<dyn LogTailer>,
    signatures: FailureSignatures,
    queue: RestartQueue,
    metrics: MetricSink,
    reconnect_delay: Duration,
}

impl LogWatcher {
    pub fn new(
        service: impl Into<String>,
        tailer: Arc<dyn LogTailer>,
        signatures: FailureSignatures,
        queue: RestartQueue,
        metrics: MetricSink,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            service: service.into(),
            tailer,
            signatures,
            queue,
            metrics,
            reconnect_delay,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(service = %self.service, "Log watcher starting");

        loop {
            let opened = tokio::select! {
                opened = self.tailer.tail(&self.service) => opened,
                _ = shutdown.recv() => break,
            };

            match opened {
                Ok(stream) => {
                    if self.follow(stream, &mut shutdown).await.is_break() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(service = %self.service, error = %e, "Failed to open log stream");
                }
            }

            tokio::select! {
                _ = sleep(self.reconnect_delay) => {}
                _ = shutdown.recv() => break,
            }
            tracing::info!(service = %self.service, "Reconnecting to the log");
        }

        tracing::info!(service = %self.service, "Log watcher received shutdown signal, exiting loop");
    }

    /// Scan lines until the stream ends. Breaks on shutdown.
    async fn follow(
        &self,
        mut stream: LogStream,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> ControlFlow<()> {
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = shutdown.recv() => return ControlFlow::Break(()),
            };

            match next {
                Some(Ok(line)) => {
                    self.inspect(&line).await;
                }
                Some(Err(e)) => {
                    tracing::warn!(service = %self.service, error = %e, "Log stream read failed");
                    return ControlFlow::Continue(());
                }
                None => {
                    tracing::debug!(service = %self.service, "Log stream ended");
                    return ControlFlow::Continue(());
                }
            }
        }
    }

    /// Emit one restart request and one `python` metric per signature found
    /// in `line`. Returns how many fired.
    pub async fn inspect(&self, line: &str) -> usize {
        let mut fired = 0;
        for signature in self.signatures.matching(line) {
            tracing::warn!(
                service = %self.service,
                signature,
                "Failure signature in log, restarting"
            );
            self.queue.enqueue(self.service.as_str()).await;
            self.metrics.record(RestartReason::Python, 1);
            fired += 1;
        }
        fired
    }
}

//! The single restart worker.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};

use crate::backends::Restarter;
use crate::services::RestartRequest;

/// Serialized executor of restart side effects.
pub struct Actuator {
    rx: mpsc::Receiver<RestartRequest>,
    restarter: Arc<dyn Restarter>,
}

impl Actuator {
    pub fn new(rx: mpsc::Receiver<RestartRequest>, restarter: Arc<dyn Restarter>) -> Self {
        Self { rx, restarter }
    }

    /// Service requests in FIFO order until shutdown or until every producer
    /// is gone. An in-flight restart always runs to completion.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Restart actuator starting");

        loop {
            let request = tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => {
                        tracing::info!("All restart producers gone, actuator exiting");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Actuator received shutdown signal, exiting loop");
                    break;
                }
            };

            self.execute(request).await;
        }
    }

    async fn execute(&self, request: RestartRequest) {
        tracing::info!(service = %request, "Restarting service");
        let started = Instant::now();

        match self.restarter.restart(&request.service).await {
            Ok(()) => tracing::info!(
                service = %request,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Service restarted"
            ),
            Err(e) => tracing::error!(
                service = %request,
                error = %e,
                "Restart failed, dropping request"
            ),
        }
    }
}

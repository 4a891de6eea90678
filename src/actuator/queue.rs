//! Bounded intake queue shared by every signal source.

use tokio::sync::mpsc;

use crate::services::RestartRequest;

/// Smallest capacity that still absorbs a burst of duplicate requests.
pub const MIN_QUEUE_CAPACITY: usize = 10;

/// Producer handle for the actuator. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RestartQueue {
    tx: mpsc::Sender<RestartRequest>,
}

/// Create the queue. Capacities below [`MIN_QUEUE_CAPACITY`] are raised to it.
pub fn restart_queue(capacity: usize) -> (RestartQueue, mpsc::Receiver<RestartRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(MIN_QUEUE_CAPACITY));
    (RestartQueue { tx }, rx)
}

impl RestartQueue {
    /// Queue a restart of `service`.
    ///
    /// Waits while the queue is full. Never fails from the caller's point of
    /// view; if the actuator has stopped the request is logged and dropped.
    pub async fn enqueue(&self, service: impl Into<String>) {
        let request = RestartRequest::new(service);
        if let Err(mpsc::error::SendError(request)) = self.tx.send(request).await {
            tracing::warn!(service = %request, "Actuator stopped, dropping restart request");
        }
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

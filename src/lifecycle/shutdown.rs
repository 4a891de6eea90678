//! Shutdown coordination for the watchdog.

use tokio::sync::broadcast;

/// Coordinator for cooperative shutdown.
///
/// Every long-running task subscribes once and selects on its receiver at
/// each suspension point. Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe before spawning the task that will observe the signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Safe to call repeatedly; tasks treat any
    /// wake-up of their receiver, including `Lagged` and `Closed`, as shutdown.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of subscribers still holding a receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

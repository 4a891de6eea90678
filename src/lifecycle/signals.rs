//! OS signal handling.
//!
//! SIGTERM and SIGINT both translate into a shutdown trigger.

use tokio::signal::unix::{signal, SignalKind};

use crate::lifecycle::Shutdown;

/// Wait for SIGTERM or SIGINT and return the signal's name.
pub async fn wait_for_termination() -> std::io::Result<&'static str> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
    };
    Ok(name)
}

/// Trigger `shutdown` on the first termination signal.
pub async fn shutdown_on_signal(shutdown: Shutdown) -> std::io::Result<()> {
    let name = wait_for_termination().await?;
    tracing::info!(signal = name, "Shutdown signal received");
    shutdown.trigger();
    Ok(())
}

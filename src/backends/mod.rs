//! External collaborators.
//!
//! # Data Flow
//! ```text
//! sources/log.rs     → LogTailer::tail      → docker compose logs -f
//! actuator/worker.rs → Restarter::restart   → docker compose restart -t 0
//!                                             (or systemd RestartUnit)
//! sources/kernel.rs  → Journal::next_entry  → journalctl -k --follow
//!                    → InitSystem::active_state → systemd over D-Bus
//! ```
//!
//! # Design Decisions
//! - Every collaborator is a trait so sources and the actuator can be driven
//!   by in-memory fakes under test
//! - Failures come back as `BackendError`; callers log and carry on
//! - Each call is an independent process or D-Bus call, so no locking is
//!   needed between concurrent callers

pub mod compose;
pub mod journal;
pub mod systemd;

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

pub use compose::DockerCompose;
pub use journal::{JournalCtl, JournalEntry};
pub use systemd::Systemd;

/// A followed, newline-delimited log stream. Ends when the producer exits.
pub type LogStream = Pin<Box<dyn Stream<Item = io::Result<String>> + Send>>;

/// Errors raised by external collaborators.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A helper process could not be spawned.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A helper process ran but reported failure.
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// Reading from a helper process failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// D-Bus call to the init system failed.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A journal record could not be decoded.
    #[error("malformed journal entry: {0}")]
    Journal(String),
}

/// Result type for collaborator calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Follows a service's log output.
#[async_trait]
pub trait LogTailer: Send + Sync {
    /// Open a live, following read of `service`'s log stream.
    async fn tail(&self, service: &str) -> BackendResult<LogStream>;
}

/// Performs the restart side effect.
#[async_trait]
pub trait Restarter: Send + Sync {
    /// Restart `service` with a zero shutdown grace period.
    async fn restart(&self, service: &str) -> BackendResult<()>;
}

/// A followed source of kernel journal entries.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Wait for the next entry. `Ok(None)` means the journal source ended.
    async fn next_entry(&mut self) -> BackendResult<Option<JournalEntry>>;
}

/// Read-mostly access to the init system.
#[async_trait]
pub trait InitSystem: Send + Sync {
    /// Current `ActiveState` of `unit` (e.g. `active`, `inactive`, `failed`).
    async fn active_state(&self, unit: &str) -> BackendResult<String>;

    /// Restart `unit` directly through the init system.
    async fn restart_unit(&self, unit: &str) -> BackendResult<()>;
}

//! Operator control channel.
//!
//! # Protocol
//! ```text
//! "<command> <argument>"       one message per write-then-close
//! restart <service>            service must be a managed service
//! ```
//!
//! Fire-and-forget: nothing is written back. Malformed messages, unknown
//! commands and services outside the allow-list are logged and dropped.
//!
//! # Endpoints
//! - `fifo`: a named pipe. Each open/read-to-EOF/close cycle is one message,
//!   so writers must close to deliver.
//! - `socket`: a Unix stream socket. Each connection carries one message,
//!   terminated by newline or by the client closing its write side.

use std::fs::Permissions;
use std::io::{self, Read};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, oneshot};

use crate::actuator::RestartQueue;
use crate::observability::metrics::{MetricSink, RestartReason};
use crate::services::ServiceSet;

/// Upper bound on a single control message. Longer messages are drained and
/// rejected.
pub const MAX_MESSAGE_BYTES: u64 = 4096;

/// How long a socket client may take to send its message.
const SOCKET_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed endpoint open before trying again.
const REOPEN_DELAY: Duration = Duration::from_secs(1);

/// Wake-up attempts for a FIFO reader on shutdown, 100ms apart.
const WAKE_ATTEMPTS: usize = 10;

/// Endpoint flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    #[default]
    Fifo,
    Socket,
}

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Restart(String),
}

/// Why a control message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("invalid message {0:?}: expected \"<command> <argument>\"")]
    Malformed(String),

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("service {0:?} is not allowed")]
    NotAllowed(String),

    #[error("message of {0} bytes exceeds the {max} byte limit", max = MAX_MESSAGE_BYTES)]
    TooLong(u64),
}

/// Failure to create the control endpoint. Fatal at startup.
#[derive(Debug, Error)]
#[error("cannot create control endpoint {}: {source}", .path.display())]
pub struct EndpointError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Parse one message. Trailing line terminators are ignored; otherwise the
/// message must split on single spaces into exactly two tokens.
pub fn parse_command(message: &str) -> Result<ControlCommand, ControlError> {
    let message = message.trim_end_matches(['\n', '\r']);
    let tokens: Vec<&str> = message.split(' ').collect();

    let [command, argument] = tokens.as_slice() else {
        return Err(ControlError::Malformed(message.to_string()));
    };

    match *command {
        "restart" => Ok(ControlCommand::Restart(argument.to_string())),
        other => Err(ControlError::UnknownCommand(other.to_string())),
    }
}

/// Validates commands against the allow-list and feeds the actuator.
#[derive(Debug, Clone)]
pub struct ControlHandler {
    services: ServiceSet,
    queue: RestartQueue,
    metrics: MetricSink,
    manual_reason: RestartReason,
}

impl ControlHandler {
    pub fn new(
        services: ServiceSet,
        queue: RestartQueue,
        metrics: MetricSink,
        manual_reason: RestartReason,
    ) -> Self {
        Self {
            services,
            queue,
            metrics,
            manual_reason,
        }
    }

    /// Handle one raw message. Rejections are logged here; the returned
    /// error is informational only.
    pub async fn handle_message(&self, message: &str) -> Result<String, ControlError> {
        let result = self.dispatch(message).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Ignoring control message");
        }
        result
    }

    async fn dispatch(&self, message: &str) -> Result<String, ControlError> {
        match parse_command(message)? {
            ControlCommand::Restart(service) => {
                if self.services.get(&service).is_none() {
                    return Err(ControlError::NotAllowed(service));
                }

                tracing::info!(service = %service, "Restarting by control command");
                self.queue.enqueue(service.as_str()).await;
                if self.services.is_primary(&service) {
                    self.metrics.record(self.manual_reason, 1);
                }
                Ok(service)
            }
        }
    }
}

/// The file-system visible endpoint plus its reader loop.
pub struct ControlEndpoint {
    path: PathBuf,
    kind: ControlKind,
    handler: ControlHandler,
    listener: Option<UnixListener>,
}

impl ControlEndpoint {
    /// Create the endpoint (and its parent directory) with world read/write
    /// permission.
    pub fn create(
        path: impl Into<PathBuf>,
        kind: ControlKind,
        handler: ControlHandler,
    ) -> Result<Self, EndpointError> {
        let path = path.into();
        let err = |source: io::Error| EndpointError {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(err)?;
        }

        let listener = match kind {
            ControlKind::Fifo => {
                create_fifo(&path).map_err(err)?;
                None
            }
            ControlKind::Socket => Some(bind_socket(&path).map_err(err)?),
        };
        std::fs::set_permissions(&path, Permissions::from_mode(0o666)).map_err(err)?;

        tracing::info!(path = %path.display(), kind = ?kind, "Control endpoint created");
        Ok(Self {
            path,
            kind,
            handler,
            listener,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        match (self.kind, self.listener) {
            (ControlKind::Socket, Some(listener)) => {
                run_socket(listener, self.handler, shutdown).await;
                let _ = std::fs::remove_file(&self.path);
            }
            _ => run_fifo(self.path, self.handler, shutdown).await,
        }
    }
}

fn create_fifo(path: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => return Ok(()),
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "path exists and is not a FIFO",
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o666)).map_err(io::Error::from)
}

fn bind_socket(path: &Path) -> io::Result<UnixListener> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path)?,
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "path exists and is not a socket",
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    UnixListener::bind(path)
}

type FifoRead = io::Result<Result<String, ControlError>>;

/// Blocks until a writer opens the FIFO, then reads until every writer closes.
/// Bytes past the limit are drained so they never start a new message.
fn read_fifo_message(path: &Path) -> FifoRead {
    let mut file = std::fs::File::open(path)?;
    let mut buf = Vec::new();
    (&mut file).take(MAX_MESSAGE_BYTES + 1).read_to_end(&mut buf)?;

    if buf.len() as u64 > MAX_MESSAGE_BYTES {
        let rest = io::copy(&mut file, &mut io::sink())?;
        return Ok(Err(ControlError::TooLong(buf.len() as u64 + rest)));
    }
    Ok(Ok(String::from_utf8_lossy(&buf).into_owned()))
}

/// Run one blocking FIFO read on a detached thread. The runtime never joins
/// it, so a reader stuck behind a writer that never closes cannot hold up
/// process exit.
fn spawn_fifo_reader(path: PathBuf) -> oneshot::Receiver<FifoRead> {
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("control-fifo".into())
        .spawn(move || {
            let _ = tx.send(read_fifo_message(&path));
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "Cannot start control FIFO reader thread");
    }
    rx
}

/// Unblock a reader stuck in `open` by connecting and disconnecting as a
/// writer. Fails with ENXIO when no reader is waiting yet.
fn wake_fifo_reader(path: &Path) -> io::Result<()> {
    std::fs::OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
        .map(drop)
}

async fn run_fifo(path: PathBuf, handler: ControlHandler, mut shutdown: broadcast::Receiver<()>) {
    loop {
        let mut read = spawn_fifo_reader(path.clone());

        let received = tokio::select! {
            received = &mut read => received,
            _ = shutdown.recv() => {
                // The blocking open cannot be cancelled, only satisfied.
                let mut woken = false;
                for _ in 0..WAKE_ATTEMPTS {
                    let _ = wake_fifo_reader(&path);
                    if tokio::time::timeout(Duration::from_millis(100), &mut read).await.is_ok() {
                        woken = true;
                        break;
                    }
                }
                if !woken {
                    tracing::warn!("Control FIFO reader still blocked, leaving it behind");
                }
                tracing::info!("Control channel received shutdown signal, exiting loop");
                return;
            }
        };

        match received {
            Ok(Ok(Ok(message))) => {
                let _ = handler.handle_message(&message).await;
            }
            Ok(Ok(Err(rejected))) => {
                tracing::warn!(error = %rejected, "Ignoring control message");
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Error reading control FIFO");
                tokio::select! {
                    _ = tokio::time::sleep(REOPEN_DELAY) => {}
                    _ = shutdown.recv() => return,
                }
            }
            Err(_) => {
                tracing::error!("Control FIFO reader thread exited without a result");
                tokio::select! {
                    _ = tokio::time::sleep(REOPEN_DELAY) => {}
                    _ = shutdown.recv() => return,
                }
            }
        }
    }
}

async fn run_socket(
    listener: UnixListener,
    handler: ControlHandler,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.recv() => {
                tracing::info!("Control channel received shutdown signal, exiting loop");
                return;
            }
        };

        let stream = match accepted {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Control socket accept failed");
                continue;
            }
        };

        let mut reader = BufReader::new(stream.take(MAX_MESSAGE_BYTES + 1));
        let mut message = String::new();
        match tokio::time::timeout(SOCKET_READ_TIMEOUT, reader.read_line(&mut message)).await {
            Ok(Ok(read)) if read as u64 > MAX_MESSAGE_BYTES => {
                let rejected = ControlError::TooLong(read as u64);
                tracing::warn!(error = %rejected, "Ignoring control message");
            }
            Ok(Ok(_)) => {
                let _ = handler.handle_message(&message).await;
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "Error reading control socket"),
            Err(_) => tracing::warn!("Control client sent nothing before timeout"),
        }
    }
}

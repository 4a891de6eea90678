//! Kernel journal follower.
//!
//! Wraps `journalctl --identifier=kernel --follow --output=json`. The
//! subprocess positions itself at the journal tail (optionally replaying the
//! newest prior entry) and then blocks until the kernel logs something, so
//! awaiting the next line is the natural suspension point.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use super::{BackendError, BackendResult, Journal};

/// Pause before respawning a journal follower that exited.
const RESPAWN_DELAY: Duration = Duration::from_secs(1);

/// A single journal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// The `MESSAGE` field.
    pub message: String,
}

impl JournalEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse one line of `journalctl --output=json`.
///
/// `MESSAGE` is a string for UTF-8 payloads and an array of bytes otherwise.
pub fn parse_entry(line: &str) -> BackendResult<JournalEntry> {
    let record: Value =
        serde_json::from_str(line).map_err(|e| BackendError::Journal(e.to_string()))?;

    let message = match record.get("MESSAGE") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(bytes)) => {
            let raw: Vec<u8> = bytes
                .iter()
                .filter_map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            String::from_utf8_lossy(&raw).into_owned()
        }
        Some(Value::Null) | None => String::new(),
        Some(other) => {
            return Err(BackendError::Journal(format!(
                "unexpected MESSAGE type: {other}"
            )))
        }
    };

    Ok(JournalEntry { message })
}

/// Follows kernel-originated journal entries through `journalctl`.
pub struct JournalCtl {
    lines: Option<Lines<BufReader<ChildStdout>>>,
    child: Option<Child>,
}

impl JournalCtl {
    /// Seek to the journal tail and start following.
    ///
    /// With `replay_last` the most recent prior entry is delivered first.
    pub fn open(replay_last: bool) -> BackendResult<Self> {
        let mut journal = Self {
            lines: None,
            child: None,
        };
        journal.spawn(if replay_last { 1 } else { 0 })?;
        Ok(journal)
    }

    fn spawn(&mut self, replay: u32) -> BackendResult<()> {
        let replay = replay.to_string();
        let args = [
            "--identifier=kernel",
            "--follow",
            "--output=json",
            "--lines",
            replay.as_str(),
        ];

        let mut child = Command::new("journalctl")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Spawn {
                command: format!("journalctl {}", args.join(" ")),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "journalctl has no stdout",
            ))
        })?;

        self.lines = Some(BufReader::new(stdout).lines());
        self.child = Some(child);
        Ok(())
    }

    async fn respawn(&mut self) -> BackendResult<()> {
        self.lines = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        tokio::time::sleep(RESPAWN_DELAY).await;
        // Resume at the tail; anything logged while down is not replayed.
        self.spawn(0)
    }
}

#[async_trait]
impl Journal for JournalCtl {
    async fn next_entry(&mut self) -> BackendResult<Option<JournalEntry>> {
        loop {
            let Some(lines) = self.lines.as_mut() else {
                self.respawn().await?;
                continue;
            };

            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return parse_entry(&line).map(Some),
                Ok(None) => {
                    tracing::warn!("journalctl exited, restarting journal follower");
                    self.respawn().await?;
                }
                Err(e) => {
                    self.lines = None;
                    return Err(BackendError::Io(e));
                }
            }
        }
    }
}

//! Docker Compose CLI collaborator.
//!
//! Every call is an independent `docker compose` invocation run from the
//! compose project directory.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures_util::stream;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use super::{BackendError, BackendResult, LogStream, LogTailer, Restarter};

/// Drives `docker compose` for a single project directory.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    project_dir: PathBuf,
    tail_lines: u32,
}

impl DockerCompose {
    pub fn new(project_dir: impl Into<PathBuf>, tail_lines: u32) -> Self {
        Self {
            project_dir: project_dir.into(),
            tail_lines,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("docker");
        cmd.arg("compose").args(args).current_dir(&self.project_dir);
        cmd
    }
}

fn describe(args: &[&str]) -> String {
    format!("docker compose {}", args.join(" "))
}

struct FollowedLog {
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    command: String,
}

/// Stream `child`'s stdout line by line. A non-zero exit ends the stream
/// with an error so the caller sees why it stopped.
fn follow_child(mut child: Child, command: String) -> BackendResult<LogStream> {
    let stdout = child.stdout.take().ok_or_else(|| {
        BackendError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "log process has no stdout",
        ))
    })?;

    let followed = FollowedLog {
        lines: BufReader::new(stdout).lines(),
        child,
        command,
    };

    let lines = stream::unfold(Some(followed), |state| async move {
        let mut followed = state?;
        match followed.lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), Some(followed))),
            Ok(None) => match followed.child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some((
                    Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("`{}` exited with {status}", followed.command),
                    )),
                    None,
                )),
                Err(e) => Some((Err(e), None)),
            },
            Err(e) => {
                let _ = followed.child.kill().await;
                Some((Err(e), None))
            }
        }
    });

    Ok(Box::pin(lines))
}

#[async_trait]
impl LogTailer for DockerCompose {
    async fn tail(&self, service: &str) -> BackendResult<LogStream> {
        let tail_lines = self.tail_lines.to_string();
        let args = ["logs", service, "-n", tail_lines.as_str(), "-f"];

        let child = self
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Spawn {
                command: describe(&args),
                source,
            })?;

        follow_child(child, describe(&args))
    }
}

#[async_trait]
impl Restarter for DockerCompose {
    async fn restart(&self, service: &str) -> BackendResult<()> {
        let args = ["restart", service, "-t", "0"];
        let output = self
            .command(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| BackendError::Spawn {
                command: describe(&args),
                source,
            })?;

        if !output.status.success() {
            return Err(BackendError::CommandFailed {
                command: describe(&args),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

//! Process launcher: spawns the language server as a child process.
//!
//! The launcher resolves the configured executable, spawns it with piped
//! stdio (the duplex byte channel the transport attaches to), and classifies
//! spawn failures into [`LaunchError`] variants. Failures are never retried
//! here; the lifecycle controller surfaces them and leaves the session
//! stopped.

use std::io;
use std::process::Stdio;

use async_process::{Child, ChildStdin, ChildStdout};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::LaunchError;

/// Handle to a spawned language server process.
///
/// Exists only while the session is starting, running, or stopping; the
/// lifecycle controller drops it on the way to `stopped`. `kill_on_drop` is
/// set so an abandoned handle cannot leak the child.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
}

impl ProcessHandle {
    /// Process id of the spawned server.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Takes the child's stdio streams for the transport to attach to.
    ///
    /// ## Errors
    /// Fails if the streams were not captured or were already taken.
    pub(crate) fn take_stdio(&mut self) -> Result<(ChildStdout, ChildStdin), LaunchError> {
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| LaunchError::SpawnFailed("failed to capture stdout".to_string()))?;
        let stdin = self
            .child
            .stdin
            .take()
            .ok_or_else(|| LaunchError::SpawnFailed("failed to capture stdin".to_string()))?;
        Ok((stdout, stdin))
    }

    /// Terminates the process if still alive and reaps it.
    pub(crate) async fn terminate(&mut self) {
        match self.child.try_status() {
            Ok(Some(status)) => {
                debug!(%status, "language server already exited");
                return;
            }
            Ok(None) => {
                if let Err(err) = self.child.kill() {
                    debug!(error = %err, "failed to kill language server");
                }
            }
            Err(err) => {
                debug!(error = %err, "failed to query language server status");
            }
        }
        match self.child.status().await {
            Ok(status) => debug!(%status, "language server terminated"),
            Err(err) => debug!(error = %err, "failed to reap language server"),
        }
    }
}

/// Spawns the language server described by the session configuration.
///
/// The child runs with the workspace root as its working directory, inherits
/// the host environment plus the configured overrides, and exposes stdin and
/// stdout as the session's duplex byte channel. Debug flags are passed
/// through untouched.
///
/// ## Errors
/// [`LaunchError::NotFound`] if the executable does not exist,
/// [`LaunchError::PermissionDenied`] if it is not executable, and
/// [`LaunchError::SpawnFailed`] for anything else.
pub fn launch(config: &SessionConfig) -> Result<ProcessHandle, LaunchError> {
    let command = config.resolved_command();

    let mut cmd = async_process::Command::new(&command);
    cmd.args(config.launch_args())
        .envs(&config.env)
        .current_dir(&config.workspace_root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => LaunchError::NotFound(command.clone()),
        io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied(command.clone()),
        _ => LaunchError::SpawnFailed(format!("'{}': {err}", command.display())),
    })?;

    debug!(command = %command.display(), pid = child.id(), "spawned language server");
    Ok(ProcessHandle { child })
}

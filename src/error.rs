//! Error types for the Bazel language server client.
//!
//! This module defines all error types used throughout the crate,
//! organized by subsystem: process launch, session transport, and
//! session lifecycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionState;

/// Errors raised while resolving and spawning the language server executable.
///
/// None of these are retried automatically; they propagate to the lifecycle
/// controller, which surfaces them to the host and leaves the session stopped.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The resolved executable path does not exist.
    #[error("language server executable not found: {0}")]
    NotFound(PathBuf),

    /// The resolved path exists but is not executable by this process.
    #[error("language server executable not permitted: {0}")]
    PermissionDenied(PathBuf),

    /// The spawn failed for any other reason (resource limits, bad stdio
    /// setup, platform errors).
    #[error("failed to spawn language server: {0}")]
    SpawnFailed(String),
}

/// Errors raised by the session transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A malformed or out-of-sequence wire message. The session is considered
    /// unhealthy and is stopped; the transport does not attempt partial
    /// recovery.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered a request with an error response, or the request
    /// could not be transmitted.
    #[error("request failed: {0}")]
    Request(String),

    /// A pending request was resolved because the session tore down.
    #[error("request cancelled by session teardown")]
    Cancelled,

    /// The transport is no longer attached to a live server process.
    #[error("transport closed")]
    Closed,
}

/// Errors raised by the session lifecycle controller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Launching the server process failed.
    #[error("failed to launch language server: {0}")]
    Launch(#[from] LaunchError),

    /// The `initialize`/`initialized` handshake failed.
    #[error("session startup failed: {0}")]
    Startup(String),

    /// The handshake did not complete within the configured bound.
    #[error("session startup timed out after {0:?}")]
    StartupTimeout(Duration),

    /// The server did not answer the `shutdown` request within the configured
    /// bound. Handled locally by `stop()` (the process is force-terminated);
    /// never surfaced as a hard failure.
    #[error("shutdown request timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// An operation that requires a running session arrived in another state.
    #[error("session is not running (state: {0})")]
    NotRunning(SessionState),

    /// `start()` was called on a session that already left `uninitialized`.
    #[error("session already started (state: {0})")]
    AlreadyStarted(SessionState),

    /// A transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A unified error type for the entire crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Session lifecycle or transport error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error (unreadable file, invalid selector or watch glob).
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LaunchError> for Error {
    fn from(err: LaunchError) -> Self {
        Error::Session(SessionError::Launch(err))
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Session(SessionError::Transport(err))
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_display() {
        let err = LaunchError::NotFound(PathBuf::from("/opt/bazel-lsp/server"));
        assert_eq!(
            err.to_string(),
            "language server executable not found: /opt/bazel-lsp/server"
        );
    }

    #[test]
    fn test_cancelled_display() {
        let err = TransportError::Cancelled;
        assert_eq!(err.to_string(), "request cancelled by session teardown");
    }

    #[test]
    fn test_error_conversion() {
        let launch = LaunchError::SpawnFailed("resource exhausted".to_string());
        let err: Error = launch.into();
        assert!(matches!(
            err,
            Error::Session(SessionError::Launch(LaunchError::SpawnFailed(_)))
        ));
    }

    #[test]
    fn test_session_error_from_transport() {
        let err: SessionError = TransportError::Cancelled.into();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Cancelled)
        ));
    }
}

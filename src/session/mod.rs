//! Language-server session management.
//!
//! One [`Session`] is one logical connection to a language server process.
//! The module is organized into:
//! - `launch`: resolving and spawning the server executable
//! - `transport`: the JSON-RPC channel (framing via `async-lsp`)
//! - `lifecycle`: the state machine that owns the other two
//!
//! # Usage
//!
//! ```ignore
//! use bazel_lsp_client::{Session, SessionConfig};
//!
//! let session = Session::new(SessionConfig::default())?;
//! session.start().await?;
//! // ... forward document and file events ...
//! session.stop().await?;
//! ```

pub mod launch;
pub mod lifecycle;
pub mod transport;

use crate::error::SessionError;

/// Result type for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

pub use launch::ProcessHandle;
pub use lifecycle::{Session, SessionState};
pub use transport::{ServerEvent, Transport};

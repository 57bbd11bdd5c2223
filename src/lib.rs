//! Bazel Language Server Client
//!
//! The editor-side half of an LSP integration for the Bazel/Starlark language
//! server: launches the server as a child process, bridges editor document
//! and file events to it over JSON-RPC stdio, and manages the session
//! lifecycle around the protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   events    ┌──────────────────────────────┐
//! │   Editor host   │────────────►│        Session               │
//! │ (documents, fs  │◄────────────│  lifecycle ── router/watch   │
//! │  watcher, UI)   │ diagnostics │      │                       │
//! └─────────────────┘             │  transport (async-lsp)       │
//!                                 └──────┬───────────────────────┘
//!                                        │ JSON-RPC over stdio
//!                                 ┌──────▼────────┐
//!                                 │   Language    │
//!                                 │   server      │
//!                                 │ (bazel-lsp)   │
//!                                 └───────────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`] - Session configuration (executable, selectors, watches)
//! - [`error`] - Error types for the entire crate
//! - [`router`] - Document selector matching
//! - [`session`] - Process launch, transport, and lifecycle
//! - [`watch`] - File watch bridge
//!
//! # Example
//!
//! ```ignore
//! use bazel_lsp_client::{Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = Session::new(SessionConfig::default())?;
//!     session.start().await?;
//!
//!     // Host event loop forwards document/file events here...
//!
//!     session.stop().await?;
//!     Ok(())
//! }
//! ```

// Enforce documentation and other quality attributes
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are too strict
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod router;
pub mod session;
pub mod watch;

// Re-export commonly used types at the crate root
pub use config::SessionConfig;
pub use error::{Error, LaunchError, Result, SessionError, TransportError};
pub use router::{DocumentSelector, SelectorRule, TextDocument};
pub use session::{ServerEvent, Session, SessionState};
pub use watch::{FileEventKind, WatchSet};

//! Bazel Language Server Client - Entry Point
//!
//! A thin host harness around the session manager: starts a session for a
//! workspace, relays server diagnostics to the log, and stops the session on
//! ctrl-c. Real editor hosts embed the library and drive the session from
//! their own event loops.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lsp_types::MessageType;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use bazel_lsp_client::{ServerEvent, Session, SessionConfig};

/// Editor-side session manager for the Bazel/Starlark language server.
#[derive(Parser, Debug)]
#[command(name = "bazel-lsp-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root directory.
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Path to the language server executable (overrides the config file).
    #[arg(short, long)]
    server: Option<PathBuf>,

    /// Arguments to pass to the language server.
    #[arg(long)]
    server_args: Vec<String>,

    /// Optional JSON configuration file (selectors, watches, timeouts).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Parses the log level string into a tracing Level.
    fn parse_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => anyhow::bail!("invalid log level: {}", other),
        }
    }

    /// Builds the session configuration from the config file and overrides.
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => SessionConfig::default(),
        };
        config.workspace_root = self.workspace.clone();
        if let Some(server) = &self.server {
            config.command = server.clone();
        }
        if !self.server_args.is_empty() {
            config.args = self.server_args.clone();
        }
        Ok(config)
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(level: Level) -> Result<()> {
    // Create an env filter that respects RUST_LOG but has a default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "bazel_lsp_client={level},tower={level},async_lsp={level}"
        ))
    });

    // Logs go to stderr so stdout stays clean for the host
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true),
        )
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

/// Drains server-originated notifications into the log.
async fn relay_server_events(mut events: tokio::sync::mpsc::UnboundedReceiver<ServerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::Diagnostics(params) => {
                info!(
                    uri = %params.uri,
                    count = params.diagnostics.len(),
                    "diagnostics published"
                );
            }
            ServerEvent::ShowMessage(params) => match params.typ {
                MessageType::ERROR => error!(message = %params.message, "server message"),
                MessageType::WARNING => warn!(message = %params.message, "server message"),
                _ => info!(message = %params.message, "server message"),
            },
            ServerEvent::LogMessage(params) => {
                info!(message = %params.message, "server log");
            }
        }
    }
}

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.parse_log_level()?;
    init_tracing(log_level)?;

    let config = args.session_config()?;
    info!(
        workspace = %config.workspace_root.display(),
        server = %config.resolved_command().display(),
        "starting language server session"
    );

    let session = Session::new(config).context("invalid session configuration")?;
    let events = session
        .server_events()
        .expect("fresh session always has an events receiver");
    tokio::spawn(relay_server_events(events));

    session
        .start()
        .await
        .context("failed to start language server session")?;
    info!("session running; press ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("deactivating");
    session.stop().await.context("failed to stop session")?;
    info!("session stopped");

    Ok(())
}

//! Session lifecycle controller.
//!
//! Owns one logical language-server connection: the process handle, the
//! transport, and the lifecycle state machine
//! `uninitialized → starting → running → stopping → stopped`. `stopped` is
//! terminal; restarting means constructing a fresh [`Session`].
//!
//! The controller is the single dispatch point for host events: document
//! events are routed through the configured document selector, filesystem
//! events through the watch set, and both are forwarded over the transport
//! only while the session is running. A transport failure triggers one
//! automatic `stop()`; nothing here retries or restarts.

use std::sync::Arc;

use lsp_types::{
    ClientCapabilities, ClientInfo, DidChangeTextDocumentParams, DidChangeWatchedFilesClientCapabilities,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, InitializeParams,
    PublishDiagnosticsClientCapabilities, TextDocumentClientCapabilities,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentSyncClientCapabilities, TraceValue, Url, VersionedTextDocumentIdentifier,
    WindowClientCapabilities, WorkspaceClientCapabilities, WorkspaceFolder,
};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{Error, SessionError, TransportError};
use crate::router::{DocumentSelector, TextDocument};
use crate::watch::{FileEventKind, WatchSet};

use super::SessionResult;
use super::launch::{self, ProcessHandle};
use super::transport::{ServerEvent, Transport};

/// Lifecycle state of a session.
///
/// States are visited strictly in order; the only shortcut is the startup
/// failure path, which lands directly in `Stopped` after tearing down the
/// half-attached process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet started.
    Uninitialized,
    /// Process spawned, handshake in flight.
    Starting,
    /// Handshake complete; document and file events flow.
    Running,
    /// Teardown in progress.
    Stopping,
    /// Terminal. The process handle is gone and no message is sent.
    Stopped,
}

impl SessionState {
    /// True for transitions the state machine permits.
    pub(crate) fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::{Running, Starting, Stopped, Stopping, Uninitialized};
        matches!(
            (self, next),
            (Uninitialized, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopped)
                // Launch and handshake failures collapse straight to stopped.
                | (Uninitialized, Stopped)
                | (Starting, Stopped)
        )
    }

    /// True once the session can never carry traffic again.
    pub fn is_terminal(self) -> bool {
        self == SessionState::Stopped
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Live resources held while the server process exists.
struct Live {
    process: ProcessHandle,
    transport: Arc<Transport>,
    failure: Option<oneshot::Receiver<TransportError>>,
}

/// Current stage of the session, with its live resources where applicable.
///
/// The process handle existing only inside `Starting`/`Running` keeps the
/// handle and the lifecycle state consistent by construction.
enum Stage {
    Uninitialized,
    Starting(Live),
    Running(Live),
    Stopping,
    Stopped,
}

impl Stage {
    fn state(&self) -> SessionState {
        match self {
            Stage::Uninitialized => SessionState::Uninitialized,
            Stage::Starting(_) => SessionState::Starting,
            Stage::Running(_) => SessionState::Running,
            Stage::Stopping => SessionState::Stopping,
            Stage::Stopped => SessionState::Stopped,
        }
    }
}

struct SessionInner {
    config: SessionConfig,
    selector: DocumentSelector,
    watches: WatchSet,
    stage: Mutex<Stage>,
    state_tx: watch::Sender<SessionState>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<ServerEvent>>>,
}

/// One language-server session.
///
/// Cheaply cloneable handle; all clones share the same underlying session.
/// State transitions are serialized behind one lock, so no two transitions of
/// a session ever run concurrently. Independent sessions share nothing.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.inner.config.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Constructs a session in the `uninitialized` state.
    ///
    /// Compiles the document selector and watch patterns, and canonicalizes
    /// the workspace root. Does not spawn anything; call [`Session::start`].
    ///
    /// ## Errors
    /// Returns a configuration error for an unresolvable workspace root or an
    /// invalid glob.
    pub fn new(mut config: SessionConfig) -> crate::error::Result<Self> {
        config.workspace_root = config.workspace_root.canonicalize().map_err(|err| {
            Error::Config(format!(
                "failed to canonicalize workspace root {}: {err}",
                config.workspace_root.display()
            ))
        })?;
        let selector = DocumentSelector::compile(&config.document_selector, &config.workspace_root)?;
        let watches = WatchSet::compile(&config.watch_patterns, &config.workspace_root)?;

        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                selector,
                watches,
                stage: Mutex::new(Stage::Uninitialized),
                state_tx,
                events_tx,
                events_rx: std::sync::Mutex::new(Some(events_rx)),
            }),
        })
    }

    /// Session identity shown to the user.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribes to lifecycle state changes.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Takes the receiver for server-originated notifications (diagnostics,
    /// show-message, log-message). The host drains this; traffic is relayed
    /// unmodified. Returns `None` after the first call.
    pub fn server_events(&self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        self.inner.events_rx.lock().expect("events receiver lock poisoned").take()
    }

    /// Starts the session: spawns the server process, attaches the transport,
    /// and performs the `initialize`/`initialized` handshake.
    ///
    /// Valid only from `uninitialized`. Any failure terminates the spawned
    /// process and leaves the session in `stopped` — never a half-attached
    /// process.
    ///
    /// ## Errors
    /// [`SessionError::AlreadyStarted`] from any other state; launch and
    /// handshake failures as described in the error types.
    pub async fn start(&self) -> SessionResult<()> {
        let transport = {
            let mut stage = self.inner.stage.lock().await;
            if !matches!(*stage, Stage::Uninitialized) {
                return Err(SessionError::AlreadyStarted(stage.state()));
            }

            let mut process = match launch::launch(&self.inner.config) {
                Ok(process) => process,
                Err(err) => {
                    self.set_stage(&mut stage, Stage::Stopped);
                    return Err(SessionError::Launch(err));
                }
            };
            let (stdout, stdin) = match process.take_stdio() {
                Ok(io) => io,
                Err(err) => {
                    process.terminate().await;
                    self.set_stage(&mut stage, Stage::Stopped);
                    return Err(SessionError::Launch(err));
                }
            };

            let mut transport = Transport::spawn(stdout, stdin, self.inner.events_tx.clone());
            let failure = transport.take_failure();
            let transport = Arc::new(transport);
            info!(
                session = %self.inner.config.name,
                pid = process.id(),
                "language server spawned, starting handshake"
            );
            self.set_stage(
                &mut stage,
                Stage::Starting(Live {
                    process,
                    transport: transport.clone(),
                    failure,
                }),
            );
            transport
        };

        // Handshake runs without the stage lock so stop() can interleave.
        let handshake = async {
            transport
                .initialize(initialize_params(&self.inner.config))
                .await?;
            transport.initialized()?;
            Ok::<(), TransportError>(())
        };

        match tokio::time::timeout(self.inner.config.init_timeout, handshake).await {
            Ok(Ok(())) => {
                let mut stage = self.inner.stage.lock().await;
                match std::mem::replace(&mut *stage, Stage::Stopped) {
                    Stage::Starting(mut live) => {
                        let failure = live.failure.take();
                        *stage = Stage::Running(live);
                        let _ = self.inner.state_tx.send(SessionState::Running);
                        drop(stage);
                        if let Some(rx) = failure {
                            self.spawn_failure_monitor(rx);
                        }
                        info!(session = %self.inner.config.name, "session running");
                        Ok(())
                    }
                    other => {
                        // stop() raced the handshake and owns the teardown.
                        *stage = other;
                        Err(SessionError::Startup(
                            "session stopped during startup".to_string(),
                        ))
                    }
                }
            }
            Ok(Err(TransportError::Cancelled)) => {
                // stop() tore the session down while the handshake was
                // pending; teardown already happened there.
                Err(SessionError::Transport(TransportError::Cancelled))
            }
            Ok(Err(err)) => {
                self.abort_startup().await;
                Err(SessionError::Startup(err.to_string()))
            }
            Err(_elapsed) => {
                self.abort_startup().await;
                Err(SessionError::StartupTimeout(self.inner.config.init_timeout))
            }
        }
    }

    /// Stops the session: `shutdown` request (bounded), `exit` notification,
    /// cancellation of all pending requests, process termination, `stopped`.
    ///
    /// Idempotent: a second call while stopping awaits the teardown already
    /// in flight; calls on a stopped (or never-started) session return
    /// immediately. A shutdown timeout is not a failure — the process is
    /// force-terminated and `stop()` still completes.
    ///
    /// ## Errors
    /// Currently always returns `Ok`; the signature leaves room for teardown
    /// diagnostics.
    pub async fn stop(&self) -> SessionResult<()> {
        let mut live = {
            let mut stage = self.inner.stage.lock().await;
            match std::mem::replace(&mut *stage, Stage::Stopping) {
                Stage::Starting(live) | Stage::Running(live) => {
                    let _ = self.inner.state_tx.send(SessionState::Stopping);
                    live
                }
                Stage::Uninitialized => {
                    *stage = Stage::Uninitialized;
                    debug!(session = %self.inner.config.name, "stop() before start(); nothing to do");
                    return Ok(());
                }
                Stage::Stopping => {
                    drop(stage);
                    self.wait_for_stopped().await;
                    return Ok(());
                }
                Stage::Stopped => {
                    *stage = Stage::Stopped;
                    return Ok(());
                }
            }
        };

        info!(session = %self.inner.config.name, "stopping session");
        match self.request_shutdown(&live.transport).await {
            Ok(()) => debug!("server acknowledged shutdown"),
            Err(err) => warn!(error = %err, "shutdown request did not complete; terminating"),
        }
        if let Err(err) = live.transport.exit() {
            debug!(error = %err, "exit notification failed");
        }
        live.transport.cancel_all();
        live.process.terminate().await;
        live.transport.close();

        let mut stage = self.inner.stage.lock().await;
        self.set_stage(&mut stage, Stage::Stopped);
        info!(session = %self.inner.config.name, "session stopped");
        Ok(())
    }

    /// Forwards a document-open event if the document is in scope.
    ///
    /// Returns `Ok(true)` when forwarded, `Ok(false)` when the selector does
    /// not match.
    ///
    /// ## Errors
    /// Rejected with [`SessionError::NotRunning`] outside the running state;
    /// document events are never queued.
    pub async fn document_opened(&self, doc: &TextDocument, text: &str) -> SessionResult<bool> {
        let transport = self.running_transport().await?;
        if !self.inner.selector.matches(doc) {
            return Ok(false);
        }
        transport.did_open(DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: doc.uri.clone(),
                language_id: doc.language_id.clone(),
                version: doc.version,
                text: text.to_string(),
            },
        })?;
        Ok(true)
    }

    /// Forwards a document-change event (full content sync) if in scope.
    ///
    /// ## Errors
    /// Rejected with [`SessionError::NotRunning`] outside the running state.
    pub async fn document_changed(&self, doc: &TextDocument, text: &str) -> SessionResult<bool> {
        let transport = self.running_transport().await?;
        if !self.inner.selector.matches(doc) {
            return Ok(false);
        }
        transport.did_change(DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier {
                uri: doc.uri.clone(),
                version: doc.version,
            },
            content_changes: vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: text.to_string(),
            }],
        })?;
        Ok(true)
    }

    /// Forwards a document-close event if in scope.
    ///
    /// ## Errors
    /// Rejected with [`SessionError::NotRunning`] outside the running state.
    pub async fn document_closed(&self, doc: &TextDocument) -> SessionResult<bool> {
        let transport = self.running_transport().await?;
        if !self.inner.selector.matches(doc) {
            return Ok(false);
        }
        transport.did_close(DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier {
                uri: doc.uri.clone(),
            },
        })?;
        Ok(true)
    }

    /// Forwards one host filesystem event as a
    /// `workspace/didChangeWatchedFiles` notification.
    ///
    /// Returns `Ok(true)` when forwarded. Events outside the running state
    /// and events matching no watch pattern are dropped (`Ok(false)`), never
    /// queued — the bridge holds no durable queue.
    ///
    /// ## Errors
    /// Only transport send failures.
    pub async fn file_event(&self, uri: &Url, kind: FileEventKind) -> SessionResult<bool> {
        let transport = {
            let stage = self.inner.stage.lock().await;
            match &*stage {
                Stage::Running(live) => live.transport.clone(),
                other => {
                    debug!(
                        session = %self.inner.config.name,
                        %uri,
                        state = %other.state(),
                        "dropping file event outside running state"
                    );
                    return Ok(false);
                }
            }
        };
        let Some(params) = self.inner.watches.to_notification(uri, kind) else {
            return Ok(false);
        };
        transport.did_change_watched_files(params)?;
        Ok(true)
    }

    fn set_stage(&self, stage: &mut Stage, next: Stage) {
        let from = stage.state();
        let to = next.state();
        debug_assert!(from.can_advance_to(to), "invalid transition {from} -> {to}");
        *stage = next;
        let _ = self.inner.state_tx.send(to);
    }

    async fn running_transport(&self) -> SessionResult<Arc<Transport>> {
        let stage = self.inner.stage.lock().await;
        match &*stage {
            Stage::Running(live) => Ok(live.transport.clone()),
            other => Err(SessionError::NotRunning(other.state())),
        }
    }

    /// Teardown for a handshake that failed outright (error or timeout).
    async fn abort_startup(&self) {
        let live = {
            let mut stage = self.inner.stage.lock().await;
            match std::mem::replace(&mut *stage, Stage::Stopped) {
                Stage::Starting(live) => {
                    let _ = self.inner.state_tx.send(SessionState::Stopped);
                    Some(live)
                }
                other => {
                    // stop() raced us and owns the teardown.
                    *stage = other;
                    None
                }
            }
        };
        if let Some(mut live) = live {
            live.transport.cancel_all();
            live.process.terminate().await;
            live.transport.close();
            warn!(session = %self.inner.config.name, "startup failed; session stopped");
        }
    }

    async fn request_shutdown(&self, transport: &Transport) -> SessionResult<()> {
        let bound = self.inner.config.shutdown_timeout;
        match tokio::time::timeout(bound, transport.shutdown()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SessionError::Transport(err)),
            Err(_elapsed) => Err(SessionError::ShutdownTimeout(bound)),
        }
    }

    async fn wait_for_stopped(&self) {
        let mut rx = self.inner.state_tx.subscribe();
        let _ = rx
            .wait_for(|state| *state == SessionState::Stopped)
            .await;
    }

    /// One automatic `stop()` when the transport read loop reports a protocol
    /// failure. Failures during an intentional teardown are ignored.
    fn spawn_failure_monitor(&self, rx: oneshot::Receiver<TransportError>) {
        let session = self.clone();
        tokio::spawn(async move {
            // A dropped sender means the main loop exited cleanly.
            let Ok(reason) = rx.await else { return };
            match session.state() {
                SessionState::Stopping | SessionState::Stopped => {}
                _ => {
                    error!(
                        session = %session.name(),
                        %reason,
                        "transport failure; stopping session"
                    );
                    if let Err(err) = session.stop().await {
                        warn!(error = %err, "automatic stop after transport failure failed");
                    }
                }
            }
        });
    }
}

/// Handshake parameters: workspace folder plus the capabilities this client
/// actually exercises (text sync, watched files, diagnostics).
fn initialize_params(config: &SessionConfig) -> InitializeParams {
    let workspace_folders = Url::from_file_path(&config.workspace_root)
        .ok()
        .map(|uri| {
            vec![WorkspaceFolder {
                name: config
                    .workspace_root
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("workspace")
                    .to_string(),
                uri,
            }]
        });

    InitializeParams {
        process_id: Some(std::process::id()),
        workspace_folders,
        capabilities: ClientCapabilities {
            workspace: Some(WorkspaceClientCapabilities {
                did_change_watched_files: Some(DidChangeWatchedFilesClientCapabilities {
                    dynamic_registration: Some(false),
                    relative_pattern_support: None,
                }),
                ..Default::default()
            }),
            text_document: Some(TextDocumentClientCapabilities {
                synchronization: Some(TextDocumentSyncClientCapabilities {
                    dynamic_registration: Some(false),
                    will_save: Some(false),
                    will_save_wait_until: Some(false),
                    did_save: Some(false),
                }),
                publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                    related_information: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            window: Some(WindowClientCapabilities {
                work_done_progress: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        },
        trace: Some(TraceValue::Off),
        client_info: Some(ClientInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        ..Default::default()
    }
}

//! Session transport: the JSON-RPC channel to the language server.
//!
//! Wraps the server's duplex byte stream in the `async-lsp` client main loop,
//! which owns Content-Length framing and request/response correlation by
//! message id. This module layers the session semantics on top:
//!
//! - typed request and notification send over a cloneable [`ServerSocket`],
//! - relay of server-originated notifications to the host over a channel,
//! - a session-wide cancellation signal so every request future outstanding
//!   at teardown resolves with [`TransportError::Cancelled`] instead of
//!   hanging,
//! - a one-shot failure report to the lifecycle controller when the main
//!   loop dies (malformed frame, unexpected EOF). No partial recovery is
//!   attempted; the session is considered unhealthy.

use std::ops::ControlFlow;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::panic::CatchUnwindLayer;
use async_lsp::router::Router;
use async_lsp::tracing::TracingLayer;
use async_lsp::{LanguageServer, ServerSocket};
use futures::io::{AsyncRead, AsyncWrite};
use lsp_types::{
    DidChangeTextDocumentParams, DidChangeWatchedFilesParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, InitializeParams, InitializeResult, InitializedParams,
    LogMessageParams, PublishDiagnosticsParams, ShowMessageParams, notification,
};
use tokio::sync::{mpsc, oneshot, watch};
use tower::ServiceBuilder;
use tracing::debug;

use crate::error::TransportError;

/// Server-originated traffic relayed unmodified to the host.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// `textDocument/publishDiagnostics`.
    Diagnostics(PublishDiagnosticsParams),
    /// `window/showMessage` — surfaced to the user by the host.
    ShowMessage(ShowMessageParams),
    /// `window/logMessage`.
    LogMessage(LogMessageParams),
}

/// State for the notification router of the client main loop.
struct ClientState {
    events: mpsc::UnboundedSender<ServerEvent>,
}

/// The session's connection to a spawned language server.
pub struct Transport {
    socket: ServerSocket,
    cancel: watch::Sender<bool>,
    mainloop: tokio::task::JoinHandle<()>,
    failure: Option<oneshot::Receiver<TransportError>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("cancelled", &*self.cancel.borrow())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Attaches to a duplex byte stream and spawns the read loop.
    ///
    /// `events` receives server-originated notifications for the host.
    /// Message ordering on the wire is preserved; correlation of responses to
    /// requests is exact even under interleaved notifications (both
    /// guaranteed by the `async-lsp` main loop).
    pub fn spawn<I, O>(input: I, output: O, events: mpsc::UnboundedSender<ServerEvent>) -> Self
    where
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Send + Unpin + 'static,
    {
        let (mainloop, socket) = async_lsp::MainLoop::new_client(|_server| {
            let mut router = Router::new(ClientState {
                events: events.clone(),
            });
            router
                .notification::<notification::PublishDiagnostics>(|state, params| {
                    let _ = state.events.send(ServerEvent::Diagnostics(params));
                    ControlFlow::Continue(())
                })
                .notification::<notification::ShowMessage>(|state, params| {
                    let _ = state.events.send(ServerEvent::ShowMessage(params));
                    ControlFlow::Continue(())
                })
                .notification::<notification::LogMessage>(|state, params| {
                    let _ = state.events.send(ServerEvent::LogMessage(params));
                    ControlFlow::Continue(())
                })
                .notification::<notification::Progress>(|_state, _params| {
                    ControlFlow::Continue(())
                })
                .unhandled_notification(|_state, notif| {
                    debug!(method = %notif.method, "unhandled server notification");
                    ControlFlow::Continue(())
                });

            ServiceBuilder::new()
                .layer(TracingLayer::default())
                .layer(CatchUnwindLayer::default())
                .layer(ConcurrencyLayer::default())
                .service(router)
        });

        let (failure_tx, failure_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            if let Err(err) = mainloop.run_buffered(input, output).await {
                let _ = failure_tx.send(TransportError::Protocol(err.to_string()));
            }
        });

        let (cancel, _) = watch::channel(false);
        Self {
            socket,
            cancel,
            mainloop: task,
            failure: Some(failure_rx),
        }
    }

    /// Takes the one-shot main-loop failure report, which resolves with
    /// [`TransportError::Protocol`] when the read loop dies. The lifecycle
    /// controller awaits it to trigger an automatic stop. Yields at most
    /// once; subsequent calls return `None`.
    pub fn take_failure(&mut self) -> Option<oneshot::Receiver<TransportError>> {
        self.failure.take()
    }

    /// Resolves every outstanding request future with
    /// [`TransportError::Cancelled`] and refuses new traffic.
    pub fn cancel_all(&self) {
        let _ = self.cancel.send(true);
    }

    /// Tears the read loop down. Called once the process is gone.
    pub(crate) fn close(&self) {
        self.mainloop.abort();
    }

    /// Runs a request future against the cancellation signal.
    async fn guarded<T>(
        &self,
        fut: impl Future<Output = Result<T, async_lsp::Error>>,
    ) -> Result<T, TransportError> {
        let mut cancelled = self.cancel.subscribe();
        if *cancelled.borrow() {
            return Err(TransportError::Cancelled);
        }
        tokio::select! {
            res = fut => res.map_err(|err| TransportError::Request(err.to_string())),
            _ = cancelled.wait_for(|&flag| flag) => Err(TransportError::Cancelled),
        }
    }

    /// Rejects notification sends after teardown began.
    fn send_guard(&self) -> Result<(), TransportError> {
        if *self.cancel.borrow() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Sends the `initialize` request.
    pub async fn initialize(
        &self,
        params: InitializeParams,
    ) -> Result<InitializeResult, TransportError> {
        let mut socket = self.socket.clone();
        self.guarded(socket.initialize(params)).await
    }

    /// Sends the `initialized` notification, completing the handshake.
    pub fn initialized(&self) -> Result<(), TransportError> {
        self.send_guard()?;
        let mut socket = self.socket.clone();
        socket
            .initialized(InitializedParams {})
            .map_err(|err| TransportError::Request(format!("initialized failed: {err}")))
    }

    /// Sends the `shutdown` request.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let mut socket = self.socket.clone();
        self.guarded(socket.shutdown(())).await
    }

    /// Sends the `exit` notification.
    pub fn exit(&self) -> Result<(), TransportError> {
        let mut socket = self.socket.clone();
        socket
            .exit(())
            .map_err(|err| TransportError::Request(format!("exit failed: {err}")))
    }

    /// Forwards a `textDocument/didOpen` notification.
    pub fn did_open(&self, params: DidOpenTextDocumentParams) -> Result<(), TransportError> {
        self.send_guard()?;
        let mut socket = self.socket.clone();
        socket
            .did_open(params)
            .map_err(|err| TransportError::Request(format!("didOpen failed: {err}")))
    }

    /// Forwards a `textDocument/didChange` notification.
    pub fn did_change(&self, params: DidChangeTextDocumentParams) -> Result<(), TransportError> {
        self.send_guard()?;
        let mut socket = self.socket.clone();
        socket
            .did_change(params)
            .map_err(|err| TransportError::Request(format!("didChange failed: {err}")))
    }

    /// Forwards a `textDocument/didClose` notification.
    pub fn did_close(&self, params: DidCloseTextDocumentParams) -> Result<(), TransportError> {
        self.send_guard()?;
        let mut socket = self.socket.clone();
        socket
            .did_close(params)
            .map_err(|err| TransportError::Request(format!("didClose failed: {err}")))
    }

    /// Forwards a `workspace/didChangeWatchedFiles` notification.
    pub fn did_change_watched_files(
        &self,
        params: DidChangeWatchedFilesParams,
    ) -> Result<(), TransportError> {
        self.send_guard()?;
        let mut socket = self.socket.clone();
        socket
            .did_change_watched_files(params)
            .map_err(|err| TransportError::Request(format!("didChangeWatchedFiles failed: {err}")))
    }
}

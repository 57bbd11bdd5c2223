//! Shared test harness: Content-Length framing helpers and an in-process
//! fake language server end wired to a [`Transport`] over duplex pipes.
//!
//! Driving the server side by hand lets tests control response ordering and
//! inject malformed traffic, which a real child process cannot do reliably.

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

use bazel_lsp_client::ServerEvent;
use bazel_lsp_client::session::Transport;

/// The server side of the wire: what the client sent, where replies go.
pub struct ServerEnd {
    pub incoming: DuplexStream,
    pub outgoing: DuplexStream,
}

/// Connects a transport to an in-process server end.
pub fn connect() -> (Transport, ServerEnd, mpsc::UnboundedReceiver<ServerEvent>) {
    let (client_out, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, client_in) = tokio::io::duplex(64 * 1024);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = Transport::spawn(client_in.compat(), client_out.compat_write(), events_tx);
    (
        transport,
        ServerEnd {
            incoming: server_in,
            outgoing: server_out,
        },
        events_rx,
    )
}

/// Reads one Content-Length framed message from the client.
pub async fn read_frame(stream: &mut DuplexStream) -> Option<Value> {
    let mut header = Vec::new();
    while !header.ends_with(b"\r\n\r\n") {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await.ok()?;
        header.push(byte[0]);
    }
    let header = String::from_utf8(header).ok()?;
    let length = header
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())?;
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.ok()?;
    serde_json::from_slice(&body).ok()
}

/// Writes one Content-Length framed message to the client.
pub async fn write_frame(stream: &mut DuplexStream, message: &Value) {
    let body = serde_json::to_vec(message).expect("serializable message");
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    stream
        .write_all(header.as_bytes())
        .await
        .expect("write header");
    stream.write_all(&body).await.expect("write body");
    stream.flush().await.expect("flush");
}

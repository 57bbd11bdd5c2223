//! Transport tests against an in-process fake language server.

mod common;

use std::time::Duration;

use lsp_types::{DidOpenTextDocumentParams, InitializeParams, TextDocumentItem, Url};
use serde_json::json;
use tokio::io::AsyncWriteExt;

use bazel_lsp_client::{ServerEvent, TransportError};

use common::{connect, read_frame, write_frame};

#[tokio::test]
async fn test_initialize_gets_the_matching_response() {
    let (transport, mut server, _events) = connect();

    let client = transport.initialize(InitializeParams::default());
    let server_side = async {
        let request = read_frame(&mut server.incoming)
            .await
            .expect("initialize frame");
        assert_eq!(request["method"], "initialize");
        write_frame(
            &mut server.outgoing,
            &json!({
                "jsonrpc": "2.0",
                "id": request["id"].clone(),
                "result": { "capabilities": {} },
            }),
        )
        .await;
    };
    let (result, ()) = tokio::join!(client, server_side);

    let result = result.expect("initialize result");
    assert!(result.server_info.is_none());
}

#[tokio::test]
async fn test_notifications_interleave_with_a_pending_request() {
    let (transport, mut server, mut events) = connect();

    let client = transport.initialize(InitializeParams::default());
    let server_side = async {
        let request = read_frame(&mut server.incoming)
            .await
            .expect("initialize frame");
        // Diagnostics arrive while the request is still pending.
        write_frame(
            &mut server.outgoing,
            &json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": { "uri": "file:///ws/BUILD", "diagnostics": [] },
            }),
        )
        .await;
        write_frame(
            &mut server.outgoing,
            &json!({
                "jsonrpc": "2.0",
                "id": request["id"].clone(),
                "result": { "capabilities": {} },
            }),
        )
        .await;
    };
    let (result, ()) = tokio::join!(client, server_side);

    result.expect("initialize result");
    match events.recv().await.expect("diagnostics event") {
        ServerEvent::Diagnostics(params) => {
            assert_eq!(params.uri.as_str(), "file:///ws/BUILD");
            assert!(params.diagnostics.is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_cancel_all_resolves_pending_requests() {
    let (transport, mut server, _events) = connect();

    let client = transport.initialize(InitializeParams::default());
    let server_side = async {
        // Swallow the request and never answer it.
        let _ = read_frame(&mut server.incoming).await;
        transport.cancel_all();
    };
    let (result, ()) = tokio::join!(client, server_side);

    assert!(matches!(result, Err(TransportError::Cancelled)));
}

#[tokio::test]
async fn test_sends_are_rejected_after_cancel() {
    let (transport, _server, _events) = connect();
    transport.cancel_all();

    let params = DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri: Url::parse("file:///ws/BUILD").unwrap(),
            language_id: "starlark".to_string(),
            version: 1,
            text: String::new(),
        },
    };
    assert!(matches!(
        transport.did_open(params),
        Err(TransportError::Closed)
    ));
    assert!(matches!(
        transport.initialize(InitializeParams::default()).await,
        Err(TransportError::Cancelled)
    ));
}

#[tokio::test]
async fn test_malformed_traffic_reports_a_failure() {
    let (mut transport, mut server, _events) = connect();
    let failure = transport.take_failure().expect("failure receiver");
    assert!(transport.take_failure().is_none());

    server
        .outgoing
        .write_all(b"bogus header\r\n\r\n")
        .await
        .expect("write garbage");
    server.outgoing.flush().await.expect("flush");

    let reason = tokio::time::timeout(Duration::from_secs(5), failure)
        .await
        .expect("failure reported in time")
        .expect("failure sender kept alive");
    assert!(matches!(reason, TransportError::Protocol(_)));
}

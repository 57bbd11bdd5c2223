//! End-to-end session tests against real child processes.
//!
//! Failure paths use stock unix tools (`sleep` stands in for a server that
//! never answers); the happy path drives a small Python stdio server from
//! `tests/fixtures`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lsp_types::Url;

use bazel_lsp_client::{
    FileEventKind, LaunchError, Session, SessionConfig, SessionError, SessionState, TextDocument,
};

fn fixture_server() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/mock_server.py")
}

fn config_for(workspace: &Path, command: &str, args: &[&str]) -> SessionConfig {
    SessionConfig {
        command: PathBuf::from(command),
        args: args.iter().map(ToString::to_string).collect(),
        workspace_root: workspace.to_path_buf(),
        init_timeout: Duration::from_secs(10),
        shutdown_timeout: Duration::from_millis(500),
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn test_missing_executable_leaves_the_session_stopped() {
    let workspace = tempfile::tempdir().unwrap();
    let session = Session::new(config_for(
        workspace.path(),
        "/nonexistent/bazel-lsp-server",
        &[],
    ))
    .unwrap();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, SessionError::Launch(LaunchError::NotFound(_))));
    assert_eq!(session.state(), SessionState::Stopped);

    // The terminal state rejects a restart but tolerates a stop.
    session.stop().await.expect("stop on stopped session");
    let err = session.start().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::AlreadyStarted(SessionState::Stopped)
    ));
}

#[tokio::test]
async fn test_unresponsive_server_times_out() {
    let workspace = tempfile::tempdir().unwrap();
    let mut config = config_for(workspace.path(), "sleep", &["30"]);
    config.init_timeout = Duration::from_millis(300);
    let session = Session::new(config).unwrap();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, SessionError::StartupTimeout(_)));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_stop_during_startup_cancels_the_handshake() {
    let workspace = tempfile::tempdir().unwrap();
    let session = Session::new(config_for(workspace.path(), "sleep", &["30"])).unwrap();

    let starter = {
        let session = session.clone();
        tokio::spawn(async move { session.start().await })
    };
    let mut states = session.state_changes();
    states
        .wait_for(|state| *state == SessionState::Starting)
        .await
        .expect("session reaches starting");

    session.stop().await.expect("stop during startup");
    assert_eq!(session.state(), SessionState::Stopped);

    let result = starter.await.expect("start task");
    assert!(result.is_err(), "cancelled startup must not report success");

    session.stop().await.expect("second stop");
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_events_before_start_are_dropped_or_rejected() {
    let workspace = tempfile::tempdir().unwrap();
    let session = Session::new(config_for(workspace.path(), "sleep", &["30"])).unwrap();
    let root = workspace.path().canonicalize().unwrap();

    let uri = Url::from_file_path(root.join("WORKSPACE")).unwrap();
    let forwarded = session
        .file_event(&uri, FileEventKind::Changed)
        .await
        .expect("file event");
    assert!(!forwarded, "file events outside running are dropped");

    let doc = TextDocument::new(uri, "starlark", 1);
    let err = session.document_opened(&doc, "").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::NotRunning(SessionState::Uninitialized)
    ));
}

#[tokio::test]
async fn test_full_session_lifecycle() {
    let workspace = tempfile::tempdir().unwrap();
    let root = workspace.path().canonicalize().unwrap();
    let fixture = fixture_server();
    let mut config = config_for(workspace.path(), "python3", &[]);
    config.args = vec![fixture.to_string_lossy().into_owned()];
    let session = Session::new(config).unwrap();

    session.start().await.expect("handshake");
    assert_eq!(session.state(), SessionState::Running);

    // In-scope document: a BUILD file under the workspace.
    let build = TextDocument::new(
        Url::from_file_path(root.join("BUILD")).unwrap(),
        "plaintext",
        1,
    );
    assert!(
        session
            .document_opened(&build, "cc_library()")
            .await
            .expect("didOpen")
    );
    let build = TextDocument::new(build.uri.clone(), "plaintext", 2);
    assert!(
        session
            .document_changed(&build, "cc_library(name = \"x\")")
            .await
            .expect("didChange")
    );
    assert!(session.document_closed(&build).await.expect("didClose"));

    // Out-of-scope document: markdown matches no selector rule.
    let readme = TextDocument::new(
        Url::from_file_path(root.join("README.md")).unwrap(),
        "markdown",
        1,
    );
    assert!(
        !session
            .document_opened(&readme, "# readme")
            .await
            .expect("didOpen gate")
    );

    // Watched and unwatched file events.
    let watched = Url::from_file_path(root.join("WORKSPACE")).unwrap();
    assert!(
        session
            .file_event(&watched, FileEventKind::Created)
            .await
            .expect("watched event")
    );
    let unwatched = Url::from_file_path(root.join("notes.txt")).unwrap();
    assert!(
        !session
            .file_event(&unwatched, FileEventKind::Changed)
            .await
            .expect("unwatched event")
    );

    session.stop().await.expect("stop");
    assert_eq!(session.state(), SessionState::Stopped);
    session.stop().await.expect("stop is idempotent");
}

#[tokio::test]
async fn test_corrupt_traffic_stops_a_running_session() {
    let workspace = tempfile::tempdir().unwrap();
    let fixture = fixture_server();
    let mut config = config_for(workspace.path(), "python3", &[]);
    config.args = vec![
        fixture.to_string_lossy().into_owned(),
        "--corrupt-after-init".to_string(),
    ];
    let session = Session::new(config).unwrap();

    session.start().await.expect("handshake");

    // The server corrupts the wire right after the handshake; the session
    // must tear itself down without any host intervention.
    let mut states = session.state_changes();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| *state == SessionState::Stopped),
    )
    .await
    .expect("session stops after corrupt traffic")
    .expect("state channel stays open");
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_concurrent_stops_all_complete() {
    let workspace = tempfile::tempdir().unwrap();
    let fixture = fixture_server();
    let mut config = config_for(workspace.path(), "python3", &[]);
    config.args = vec![fixture.to_string_lossy().into_owned()];
    let session = Session::new(config).unwrap();

    session.start().await.expect("handshake");

    let (first, second) = tokio::join!(session.stop(), session.stop());
    first.expect("first stop");
    second.expect("concurrent stop");
    assert_eq!(session.state(), SessionState::Stopped);
}

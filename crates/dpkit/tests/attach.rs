//! End-to-end tests for the facade entry points.

use std::path::PathBuf;
use std::time::Duration;

use dpkit::prelude::*;
use dpkit::supervisor::SupervisorError;
use dpkit::transport::FakeServer;
use tokio::io::AsyncWriteExt;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("dpkit-facade-{name}-{}", std::process::id()))
}

fn session_config(server: &FakeServer) -> SessionConfig {
    SessionConfig {
        addr: server.addr().to_string(),
        rcon_secret: "hello".into(),
        ..SessionConfig::default()
    }
}

fn fast_tail() -> TailConfig {
    TailConfig {
        poll_interval: Duration::from_millis(5),
        from_start: false,
    }
}

#[tokio::test]
async fn test_attach_tails_log_and_sends_commands() {
    let server = FakeServer::start("hello").await.unwrap();
    let log = temp_path("attach.log");
    tokio::fs::write(&log, b"old: line before attach\n").await.unwrap();

    let session = dpkit::attach(session_config(&server), &log, fast_tail()).await.unwrap();
    let waiter = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .wait_for_next(EventKind::MapChange, Some(Duration::from_secs(5)))
                .await
        })
    };
    while session.dispatcher().pending_waiters() < 1 {
        tokio::task::yield_now().await;
    }

    let mut file = tokio::fs::OpenOptions::new().append(true).open(&log).await.unwrap();
    file.write_all(b"== Map Loaded: midnight ==\n").await.unwrap();
    file.flush().await.unwrap();

    let event = waiter.await.unwrap().unwrap();
    assert_eq!(event.text("map"), Some("midnight"));

    session.say("gl hf").await.unwrap();
    assert_eq!(server.received(), vec!["say \"gl hf\""]);

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_attach_missing_log_is_source_error() {
    let server = FakeServer::start("hello").await.unwrap();
    let err = dpkit::attach(session_config(&server), temp_path("missing.log"), fast_tail())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DpkitError::Source(_)));
}

#[tokio::test]
async fn test_managed_launch_missing_binary_is_supervisor_error() {
    let dir = temp_path("managed");
    std::fs::create_dir_all(&dir).unwrap();
    let launch = LaunchConfig {
        server_id: "managed".into(),
        binary: dir.join("no-such-server"),
        working_dir: dir,
        rcon_secret: generate_secret(),
        ..LaunchConfig::default()
    };

    let err = ManagedServer::launch(launch, SessionConfig::default()).await.err().unwrap();
    assert!(matches!(err, DpkitError::Supervisor(SupervisorError::Spawn { .. })));
}

//! Session lifecycle through the connector

use boundcall::config::SessionConfig;
use boundcall::connector::RemoteConnector;
use boundcall::session::RemoteSession;
use boundcall::transport::CallRequest;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::fixtures::BATCH_OK;
use crate::common::{stub_config, stub_factory, StubTransport};

#[tokio::test]
async fn test_connects_lazily_on_first_call() {
    let (factory, built) = stub_factory(StubTransport::respond(200, BATCH_OK));
    let mut connector = RemoteConnector::with_factory(&stub_config(), factory);

    assert!(!connector.is_connected());
    assert_eq!(built.load(Ordering::SeqCst), 0);

    connector
        .send_document(CallRequest::post("documents/batch"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(connector.is_connected());
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_session_reused_across_calls() {
    let transport = StubTransport::respond(200, BATCH_OK);
    let (factory, built) = stub_factory(transport.clone());
    let mut connector = RemoteConnector::with_factory(&stub_config(), factory);
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        connector
            .send_document(CallRequest::post("documents/batch"), &cancel)
            .await
            .unwrap();
    }

    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(transport.executed(), 3);
    assert_eq!(transport.releases(), vec![false, false, false]);
}

#[tokio::test]
async fn test_disconnect_then_reconnect() {
    let (factory, built) = stub_factory(StubTransport::respond(200, BATCH_OK));
    let mut connector = RemoteConnector::with_factory(&stub_config(), factory);
    let cancel = CancellationToken::new();

    connector
        .send_document(CallRequest::post("documents/batch"), &cancel)
        .await
        .unwrap();
    connector.disconnect();
    assert!(!connector.is_connected());

    connector
        .send_document(CallRequest::post("documents/batch"), &cancel)
        .await
        .unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_poll_keeps_recent_session() {
    let (factory, _) = stub_factory(StubTransport::respond(200, BATCH_OK));
    let mut connector = RemoteConnector::with_factory(&stub_config(), factory);

    connector
        .send_document(CallRequest::post("documents/batch"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!connector.poll());
    assert!(connector.is_connected());
}

#[test]
fn test_idle_release_uses_configured_interval() {
    let config = SessionConfig {
        idle_release_ms: 1_000,
        ..stub_config().session
    };
    let (factory, built) = stub_factory(StubTransport::respond(200, BATCH_OK));
    let mut session = RemoteSession::new(config, factory);

    let start = Instant::now();
    session.acquire_at(start).unwrap();
    assert!(!session.poll_at(start + Duration::from_millis(999)));
    assert!(session.poll_at(start + Duration::from_millis(1_000)));
    assert!(!session.is_connected());

    session.acquire_at(start + Duration::from_millis(1_500)).unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_host_fails_without_connecting() {
    let mut config = stub_config();
    config.session.host = None;
    let transport = StubTransport::respond(200, BATCH_OK);
    let (factory, built) = stub_factory(transport.clone());
    let mut connector = RemoteConnector::with_factory(&config, factory);

    let err = connector
        .send_document(CallRequest::post("documents/batch"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Config error: Parameter host required but not set");
    assert_eq!(built.load(Ordering::SeqCst), 0);
    assert_eq!(transport.executed(), 0);
}

#[tokio::test]
async fn test_invalid_protocol_is_config_error() {
    let mut config = stub_config();
    config.session.protocol = Some("ftp".into());
    let (factory, _) = stub_factory(StubTransport::respond(200, BATCH_OK));
    let mut connector = RemoteConnector::with_factory(&config, factory);

    let err = connector
        .send_document(CallRequest::post("documents/batch"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, boundcall::Error::Config(_)));
}

#[tokio::test]
async fn test_same_call_twice_same_status() {
    let transport = StubTransport::respond(422, r#"{"errors":["bad field"]}"#);
    let (factory, _) = stub_factory(transport);
    let mut connector = RemoteConnector::with_factory(&stub_config(), factory);
    let cancel = CancellationToken::new();

    let first = connector
        .send_document(CallRequest::post("documents/batch"), &cancel)
        .await
        .unwrap();
    let first_activity = connector.last_activity().clone();
    let second = connector
        .send_document(CallRequest::post("documents/batch"), &cancel)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(&first_activity, connector.last_activity());
}

//! Connector outcome reporting
//!
//! Tests the mapping from classified outcomes to document status, service
//! interruptions and hard errors:
//! 1. Accepted and rejected documents
//! 2. 404 policy
//! 3. Retry windows on 5xx and I/O failures
//! 4. Connection check strings
//! 5. Activity records

use boundcall::call::{now_ms, CallError, PermanentReason};
use boundcall::connector::{ActivityResult, DocumentStatus, RemoteConnector};
use boundcall::error::{ClassifiedError, Error, ErrorCategory};
use boundcall::transport::{CallRequest, TransportError};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{BATCH_OK, BATCH_REJECTED, NOT_JSON, SERVER_INFO, SERVICE_UNAVAILABLE};
use crate::common::{config_for, stub_config, stub_factory, StubTransport};

fn stub_connector(transport: std::sync::Arc<StubTransport>) -> RemoteConnector {
    let (factory, _) = stub_factory(transport);
    RemoteConnector::with_factory(&stub_config(), factory)
}

// ============================================================================
// Document Status Tests
// ============================================================================

#[tokio::test]
async fn test_document_accepted() {
    let transport = StubTransport::respond(200, BATCH_OK);
    let mut connector = stub_connector(transport.clone());

    let status = connector
        .send_document(CallRequest::post("documents/batch").body("[]"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(status, DocumentStatus::Accepted);
    assert_eq!(connector.last_activity().result, ActivityResult::Ok);
    assert_eq!(
        transport.urls(),
        vec!["http://search.example.com:80/2013-01-01/documents/batch".to_string()]
    );
}

#[tokio::test]
async fn test_document_rejected_is_not_an_error() {
    let transport = StubTransport::respond(400, BATCH_REJECTED);
    let mut connector = stub_connector(transport);

    let status = connector
        .send_document(CallRequest::post("documents/batch"), &CancellationToken::new())
        .await
        .unwrap();

    match status {
        DocumentStatus::Rejected {
            status,
            reason,
            description,
        } => {
            assert_eq!(status, 400);
            assert_eq!(reason, PermanentReason::Rejected);
            assert!(description.starts_with("HTTP code = 400, Response = "));
            assert!(description.contains("must be a string"));
        }
        DocumentStatus::Accepted => panic!("Expected rejection"),
    }
    assert_eq!(connector.last_activity().result, ActivityResult::Error);
}

#[tokio::test]
async fn test_not_found_rejects_by_default() {
    let mut connector = stub_connector(StubTransport::respond(404, "gone"));

    let status = connector
        .send_document(CallRequest::delete("documents/42"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(
        status,
        DocumentStatus::Rejected {
            status: 404,
            reason: PermanentReason::NotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn test_not_found_can_be_fatal() {
    let mut config = stub_config();
    config.retry.not_found_is_fatal = true;
    let (factory, _) = stub_factory(StubTransport::respond(404, "gone"));
    let mut connector = RemoteConnector::with_factory(&config, factory);

    let err = connector
        .send_document(CallRequest::delete("documents/42"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::Call(CallError::UnexpectedResponse(msg)) => {
            assert!(msg.starts_with("Server/page not found"), "{msg}");
        }
        other => panic!("Expected hard error, got {other:?}"),
    }
}

// ============================================================================
// Service Interruption Tests
// ============================================================================

#[tokio::test]
async fn test_server_error_raises_interruption() {
    let mut connector = stub_connector(StubTransport::respond(503, SERVICE_UNAVAILABLE));

    let before = now_ms();
    let err = connector
        .send_document(CallRequest::post("documents/batch"), &CancellationToken::new())
        .await
        .unwrap_err();
    let after = now_ms();

    assert!(err.is_recoverable());
    let Error::Interruption(interruption) = err else {
        panic!("Expected service interruption");
    };
    assert_eq!(interruption.message, "Server exception: Service Unavailable");
    assert!(interruption.retry_not_before_ms >= before + 5 * 60_000);
    assert!(interruption.retry_not_before_ms <= after + 5 * 60_000);
    assert!(interruption.retry_not_after_ms >= before + 20 * 60_000);
    assert!(!interruption.cumulative);
    assert_eq!(interruption.fail_retry_count, None);
}

#[tokio::test]
async fn test_io_error_raises_cumulative_interruption() {
    let mut connector = stub_connector(StubTransport::fail(TransportError::Io(
        "connection reset by peer".into(),
    )));

    let err = connector
        .send_document(CallRequest::post("documents/batch"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Network);
    let Error::Interruption(interruption) = err else {
        panic!("Expected service interruption");
    };
    assert!(interruption.cumulative);
    assert_eq!(
        interruption.retry_not_after_ms - interruption.retry_not_before_ms,
        59 * 60_000
    );
    assert!(interruption.message.contains("connection reset by peer"));
}

#[tokio::test]
async fn test_unexpected_status_is_hard_error() {
    let mut connector = stub_connector(StubTransport::respond(600, "strange"));

    let err = connector
        .send_document(CallRequest::post("documents/batch"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(!err.is_recoverable());
    assert!(matches!(
        err,
        Error::Call(CallError::UnexpectedStatus { status: 600, .. })
    ));
    assert_eq!(connector.last_activity().result, ActivityResult::Unknown);
    assert_eq!(
        connector.last_activity().description,
        "HTTP code = 600, Response = strange"
    );
}

#[tokio::test]
async fn test_protocol_error_is_hard_error() {
    let mut connector = stub_connector(StubTransport::fail(TransportError::Protocol(
        "bad header".into(),
    )));

    let err = connector
        .send_document(CallRequest::post("documents/batch"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Protocol);
    assert!(matches!(err, Error::Call(CallError::Protocol(_))));
}

// ============================================================================
// Fetch Tests
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    version: String,
    build_number: String,
}

#[tokio::test]
async fn test_fetch_json() {
    let mut connector = stub_connector(StubTransport::respond(200, SERVER_INFO));

    let info: ServerInfo = connector
        .fetch_json(CallRequest::get("rest/prototype/1/serverInfo"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(info.version, "7.19.1");
    assert_eq!(info.build_number, "8804");
}

#[tokio::test]
async fn test_fetch_json_malformed() {
    let mut connector = stub_connector(StubTransport::respond(200, NOT_JSON));

    let err = connector
        .fetch_json::<ServerInfo>(CallRequest::get("serverInfo"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::Call(CallError::UnexpectedResponse(msg)) => {
            assert!(msg.starts_with("malformed JSON response"), "{msg}");
        }
        other => panic!("Expected unexpected response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_rejects_client_errors() {
    let mut connector = stub_connector(StubTransport::respond(401, "unauthorized"));

    let err = connector
        .fetch(CallRequest::get("content"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Call(CallError::UnexpectedResponse(_))));
}

// ============================================================================
// Connection Check Tests
// ============================================================================

#[tokio::test]
async fn test_check_working() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/serverInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SERVER_INFO))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut connector = RemoteConnector::new(&config_for(&mock_server));
    let status = connector
        .check("rest/serverInfo", &CancellationToken::new())
        .await;

    assert_eq!(status, "Connection working");
    assert!(connector.is_connected());
}

#[tokio::test]
async fn test_check_temporarily_failed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&mock_server)
        .await;

    let mut connector = RemoteConnector::new(&config_for(&mock_server));
    let status = connector.check("/", &CancellationToken::new()).await;

    assert_eq!(
        status,
        "Connection temporarily failed: Server exception: bad gateway"
    );
}

#[tokio::test]
async fn test_check_failed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .mount(&mock_server)
        .await;

    let mut connector = RemoteConnector::new(&config_for(&mock_server));
    let status = connector.check("/", &CancellationToken::new()).await;

    assert!(status.starts_with("Connection failed: "), "{status}");
    assert!(status.contains("HTTP code = 403"), "{status}");
}

#[tokio::test]
async fn test_check_missing_configuration() {
    let config = boundcall::config::Config::default();
    let mut connector = RemoteConnector::new(&config);

    let status = connector.check("/", &CancellationToken::new()).await;

    assert_eq!(
        status,
        "Connection failed: Config error: Parameter protocol required but not set"
    );
    assert!(!connector.is_connected());
}

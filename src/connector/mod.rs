//! Connector-facing outcome reporting
//!
//! [`RemoteConnector`] is what a connector implementation holds: one session,
//! one retry policy, and the activity record of the last call. It turns
//! classified call outcomes into the three signals a crawler framework
//! understands:
//!
//! - a per-document accepted/rejected status ([`DocumentStatus`])
//! - a retryable [`ServiceInterruption`] carrying its retry window
//! - a hard error (`Error::Call`, `Error::Config`)

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::call::{BoundedCall, CallError, CallOutcome, PermanentReason, ResponseBody, RetryWindow};
use crate::config::{Config, Endpoint, RetryPolicy};
use crate::error::{Error, Result};
use crate::session::{RemoteSession, TransportFactory};
use crate::transport::CallRequest;

/// Retryable failure: do not retry before `retry_not_before_ms`, give up after `retry_not_after_ms`
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct ServiceInterruption {
    pub message: String,

    /// Epoch milliseconds
    pub retry_not_before_ms: i64,

    /// Epoch milliseconds
    pub retry_not_after_ms: i64,

    /// Remaining retries the framework should allow; `None` leaves it to the framework
    pub fail_retry_count: Option<u32>,

    /// Whether this failure counts towards a cumulative failure budget
    pub cumulative: bool,
}

impl ServiceInterruption {
    pub fn from_window(message: impl Into<String>, window: RetryWindow) -> Self {
        Self {
            message: message.into(),
            retry_not_before_ms: window.not_before_ms,
            retry_not_after_ms: window.not_after_ms,
            fail_retry_count: None,
            cumulative: window.cumulative,
        }
    }

    pub fn window(&self) -> RetryWindow {
        RetryWindow {
            not_before_ms: self.retry_not_before_ms,
            not_after_ms: self.retry_not_after_ms,
            cumulative: self.cumulative,
        }
    }
}

/// Per-document result of an output call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Accepted,
    Rejected {
        status: u16,
        reason: PermanentReason,
        description: String,
    },
}

impl DocumentStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Coarse result of the last call, as shown in an activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityResult {
    Ok,
    Error,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallActivity {
    pub result: ActivityResult,
    pub description: String,
}

impl Default for CallActivity {
    fn default() -> Self {
        Self {
            result: ActivityResult::Unknown,
            description: String::new(),
        }
    }
}

/// Session plus outcome reporting for one connector instance
#[derive(Debug)]
pub struct RemoteConnector {
    session: RemoteSession,
    policy: RetryPolicy,
    activity: CallActivity,
}

impl RemoteConnector {
    /// Connector backed by the HTTP transport
    pub fn new(config: &Config) -> Self {
        Self::from_session(RemoteSession::http(config.session.clone()), config.retry.clone())
    }

    /// Connector backed by a custom transport factory
    pub fn with_factory(config: &Config, factory: TransportFactory) -> Self {
        Self::from_session(
            RemoteSession::new(config.session.clone(), factory),
            config.retry.clone(),
        )
    }

    pub fn from_session(session: RemoteSession, policy: RetryPolicy) -> Self {
        Self {
            session,
            policy,
            activity: CallActivity::default(),
        }
    }

    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Periodic housekeeping: release the session when idle
    pub fn poll(&mut self) -> bool {
        self.session.poll()
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    /// Activity record of the most recent call
    pub fn last_activity(&self) -> &CallActivity {
        &self.activity
    }

    /// Send a document-level request (add, replace, delete)
    ///
    /// Rejections are returned, not raised, so the caller can move on to the
    /// next document.
    ///
    /// # Errors
    ///
    /// - `Error::Interruption` for 5xx and I/O failures, with the retry window
    /// - `Error::Call` for interruptions, unexpected status codes, and 404
    ///   when `not_found_is_fatal` is set
    /// - `Error::Config` if the session cannot be created
    pub async fn send_document(
        &mut self,
        request: CallRequest,
        cancel: &CancellationToken,
    ) -> Result<DocumentStatus> {
        match self.call(request, cancel).await? {
            CallOutcome::Success { .. } => Ok(DocumentStatus::Accepted),
            CallOutcome::PermanentFailure {
                reason: PermanentReason::NotFound,
                description,
                ..
            } if self.policy.not_found_is_fatal => Err(Error::Call(
                CallError::UnexpectedResponse(format!("Server/page not found: {description}")),
            )),
            CallOutcome::PermanentFailure {
                status,
                reason,
                description,
            } => Ok(DocumentStatus::Rejected {
                status,
                reason,
                description,
            }),
            CallOutcome::RetryableFailure {
                window,
                description,
            } => Err(Error::Interruption(ServiceInterruption::from_window(
                description,
                window,
            ))),
        }
    }

    /// Read a resource; anything but success is an error
    ///
    /// # Errors
    ///
    /// - `Error::Interruption` for 5xx and I/O failures
    /// - `Error::Call(CallError::UnexpectedResponse)` for 4xx
    /// - `Error::Call` for interruptions and unexpected status codes
    pub async fn fetch(
        &mut self,
        request: CallRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseBody> {
        match self.call(request, cancel).await? {
            CallOutcome::Success { body, .. } => Ok(body),
            CallOutcome::PermanentFailure { description, .. } => {
                Err(Error::Call(CallError::UnexpectedResponse(description)))
            }
            CallOutcome::RetryableFailure {
                window,
                description,
            } => Err(Error::Interruption(ServiceInterruption::from_window(
                description,
                window,
            ))),
        }
    }

    /// [`Self::fetch`] and decode the body as JSON
    ///
    /// # Errors
    ///
    /// As [`Self::fetch`], plus `CallError::UnexpectedResponse` if the body is
    /// not the expected JSON
    pub async fn fetch_json<T: DeserializeOwned>(
        &mut self,
        request: CallRequest,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let body = self.fetch(request, cancel).await?;
        body.json().map_err(|e| {
            Error::Call(CallError::UnexpectedResponse(format!(
                "malformed JSON response: {e}"
            )))
        })
    }

    /// Probe the service and describe the result for a status page
    pub async fn check(&mut self, probe_path: &str, cancel: &CancellationToken) -> String {
        match self.fetch(CallRequest::get(probe_path), cancel).await {
            Ok(_) => String::from("Connection working"),
            Err(Error::Interruption(e)) => format!("Connection temporarily failed: {}", e.message),
            Err(e) => format!("Connection failed: {e}"),
        }
    }

    /// Acquire the session, resolve the URL, run the bounded call, record activity
    ///
    /// Relative request URLs are joined to the session's base URL.
    ///
    /// # Errors
    ///
    /// `Error::Config` if the session cannot be created, `Error::Call` for hard
    /// call failures
    pub async fn call(
        &mut self,
        mut request: CallRequest,
        cancel: &CancellationToken,
    ) -> Result<CallOutcome> {
        let connection = self.session.acquire()?;
        request.url = resolve_url(&connection.endpoint, &request.url);

        let call = BoundedCall::new(connection.transport, self.policy.clone())
            .with_deadline(self.session.config().call_deadline());

        let result = call.execute(request, cancel).await;
        self.activity = activity_for(&result);
        debug!(result = ?self.activity.result, "Recorded call activity");

        result.map_err(|e| {
            if e == CallError::Interrupted {
                warn!("Call interrupted; leaving retry decision to the caller");
            }
            Error::Call(e)
        })
    }
}

/// Relative paths are joined to the endpoint base URL; absolute URLs pass through
fn resolve_url(endpoint: &Endpoint, url: &str) -> String {
    match Url::parse(url) {
        Ok(absolute) if matches!(absolute.scheme(), "http" | "https") => absolute.into(),
        _ => endpoint.url(url),
    }
}

fn activity_for(result: &std::result::Result<CallOutcome, CallError>) -> CallActivity {
    let (result, description) = match result {
        Ok(CallOutcome::Success { .. }) => (ActivityResult::Ok, String::new()),
        Ok(CallOutcome::PermanentFailure { description, .. })
        | Ok(CallOutcome::RetryableFailure { description, .. }) => {
            (ActivityResult::Error, description.clone())
        }
        Err(CallError::UnexpectedStatus { status, body }) => (
            ActivityResult::Unknown,
            format!("HTTP code = {status}, Response = {body}"),
        ),
        Err(e) => (ActivityResult::Error, e.to_string()),
    };
    CallActivity {
        result,
        description,
    }
}

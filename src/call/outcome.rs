//! Outcome classification for bounded calls
//!
//! Every call site shares one decision table, [`StatusClass::of`], and one
//! classifier, [`OutcomeClassifier`], so status codes and transport failures
//! map to the same outcome no matter which connector issued the call.
//!
//! | Input                         | Outcome                                   |
//! |-------------------------------|-------------------------------------------|
//! | 200, 201                      | `Success`                                 |
//! | 404                           | `PermanentFailure(NotFound)`              |
//! | other 400-499                 | `PermanentFailure(Rejected)`              |
//! | 500-599                       | `RetryableFailure`, server-error window   |
//! | any other status              | `Err(CallError::UnexpectedStatus)`        |
//! | timeout / connect / I/O error | `RetryableFailure`, I/O window            |
//! | interrupted                   | `Err(CallError::Interrupted)`             |
//! | protocol error                | `Err(CallError::Protocol)`                |

use serde::Serialize;

use super::decode::ResponseBody;
use super::{CallError, WorkerResult};
use crate::config::{RetryPolicy, RetryWindowPolicy};
use crate::transport::TransportError;

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Absolute retry window attached to a retryable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryWindow {
    /// Do not retry before this instant (epoch ms)
    pub not_before_ms: i64,

    /// Give up after this instant (epoch ms)
    pub not_after_ms: i64,

    /// Whether the failure counts towards a cumulative failure budget
    pub cumulative: bool,
}

impl RetryWindow {
    /// Anchor a relative policy at `now_ms`
    pub fn from_policy(policy: &RetryWindowPolicy, now_ms: i64) -> Self {
        Self {
            not_before_ms: now_ms.saturating_add(policy.not_before_ms as i64),
            not_after_ms: now_ms.saturating_add(policy.not_after_ms as i64),
            cumulative: policy.cumulative,
        }
    }
}

/// Why a permanent failure is permanent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PermanentReason {
    /// 404
    NotFound,
    /// Any other 4xx
    Rejected,
}

/// Classified result of one bounded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// 200 or 201
    Success { status: u16, body: ResponseBody },

    /// 4xx: the request will not succeed as sent
    PermanentFailure {
        status: u16,
        reason: PermanentReason,
        description: String,
    },

    /// 5xx or I/O failure: retry inside the window
    RetryableFailure {
        window: RetryWindow,
        description: String,
    },
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Status code of the response, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. } | Self::PermanentFailure { status, .. } => Some(*status),
            Self::RetryableFailure { .. } => None,
        }
    }

    /// Short label for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::PermanentFailure {
                reason: PermanentReason::NotFound,
                ..
            } => "not_found",
            Self::PermanentFailure { .. } => "rejected",
            Self::RetryableFailure { .. } => "retryable",
        }
    }
}

/// Status-code bands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    NotFound,
    Rejected,
    ServerError,
    Unexpected,
}

impl StatusClass {
    /// The shared status-code decision table
    pub fn of(status: u16) -> Self {
        match status {
            200 | 201 => Self::Success,
            404 => Self::NotFound,
            400..=499 => Self::Rejected,
            500..=599 => Self::ServerError,
            _ => Self::Unexpected,
        }
    }
}

/// Maps worker results to [`CallOutcome`]s using a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct OutcomeClassifier {
    policy: RetryPolicy,
}

impl OutcomeClassifier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Classify whatever the worker produced
    pub fn classify(&self, result: WorkerResult, now_ms: i64) -> Result<CallOutcome, CallError> {
        match result {
            Ok((status, body)) => self.classify_status(status, body, now_ms),
            Err(err) => self.classify_error(err, now_ms),
        }
    }

    /// Classify a complete response
    ///
    /// # Errors
    ///
    /// Returns `CallError::UnexpectedStatus` for codes outside every known band
    pub fn classify_status(
        &self,
        status: u16,
        body: ResponseBody,
        now_ms: i64,
    ) -> Result<CallOutcome, CallError> {
        match StatusClass::of(status) {
            StatusClass::Success => Ok(CallOutcome::Success { status, body }),
            StatusClass::NotFound => Ok(CallOutcome::PermanentFailure {
                status,
                reason: PermanentReason::NotFound,
                description: format!("Page not found: {}", body.text()),
            }),
            StatusClass::Rejected => Ok(CallOutcome::PermanentFailure {
                status,
                reason: PermanentReason::Rejected,
                description: format!("HTTP code = {status}, Response = {}", body.text()),
            }),
            StatusClass::ServerError => Ok(CallOutcome::RetryableFailure {
                window: RetryWindow::from_policy(&self.policy.server_error, now_ms),
                description: format!("Server exception: {}", body.text()),
            }),
            StatusClass::Unexpected => Err(CallError::UnexpectedStatus {
                status,
                body: body.text().to_string(),
            }),
        }
    }

    /// Classify a transport failure
    ///
    /// # Errors
    ///
    /// Returns `CallError::Interrupted` for interruptions and
    /// `CallError::Protocol` for protocol errors; neither is retried
    pub fn classify_error(
        &self,
        err: TransportError,
        now_ms: i64,
    ) -> Result<CallOutcome, CallError> {
        match err {
            TransportError::Timeout(msg)
            | TransportError::Connect(msg)
            | TransportError::Io(msg) => Ok(CallOutcome::RetryableFailure {
                window: RetryWindow::from_policy(&self.policy.io_error, now_ms),
                description: format!("IO exception: {msg}"),
            }),
            TransportError::Interrupted(_) => Err(CallError::Interrupted),
            TransportError::Protocol(msg) => Err(CallError::Protocol(msg)),
        }
    }
}

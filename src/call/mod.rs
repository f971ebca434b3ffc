//! Bounded remote call
//!
//! Runs one request on a dedicated worker task and waits for it from the
//! caller's task. The wait ends on whichever comes first:
//! - the worker finishing (its transport timeouts bound this)
//! - the caller's [`CancellationToken`] firing
//! - the optional hard deadline
//!
//! On cancellation the worker task is aborted, which drops the in-flight
//! request and closes its socket even if the transport is parked in a read.
//! The worker always reports the end of the request to
//! [`Transport::release`], with `aborted = true` when it was cut short.

pub mod decode;
pub mod outcome;

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::{ClassifiedError, ErrorCategory};
use crate::metrics;
use crate::transport::{CallRequest, Transport, TransportError};

pub use decode::{decode_body, ResponseBody};
pub use outcome::{now_ms, CallOutcome, OutcomeClassifier, PermanentReason, RetryWindow, StatusClass};

/// What the worker hands back through its join handle: status and decoded body, or the failure
pub type WorkerResult = Result<(u16, ResponseBody), TransportError>;

/// Hard failures of a bounded call; never retried by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The caller cancelled the call
    #[error("Interrupted")]
    Interrupted,

    /// Status code outside every known band
    #[error("Unexpected HTTP result code: {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The request could not be sent as built
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote side answered, but not with what the caller needs
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The worker task panicked
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl ClassifiedError for CallError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Interrupted => ErrorCategory::Cancelled,
            Self::UnexpectedStatus { .. } | Self::Protocol(_) | Self::UnexpectedResponse(_) => {
                ErrorCategory::Protocol
            }
            Self::Worker(_) => ErrorCategory::Other,
        }
    }
}

/// Calls [`Transport::release`] when the worker ends, however it ends
struct ReleaseGuard {
    transport: Arc<dyn Transport>,
    request: CallRequest,
    finished: bool,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.finished {
            debug!(request = %self.request.summary(), "Worker dropped before completion");
        }
        self.transport.release(&self.request, !self.finished);
    }
}

/// Worker body: one request/response cycle, body decoded before returning
async fn run_worker(transport: Arc<dyn Transport>, request: CallRequest) -> WorkerResult {
    let mut guard = ReleaseGuard {
        transport,
        request,
        finished: false,
    };

    let result = guard.transport.execute(&guard.request).await;
    guard.finished = true;

    result.map(|raw| {
        let body = decode_body(raw.body, raw.content_type.as_deref());
        (raw.status, body)
    })
}

/// Resolves after `deadline`, or never when there is none
async fn deadline_elapsed(deadline: Option<Duration>) {
    match deadline {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}

/// Executes bounded calls over a shared transport
#[derive(Clone)]
pub struct BoundedCall {
    transport: Arc<dyn Transport>,
    classifier: OutcomeClassifier,
    deadline: Option<Duration>,
}

impl BoundedCall {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            classifier: OutcomeClassifier::new(policy),
            deadline: None,
        }
    }

    /// Set a hard per-call deadline enforced by the waiter
    ///
    /// When it elapses the worker is aborted and the call is classified as an
    /// I/O timeout.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn classifier(&self) -> &OutcomeClassifier {
        &self.classifier
    }

    /// Run `request` to completion, cancellation, or deadline
    ///
    /// # Errors
    ///
    /// - `CallError::Interrupted` if `cancel` fires first (or already has)
    /// - `CallError::UnexpectedStatus` for status codes outside all known bands
    /// - `CallError::Protocol` if the transport rejects the request as built
    /// - `CallError::Worker` if the worker panics
    pub async fn execute(
        &self,
        request: CallRequest,
        cancel: &CancellationToken,
    ) -> Result<CallOutcome, CallError> {
        let call_id = Uuid::new_v4();
        let summary = request.summary();
        let started = Instant::now();

        if cancel.is_cancelled() {
            debug!(%call_id, request = %summary, "Cancelled before start");
            metrics::record_call("interrupted", started.elapsed().as_secs_f64());
            return Err(CallError::Interrupted);
        }

        debug!(%call_id, request = %summary, "Starting bounded call");
        let mut worker = tokio::spawn(run_worker(Arc::clone(&self.transport), request));

        let joined = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                worker.abort();
                warn!(%call_id, request = %summary, "Bounded call interrupted by caller");
                metrics::record_call("interrupted", started.elapsed().as_secs_f64());
                return Err(CallError::Interrupted);
            }

            joined = &mut worker => joined,

            _ = deadline_elapsed(self.deadline) => {
                worker.abort();
                let limit = self.deadline.unwrap_or_default();
                warn!(
                    %call_id,
                    request = %summary,
                    deadline_ms = limit.as_millis() as u64,
                    "Bounded call exceeded its deadline"
                );
                Ok(Err(TransportError::Timeout(format!(
                    "call exceeded deadline of {} ms",
                    limit.as_millis()
                ))))
            }
        };

        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TransportError::Interrupted(e.to_string())),
            Err(e) => {
                error!(%call_id, request = %summary, error = %e, "Worker panicked");
                metrics::record_call("worker_failed", started.elapsed().as_secs_f64());
                return Err(CallError::Worker(e.to_string()));
            }
        };

        let outcome = self.classifier.classify(result, now_ms());
        let elapsed = started.elapsed();

        match &outcome {
            Ok(CallOutcome::Success { status, .. }) => {
                debug!(%call_id, request = %summary, status, elapsed_ms = elapsed.as_millis() as u64, "Call succeeded");
            }
            Ok(CallOutcome::PermanentFailure {
                status,
                description,
                ..
            }) => {
                warn!(%call_id, request = %summary, status, %description, "Call rejected");
            }
            Ok(CallOutcome::RetryableFailure {
                window,
                description,
            }) => {
                warn!(
                    %call_id,
                    request = %summary,
                    retry_not_before_ms = window.not_before_ms,
                    retry_not_after_ms = window.not_after_ms,
                    %description,
                    "Call failed; retry later"
                );
            }
            Err(e) => {
                error!(%call_id, request = %summary, error = %e, "Call failed");
            }
        }

        let label = match &outcome {
            Ok(o) => o.label(),
            Err(CallError::Interrupted) => "interrupted",
            Err(_) => "error",
        };
        metrics::record_call(label, elapsed.as_secs_f64());

        outcome
    }
}

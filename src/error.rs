//! Unified error handling for the boundcall crate
//!
//! Every layer defines its own error enum (transport, call, connector) and this
//! module folds them into a single [`Error`] while keeping the layer-specific
//! types available to callers that need to branch on them.
//!
//! # Architecture
//!
//! - [`ClassifiedError`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all layer-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use boundcall::error::{ClassifiedError, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Will be retried later: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use thiserror::Error;

pub use crate::call::CallError;
pub use crate::connector::ServiceInterruption;
pub use crate::transport::TransportError;

/// Common trait for all boundcall error types
///
/// Lets the caller decide between "report and move on", "ask for a retry later"
/// and "stop" without matching on every concrete variant.
pub trait ClassifiedError: std::error::Error {
    /// Check if this error is recoverable (a later retry may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (timeouts, resets, server errors)
    Network,
    /// The remote side answered with something we cannot interpret
    Protocol,
    /// Configuration and validation errors
    Config,
    /// The caller cancelled the operation
    Cancelled,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short lowercase label, used for metrics and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Protocol => "protocol",
            Self::Config => "config",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for all boundcall operations
#[derive(Error, Debug)]
pub enum Error {
    /// Required configuration missing or invalid
    #[error("Config error: {0}")]
    Config(String),

    /// Hard failure of a bounded call (interrupted, unexpected status, ...)
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    /// Transient failure; the caller should retry inside the given window
    #[error("Service interruption: {0}")]
    Interruption(#[from] ServiceInterruption),

    /// Transport failure that escaped classification
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ClassifiedError for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Call(e) => e.is_recoverable(),
            Self::Interruption(_) => true,
            Self::Transport(e) => e.is_recoverable(),
            Self::Json(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::Call(e) => e.category(),
            Self::Interruption(_) => ErrorCategory::Network,
            Self::Transport(e) => e.category(),
            Self::Json(_) => ErrorCategory::Protocol,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True when the error reports a cancellation by the caller
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::Call(CallError::Interrupted) | Self::Transport(TransportError::Interrupted(_))
        )
    }
}

/// reqwest failures take the same timeout/connect/protocol split as the transport
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(TransportError::from(err))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

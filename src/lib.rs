//! boundcall - bounded remote calls for connector plugins
//!
//! Issues one blocking-style HTTP call at a time on behalf of a connector
//! instance, with a hard bound on how long the caller can be held up and a
//! fixed classification of what came back.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration structs, env/TOML loading, endpoint resolution
//! - [`transport`] - Request/response types and the pooled HTTP transport
//! - [`call`] - Worker task, cancellable waiter, outcome classification, decoding
//! - [`session`] - Lazily-created, idle-expiring session per connector instance
//! - [`connector`] - Document status, service interruptions, connection checks
//! - [`metrics`] - Prometheus counters for calls and sessions
//! - [`error`] - Unified error type and categories
//!
//! # Example
//!
//! ```no_run
//! use boundcall::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let mut connector = RemoteConnector::new(&config);
//!     let cancel = CancellationToken::new();
//!
//!     let request = CallRequest::post("documents/batch").body("[]");
//!     match connector.send_document(request, &cancel).await {
//!         Ok(DocumentStatus::Accepted) => println!("indexed"),
//!         Ok(DocumentStatus::Rejected { description, .. }) => println!("rejected: {description}"),
//!         Err(Error::Interruption(e)) => println!("retry after {}", e.retry_not_before_ms),
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod call;
pub mod config;
pub mod connector;
pub mod error;
pub mod metrics;
pub mod session;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::call::{BoundedCall, CallError, CallOutcome, PermanentReason, ResponseBody, RetryWindow};
    pub use crate::config::{Config, Endpoint, RetryPolicy, SessionConfig};
    pub use crate::connector::{
        ActivityResult, CallActivity, DocumentStatus, RemoteConnector, ServiceInterruption,
    };
    pub use crate::error::{ClassifiedError, Error, ErrorCategory, Result};
    pub use crate::session::{RemoteSession, TransportFactory};
    pub use crate::transport::{CallRequest, HttpTransport, RawResponse, Transport, TransportError};
}

// Direct re-exports for convenience
pub use call::{BoundedCall, CallOutcome};
pub use connector::{DocumentStatus, RemoteConnector, ServiceInterruption};
pub use error::{Error, Result};

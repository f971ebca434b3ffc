//! Transport layer: one request, one fully-read response
//!
//! A [`Transport`] performs exactly one request/response cycle. It knows nothing
//! about outcome classification, retry windows or cancellation; those live in
//! [`crate::call`]. The production implementation is [`http::HttpTransport`];
//! tests substitute stubs.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use thiserror::Error;

use crate::error::{ClassifiedError, ErrorCategory};

pub use http::HttpTransport;

/// Errors a transport can report for a single request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Socket or overall request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Connection could not be established (refused, DNS, TLS handshake)
    #[error("Connection failed: {0}")]
    Connect(String),

    /// I/O failure after the connection was up (reset, truncated body)
    #[error("I/O failure: {0}")]
    Io(String),

    /// The request was interrupted before it completed
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Malformed request or protocol violation; retrying will not help
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether this failure belongs to the I/O class (networks are assumed to recover)
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_) | Self::Io(_))
    }
}

impl ClassifiedError for TransportError {
    fn is_recoverable(&self) -> bool {
        self.is_io()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout(_) | Self::Connect(_) | Self::Io(_) => ErrorCategory::Network,
            Self::Interrupted(_) => ErrorCategory::Cancelled,
            Self::Protocol(_) => ErrorCategory::Protocol,
        }
    }
}

/// A prepared request: method, absolute URL, headers and optional body
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl CallRequest {
    /// Create a request with no headers and no body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Add a header
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Protocol` if the name or value is not a valid header
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Protocol(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Protocol(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Set a raw body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body and the matching content type
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if `value` cannot be serialized
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// `METHOD url` form used in log lines
    pub fn summary(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// A fully-read response, before charset decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Executes one request/response cycle
///
/// Implementations must read the entire response body before returning so the
/// connection can be handed back to the pool.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and read the whole response
    async fn execute(&self, request: &CallRequest) -> Result<RawResponse, TransportError>;

    /// Called exactly once when the worker that issued `request` ends
    ///
    /// `aborted` is true when the worker was cancelled before `execute` returned.
    fn release(&self, _request: &CallRequest, _aborted: bool) {}
}

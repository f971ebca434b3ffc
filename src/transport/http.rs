//! Connection-pooled HTTP transport backed by reqwest
//!
//! One [`HttpTransport`] is built per session and reused for every call made
//! through that session. The client carries:
//! - a per-read socket timeout and a connect timeout; the overall bound on a
//!   call is the waiter's deadline, not the client's
//! - an optional proxy, with proxy credentials
//! - optional basic credentials for the remote service
//! - gzip decompression

use async_trait::async_trait;
use std::error::Error as _;
use reqwest::{header::CONTENT_TYPE, Client, Proxy};
use tracing::debug;

use super::{CallRequest, RawResponse, Transport, TransportError};
use crate::config::{Credentials, Endpoint};

/// reqwest-based [`Transport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Pooled client; cloning shares the pool
    client: Client,

    /// Service credentials sent with every request
    credentials: Option<Credentials>,
}

impl HttpTransport {
    /// Build a transport for a resolved endpoint
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Protocol` if the proxy URL is invalid or the
    /// client cannot be created
    pub fn new(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .read_timeout(endpoint.socket_timeout)
            .connect_timeout(endpoint.connect_timeout)
            .user_agent(endpoint.user_agent.as_str())
            .gzip(true);

        if let Some(proxy) = &endpoint.proxy {
            let mut reqwest_proxy = Proxy::all(proxy.url())
                .map_err(|e| TransportError::Protocol(format!("invalid proxy: {e}")))?;
            if let Some(credentials) = &proxy.credentials {
                reqwest_proxy =
                    reqwest_proxy.basic_auth(&proxy.qualified_username(), &credentials.password);
            }
            debug!(proxy = %proxy.url(), "Routing session through proxy");
            builder = builder.proxy(reqwest_proxy);
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            credentials: endpoint.credentials.clone(),
        })
    }

    /// Wrap an existing client, e.g. one shared with other components
    pub fn from_client(client: Client, credentials: Option<Credentials>) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &CallRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        if let Some(credentials) = &self.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        // Keep the header as an owned String before the body consumes the response
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

/// `err` and its sources, joined with `: `
fn error_chain(err: &reqwest::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !chain.contains(&text) {
            chain.push_str(": ");
            chain.push_str(&text);
        }
        source = cause.source();
    }
    chain
}

/// Body-read timeouts arrive as decode errors wrapping the timeout
fn is_timed_out(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        if cause.to_string().contains("timed out") {
            return true;
        }
        source = cause.source();
    }
    false
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let chain = error_chain(&err);
        if is_timed_out(&err) {
            if chain.contains("timed out") {
                Self::Timeout(chain)
            } else {
                Self::Timeout(format!("timed out: {chain}"))
            }
        } else if err.is_connect() {
            Self::Connect(chain)
        } else if err.is_builder() || err.is_redirect() {
            Self::Protocol(chain)
        } else {
            Self::Io(chain)
        }
    }
}

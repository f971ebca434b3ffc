//! Remote session lifecycle
//!
//! A [`RemoteSession`] owns the transport for one connector instance. It is
//! created lazily on first use, refreshed on every use, and released either by
//! a periodic [`RemoteSession::poll`] after an idle interval or explicitly by
//! [`RemoteSession::disconnect`]. A released session reconnects on next use.
//!
//! All state-changing methods take `&mut self`, so one session never has two
//! calls in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{Endpoint, SessionConfig};
use crate::error::Result;
use crate::metrics;
use crate::transport::{HttpTransport, Transport};

/// Builds a transport for a resolved endpoint
pub type TransportFactory = Arc<dyn Fn(&Endpoint) -> Result<Arc<dyn Transport>> + Send + Sync>;

/// Transport and endpoint of a connected session
#[derive(Clone)]
pub struct Connection {
    pub transport: Arc<dyn Transport>,
    pub endpoint: Endpoint,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

enum SessionState {
    Unconnected,
    Connected {
        connection: Connection,
        last_activity: Instant,
    },
}

/// Lazily-connected, idle-expiring holder of a transport
pub struct RemoteSession {
    config: SessionConfig,
    factory: TransportFactory,
    state: SessionState,
}

impl RemoteSession {
    /// Create an unconnected session using `factory` to build transports
    pub fn new(config: SessionConfig, factory: TransportFactory) -> Self {
        Self {
            config,
            factory,
            state: SessionState::Unconnected,
        }
    }

    /// Create an unconnected session backed by [`HttpTransport`]
    pub fn http(config: SessionConfig) -> Self {
        let factory: TransportFactory = Arc::new(|endpoint: &Endpoint| -> Result<Arc<dyn Transport>> {
            let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(endpoint)?);
            Ok(transport)
        });
        Self::new(config, factory)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn idle_release(&self) -> Duration {
        self.config.idle_release()
    }

    /// Connect if needed and refresh the activity timestamp
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if required parameters are missing or invalid,
    /// or any error from the transport factory. The session stays unconnected.
    pub fn acquire(&mut self) -> Result<Connection> {
        self.acquire_at(Instant::now())
    }

    /// [`Self::acquire`] with an explicit clock reading
    pub fn acquire_at(&mut self, now: Instant) -> Result<Connection> {
        match &mut self.state {
            SessionState::Connected {
                connection,
                last_activity,
            } => {
                *last_activity = now;
                Ok(connection.clone())
            }
            SessionState::Unconnected => {
                let endpoint = self.config.resolve()?;
                debug!(
                    base_url = %endpoint.base_url(),
                    proxy = ?endpoint.proxy.as_ref().map(|p| p.url()),
                    authenticated = endpoint.credentials.is_some(),
                    "Creating remote session"
                );
                let transport = (self.factory)(&endpoint)?;
                let connection = Connection {
                    transport,
                    endpoint,
                };
                self.state = SessionState::Connected {
                    connection: connection.clone(),
                    last_activity: now,
                };
                metrics::record_session_event("connect");
                info!(base_url = %connection.endpoint.base_url(), "Remote session connected");
                Ok(connection)
            }
        }
    }

    /// Release the session if it has been idle for the configured interval
    ///
    /// Returns true if the session was released.
    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    /// [`Self::poll`] with an explicit clock reading
    pub fn poll_at(&mut self, now: Instant) -> bool {
        let SessionState::Connected { last_activity, .. } = &self.state else {
            return false;
        };

        let idle = now.saturating_duration_since(*last_activity);
        if idle >= self.config.idle_release() {
            info!(idle_ms = idle.as_millis() as u64, "Releasing idle remote session");
            self.state = SessionState::Unconnected;
            metrics::record_session_event("idle_release");
            true
        } else {
            false
        }
    }

    /// Release the session unconditionally
    pub fn disconnect(&mut self) {
        if matches!(self.state, SessionState::Connected { .. }) {
            info!("Disconnecting remote session");
            metrics::record_session_event("disconnect");
        }
        self.state = SessionState::Unconnected;
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    /// Resolved endpoint, while connected
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match &self.state {
            SessionState::Connected { connection, .. } => Some(&connection.endpoint),
            SessionState::Unconnected => None,
        }
    }

    /// Time of the last use, while connected
    pub fn last_activity(&self) -> Option<Instant> {
        match &self.state {
            SessionState::Connected { last_activity, .. } => Some(*last_activity),
            SessionState::Unconnected => None,
        }
    }
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("last_activity", &self.last_activity())
            .finish()
    }
}

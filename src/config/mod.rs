//! Configuration management for boundcall
//!
//! Configuration is read once, when a session is created, from environment
//! variables or a TOML file. Every section is a plain struct with defaults;
//! [`SessionConfig::resolve`] turns the loosely-typed session section into a
//! validated [`Endpoint`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote session configuration
    pub session: SessionConfig,

    /// Retry windows attached to transient failures
    pub retry: RetryPolicy,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Remote service endpoint, credentials and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `http` or `https`; required
    pub protocol: Option<String>,

    /// Server host name; required
    pub host: Option<String>,

    /// Server port; defaults to 80 for http and 443 for https
    pub port: Option<u16>,

    /// Base path prepended to every relative request path
    pub path: String,

    /// Service user name (basic auth)
    pub username: Option<String>,

    /// Service password (basic auth)
    pub password: Option<String>,

    /// Optional HTTP proxy
    pub proxy: ProxyConfig,

    /// Socket (read) timeout in milliseconds
    pub socket_timeout_ms: u64,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Hard upper bound on a single call, enforced outside the transport
    pub call_deadline_ms: Option<u64>,

    /// Idle time after which a poll releases the session
    pub idle_release_ms: u64,

    /// User agent string
    pub user_agent: String,
}

/// Proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: Option<String>,

    /// Defaults to 8080 when a proxy host is set
    pub port: Option<u16>,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Windows domain; sent as `DOMAIN\user`
    pub domain: Option<String>,
}

/// Retry windows for the two retryable failure classes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Window for 5xx responses
    pub server_error: RetryWindowPolicy,

    /// Window for I/O failures (timeouts, resets, refused connections)
    pub io_error: RetryWindowPolicy,

    /// Treat 404 as a hard failure instead of a rejected document
    pub not_found_is_fatal: bool,
}

/// Relative retry window: do not retry before `not_before_ms`, give up after `not_after_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryWindowPolicy {
    pub not_before_ms: u64,
    pub not_after_ms: u64,

    /// Whether repeated failures count towards a cumulative failure budget
    pub cumulative: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol: None,
            host: None,
            port: None,
            path: String::new(),
            username: None,
            password: None,
            proxy: ProxyConfig::default(),
            socket_timeout_ms: 900_000,
            connect_timeout_ms: 60_000,
            call_deadline_ms: None,
            idle_release_ms: 300_000,
            user_agent: format!("boundcall/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            server_error: RetryWindowPolicy {
                not_before_ms: 5 * 60_000,
                not_after_ms: 20 * 60_000,
                cumulative: false,
            },
            io_error: RetryWindowPolicy {
                not_before_ms: 60_000,
                not_after_ms: 60 * 60_000,
                cumulative: true,
            },
            not_found_is_fatal: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Read an optional string variable; empty values count as unset
fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Read an optional numeric variable; a value that does not parse is fatal
fn env_number<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::config(format!("Bad number for {name}: {raw:?} ({e})"))),
        None => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a numeric variable does not parse
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let session = SessionConfig {
            protocol: env_string("BOUNDCALL_PROTOCOL"),
            host: env_string("BOUNDCALL_HOST"),
            port: env_number("BOUNDCALL_PORT")?,
            path: env_string("BOUNDCALL_PATH").unwrap_or_default(),
            username: env_string("BOUNDCALL_USERNAME"),
            password: env_string("BOUNDCALL_PASSWORD"),
            proxy: ProxyConfig {
                host: env_string("BOUNDCALL_PROXY_HOST"),
                port: env_number("BOUNDCALL_PROXY_PORT")?,
                username: env_string("BOUNDCALL_PROXY_USERNAME"),
                password: env_string("BOUNDCALL_PROXY_PASSWORD"),
                domain: env_string("BOUNDCALL_PROXY_DOMAIN"),
            },
            socket_timeout_ms: env_number("BOUNDCALL_SOCKET_TIMEOUT_MS")?
                .unwrap_or(defaults.session.socket_timeout_ms),
            connect_timeout_ms: env_number("BOUNDCALL_CONNECT_TIMEOUT_MS")?
                .unwrap_or(defaults.session.connect_timeout_ms),
            call_deadline_ms: env_number("BOUNDCALL_CALL_DEADLINE_MS")?,
            idle_release_ms: env_number("BOUNDCALL_IDLE_RELEASE_MS")?
                .unwrap_or(defaults.session.idle_release_ms),
            user_agent: env_string("BOUNDCALL_USER_AGENT")
                .unwrap_or(defaults.session.user_agent),
        };

        let logging = LoggingConfig {
            level: env_string("BOUNDCALL_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: env_string("BOUNDCALL_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            session,
            retry: defaults.retry,
            logging,
        })
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse TOML config file {}: {e}",
                path.display()
            ))
        })?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Required connection parameters are checked later, by
    /// [`SessionConfig::resolve`], when the session is first used.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.session.socket_timeout_ms == 0 {
            return Err(Error::config("socket_timeout_ms must be greater than 0"));
        }

        if self.session.connect_timeout_ms == 0 {
            return Err(Error::config("connect_timeout_ms must be greater than 0"));
        }

        if self.session.call_deadline_ms == Some(0) {
            return Err(Error::config("call_deadline_ms must be greater than 0"));
        }

        if self.session.idle_release_ms == 0 {
            return Err(Error::config("idle_release_ms must be greater than 0"));
        }

        for (name, window) in [
            ("server_error", &self.retry.server_error),
            ("io_error", &self.retry.io_error),
        ] {
            if window.not_after_ms < window.not_before_ms {
                return Err(Error::config(format!(
                    "retry.{name}: not_after_ms must not be earlier than not_before_ms"
                )));
            }
        }

        Ok(())
    }
}

impl SessionConfig {
    /// Socket timeout as Duration
    #[must_use]
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// Connect timeout as Duration
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Idle release interval as Duration
    #[must_use]
    pub fn idle_release(&self) -> Duration {
        Duration::from_millis(self.idle_release_ms)
    }

    /// Hard per-call deadline, if configured
    #[must_use]
    pub fn call_deadline(&self) -> Option<Duration> {
        self.call_deadline_ms.map(Duration::from_millis)
    }

    /// Validate required parameters and apply defaults
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when `protocol` or `host` is missing, the
    /// protocol is not http/https, or the resulting URL is invalid
    pub fn resolve(&self) -> Result<Endpoint> {
        let protocol = required("protocol", &self.protocol)?;
        let protocol: Protocol = protocol.parse()?;
        let host = required("host", &self.host)?.trim().to_string();
        let port = self.port.unwrap_or_else(|| protocol.default_port());
        let path = normalize_path(&self.path);

        let base = format!("{}://{}:{}{}", protocol.as_str(), host, port, path);
        Url::parse(&base).map_err(|e| Error::config(format!("Invalid endpoint {base}: {e}")))?;

        let credentials = self.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
        });

        let proxy = match self.proxy.host.as_deref().filter(|h| !h.is_empty()) {
            Some(proxy_host) => {
                let proxy = ProxyEndpoint {
                    host: proxy_host.to_string(),
                    port: self.proxy.port.unwrap_or(8080),
                    credentials: self.proxy.username.as_ref().map(|username| Credentials {
                        username: username.clone(),
                        password: self.proxy.password.clone().unwrap_or_default(),
                    }),
                    domain: self.proxy.domain.clone().filter(|d| !d.is_empty()),
                };
                Url::parse(&proxy.url())
                    .map_err(|e| Error::config(format!("Invalid proxy {}: {e}", proxy.url())))?;
                Some(proxy)
            }
            None => None,
        };

        Ok(Endpoint {
            protocol,
            host,
            port,
            path,
            credentials,
            proxy,
            socket_timeout: self.socket_timeout(),
            connect_timeout: self.connect_timeout(),
            user_agent: self.user_agent.clone(),
        })
    }
}

fn required<'a>(name: &str, value: &'a Option<String>) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::config(format!(
            "Parameter {name} required but not set"
        ))),
    }
}

/// `"rest/api/"` -> `"/rest/api"`, `""` and `"/"` -> `""`
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// URL scheme of the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(Error::config(format!(
                "Parameter protocol must be http or https, got {other:?}"
            ))),
        }
    }
}

/// User name and password pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Resolved proxy settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub domain: Option<String>,
}

impl ProxyEndpoint {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Proxy user name, prefixed with the domain when one is set
    pub fn qualified_username(&self) -> String {
        let username = self
            .credentials
            .as_ref()
            .map(|c| c.username.as_str())
            .unwrap_or_default();
        match &self.domain {
            Some(domain) => format!("{domain}\\{username}"),
            None => username.to_string(),
        }
    }
}

/// Validated session parameters, produced once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Normalized base path: empty or `/segment[/segment...]`
    pub path: String,
    pub credentials: Option<Credentials>,
    pub proxy: Option<ProxyEndpoint>,
    pub socket_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Endpoint {
    /// `protocol://host:port/path`
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol.as_str(),
            self.host,
            self.port,
            self.path
        )
    }

    /// Absolute URL for a path relative to the base path
    pub fn url(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            self.base_url()
        } else {
            format!("{}/{}", self.base_url(), relative)
        }
    }
}

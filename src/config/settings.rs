//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::auth::{AuthProvider, EnvTokenAuth, NoAuth};
use crate::mcp::dispatcher::ServerInfo;
use crate::mcp::federation::{RemoteEndpointConfig, Visibility, NAMESPACE_SEPARATOR};
use crate::mcp::protocol::SERVER_NAME;
use crate::mcp::session::{InMemorySessionManager, SessionManager, StatelessSessionManager};

/// Minimum length of a configured session signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Advertised server identity.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Session management.
    #[serde(default)]
    pub session: SessionConfig,

    /// Enabled transports.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Remote endpoints to federate.
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        self.transport.validate()?;

        let mut namespaces = HashSet::new();
        for remote in &self.remotes {
            remote.validate()?;
            if !remote.namespace.is_empty() && !namespaces.insert(remote.namespace.as_str()) {
                return Err(invalid(format!(
                    "Duplicate remote namespace '{}'",
                    remote.namespace
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        message: message.into(),
    }
}

/// Advertised server identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Name reported in `serverInfo`.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Version reported in `serverInfo`.
    #[serde(default = "default_server_version")]
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

impl ServerConfig {
    /// The `serverInfo` to advertise.
    #[must_use]
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

fn default_server_name() -> String {
    SERVER_NAME.to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Which session manager to install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Signed self-verifying tokens.
    #[default]
    Stateless,
    /// Revocable sessions kept in process memory.
    Memory,
    /// No session management.
    Disabled,
}

/// Session management configuration.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Which manager to use.
    #[serde(default)]
    pub mode: SessionMode,

    /// Token signing secret for stateless mode. A random per-process key is
    /// used when absent.
    #[serde(default)]
    pub secret: Option<String>,

    /// Lifetime of a stateless token.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Idle time after which in-memory sessions are reaped.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How often the idle sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("mode", &self.mode)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("max_age_secs", &self.max_age_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            secret: None,
            max_age_secs: default_max_age_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == SessionMode::Stateless {
            if let Some(secret) = &self.secret {
                if secret.len() < MIN_SECRET_LEN {
                    return Err(invalid(format!(
                        "Session secret must be at least {MIN_SECRET_LEN} bytes"
                    )));
                }
            }
        }
        if self.max_age_secs == 0 {
            return Err(invalid("session.max_age_secs must be greater than 0"));
        }
        if self.idle_timeout_secs == 0 {
            return Err(invalid("session.idle_timeout_secs must be greater than 0"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(invalid("session.sweep_interval_secs must be greater than 0"));
        }
        Ok(())
    }

    /// Idle timeout handed to the sweep.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Interval between idle sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Builds the configured session manager, `None` when disabled.
    #[must_use]
    pub fn build(&self) -> Option<Arc<dyn SessionManager>> {
        let max_age = Duration::from_secs(self.max_age_secs);
        match self.mode {
            SessionMode::Disabled => None,
            SessionMode::Memory => Some(Arc::new(InMemorySessionManager::new())),
            SessionMode::Stateless => Some(match &self.secret {
                Some(secret) => Arc::new(StatelessSessionManager::new(secret.as_bytes(), max_age)),
                None => Arc::new(StatelessSessionManager::with_random_key(max_age)),
            }),
        }
    }
}

const fn default_max_age_secs() -> u64 {
    24 * 60 * 60
}

const fn default_idle_timeout_secs() -> u64 {
    60 * 60
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Serve on stdin/stdout.
    #[serde(default = "default_true")]
    pub stdio: bool,

    /// Serve streamable HTTP on this address.
    #[serde(default)]
    pub http_addr: Option<SocketAddr>,

    /// Route of the HTTP endpoint.
    #[serde(default = "default_http_path")]
    pub http_path: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            stdio: default_true(),
            http_addr: None,
            http_path: default_http_path(),
        }
    }
}

impl TransportConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.stdio && self.http_addr.is_none() {
            return Err(invalid(
                "At least one transport must be enabled (stdio or http_addr)",
            ));
        }
        if !self.http_path.starts_with('/') {
            return Err(invalid(format!(
                "transport.http_path '{}' must start with '/'",
                self.http_path
            )));
        }
        Ok(())
    }
}

const fn default_true() -> bool {
    true
}

fn default_http_path() -> String {
    crate::mcp::transport::http::DEFAULT_HTTP_PATH.to_string()
}

/// One remote endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Endpoint URL (http or https).
    pub url: String,

    /// Prefix for the endpoint's tools.
    #[serde(default)]
    pub namespace: String,

    /// Exposure tier.
    #[serde(default)]
    pub visibility: Visibility,

    /// Environment variable holding a bearer token.
    #[serde(default)]
    pub bearer_token_env: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteConfig {
    fn parsed_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.url)
            .map_err(|e| invalid(format!("Invalid remote URL '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "Remote URL '{}' must use http or https",
                self.url
            )));
        }
        Ok(url)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_url()?;
        if self.namespace.contains(NAMESPACE_SEPARATOR) {
            return Err(invalid(format!(
                "Remote namespace '{}' must not contain '{NAMESPACE_SEPARATOR}'",
                self.namespace
            )));
        }
        if self.timeout_secs == 0 {
            return Err(invalid(format!(
                "Remote '{}' timeout_secs must be greater than 0",
                self.url
            )));
        }
        Ok(())
    }

    /// Converts into a federation endpoint registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn endpoint(&self) -> Result<RemoteEndpointConfig, ConfigError> {
        let auth: Arc<dyn AuthProvider> = match &self.bearer_token_env {
            Some(var) => Arc::new(EnvTokenAuth::new(var.clone())),
            None => Arc::new(NoAuth),
        };
        Ok(RemoteEndpointConfig::new(self.parsed_url()?, self.namespace.clone())
            .with_visibility(self.visibility)
            .with_auth(auth)
            .with_timeout(Duration::from_secs(self.timeout_secs)))
    }
}

const fn default_remote_timeout_secs() -> u64 {
    30
}

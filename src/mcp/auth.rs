//! Credentials for outbound calls to remote endpoints.
//!
//! How a credential is obtained is the provider's business; the remote client
//! only asks for the `Authorization` header value and, after a 401, asks the
//! provider to refresh once.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AuthError;

/// Upper bound on a single credential refresh.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Supplies the `Authorization` header for a remote endpoint.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current header value, or `None` to send no header.
    async fn get_auth_header(&self) -> Result<Option<String>, AuthError>;

    /// Obtains a fresh credential.
    async fn refresh(&self) -> Result<(), AuthError>;
}

/// Runs [`AuthProvider::refresh`] bounded by [`REFRESH_TIMEOUT`].
///
/// # Errors
///
/// The provider's own error, or [`AuthError::Timeout`].
pub async fn refresh_bounded(provider: &dyn AuthProvider) -> Result<(), AuthError> {
    tokio::time::timeout(REFRESH_TIMEOUT, provider.refresh())
        .await
        .map_err(|_| AuthError::Timeout)?
}

/// Sends no credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    async fn get_auth_header(&self) -> Result<Option<String>, AuthError> {
        Ok(None)
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// A fixed bearer token.
#[derive(Clone)]
pub struct StaticTokenAuth {
    header: String,
}

impl std::fmt::Debug for StaticTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticTokenAuth(<redacted>)")
    }
}

impl StaticTokenAuth {
    /// Wraps a bearer token.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self {
            header: format!("Bearer {}", token.as_ref()),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn get_auth_header(&self) -> Result<Option<String>, AuthError> {
        Ok(Some(self.header.clone()))
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        Err(AuthError::Refresh("static token cannot be refreshed".to_string()))
    }
}

/// A bearer token read from an environment variable on every call, so a
/// rotated value is picked up without a restart.
#[derive(Debug, Clone)]
pub struct EnvTokenAuth {
    var: String,
}

impl EnvTokenAuth {
    /// Reads the token from `var`.
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl AuthProvider for EnvTokenAuth {
    async fn get_auth_header(&self) -> Result<Option<String>, AuthError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.is_empty() => Ok(Some(format!("Bearer {token}"))),
            _ => Err(AuthError::Unavailable(format!(
                "environment variable {} is not set",
                self.var
            ))),
        }
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        // Re-read on the next get_auth_header.
        Ok(())
    }
}

//! Pluggable session lifecycle.
//!
//! The dispatcher only sees the [`SessionManager`] capability. Two
//! implementations ship with the crate:
//!
//! - [`StatelessSessionManager`] (default): the session id is a signed token
//!   carrying its own issue time and protocol version. Any process holding
//!   the same key can validate it; nothing is stored, so nothing can be
//!   revoked before it expires.
//! - [`InMemorySessionManager`]: random ids tracked in a local table with
//!   last-seen times. Supports revocation and idle reaping, but sessions are
//!   only known to the process that issued them.
//!
//! # Token Format
//!
//! ```text
//! base64url(json{ "v": <version>, "iat": <unix secs>, "n": <nonce> }) "." base64url(hmac_sha256)
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::SessionError;

type HmacSha256 = Hmac<Sha256>;

/// Tolerated clock skew for tokens issued "in the future" by a peer instance.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Session lifecycle operations consumed by the dispatcher.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Issues a new session for a negotiated protocol version.
    async fn create_session(&self, protocol_version: &str) -> Result<String, SessionError>;

    /// Checks a presented session id.
    ///
    /// `Ok(false)` means the session is not acceptable; `Err` means the
    /// manager itself failed.
    async fn validate_session(&self, id: &str) -> Result<bool, SessionError>;

    /// Ends a session.
    async fn delete_session(&self, id: &str) -> Result<(), SessionError>;

    /// Drops sessions idle for longer than `max_idle`.
    async fn cleanup_expired_sessions(&self, max_idle: Duration) -> Result<(), SessionError>;
}

/// Claims carried inside a stateless session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Negotiated protocol version.
    #[serde(rename = "v")]
    pub protocol_version: String,
    /// Issue time, seconds since the Unix epoch.
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Random nonce making every token unique.
    #[serde(rename = "n")]
    pub nonce: String,
}

/// Self-verifying signed session tokens. No shared store.
pub struct StatelessSessionManager {
    key: Vec<u8>,
    max_age: Duration,
}

impl std::fmt::Debug for StatelessSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatelessSessionManager")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl StatelessSessionManager {
    /// Creates a manager signing with `secret`. Tokens older than `max_age`
    /// are rejected.
    pub fn new(secret: impl AsRef<[u8]>, max_age: Duration) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            max_age,
        }
    }

    /// Creates a manager with a random per-process key.
    ///
    /// Tokens it issues cannot be validated by any other process.
    #[must_use]
    pub fn with_random_key(max_age: Duration) -> Self {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        Self { key, max_age }
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| SessionError::Backend(e.to_string()))
    }

    /// Signs a fresh token for `protocol_version`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Backend`] if the claims cannot be encoded.
    pub fn issue(&self, protocol_version: &str) -> Result<String, SessionError> {
        let claims = SessionClaims {
            protocol_version: protocol_version.to_string(),
            issued_at: Utc::now().timestamp(),
            nonce: Uuid::new_v4().simple().to_string(),
        };
        let payload =
            serde_json::to_vec(&claims).map_err(|e| SessionError::Backend(e.to_string()))?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verifies a token's signature and age and returns its claims.
    ///
    /// # Errors
    ///
    /// [`SessionError::Malformed`], [`SessionError::Signature`] or
    /// [`SessionError::Expired`] for unacceptable tokens.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let (payload_b64, signature_b64) = token.split_once('.').ok_or(SessionError::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SessionError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| SessionError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| SessionError::Signature)?;

        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)?;

        let now = Utc::now().timestamp();
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        if claims.issued_at > now + MAX_CLOCK_SKEW_SECS
            || now.saturating_sub(claims.issued_at) > max_age
        {
            return Err(SessionError::Expired);
        }

        Ok(claims)
    }
}

#[async_trait]
impl SessionManager for StatelessSessionManager {
    async fn create_session(&self, protocol_version: &str) -> Result<String, SessionError> {
        self.issue(protocol_version)
    }

    async fn validate_session(&self, id: &str) -> Result<bool, SessionError> {
        match self.verify(id) {
            Ok(_) => Ok(true),
            Err(SessionError::Backend(e)) => Err(SessionError::Backend(e)),
            Err(e) => {
                debug!(reason = %e, "Rejected session token");
                Ok(false)
            }
        }
    }

    async fn delete_session(&self, _id: &str) -> Result<(), SessionError> {
        // Nothing is stored; the token simply runs out its lifetime.
        Ok(())
    }

    async fn cleanup_expired_sessions(&self, _max_idle: Duration) -> Result<(), SessionError> {
        Ok(())
    }
}

/// One tracked session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last successful validation.
    pub last_seen: DateTime<Utc>,
}

/// Revocation-capable sessions kept in process memory.
#[derive(Debug, Default)]
pub struct InMemorySessionManager {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Returns a copy of a session's record.
    pub async fn get(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.read().await.get(id).cloned()
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn create_session(&self, protocol_version: &str) -> Result<String, SessionError> {
        let id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        self.sessions.write().await.insert(
            id.clone(),
            SessionRecord {
                protocol_version: protocol_version.to_string(),
                created_at: now,
                last_seen: now,
            },
        );
        Ok(id)
    }

    async fn validate_session(&self, id: &str) -> Result<bool, SessionError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(id).is_some_and(|record| {
            record.last_seen = Utc::now();
            true
        }))
    }

    async fn delete_session(&self, id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(SessionError::Unknown)
    }

    async fn cleanup_expired_sessions(&self, max_idle: Duration) -> Result<(), SessionError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| {
            (now - record.last_seen)
                .to_std()
                .map_or(true, |idle| idle <= max_idle)
        });
        let reaped = before - sessions.len();
        if reaped > 0 {
            debug!(reaped, remaining = sessions.len(), "Reaped idle sessions");
        }
        Ok(())
    }
}

//! Session model - server-side record backing one refresh token.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Session entity. Only the digest of the refresh token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub refresh_token_hash: String,
    pub user_agent: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a new session.
    pub fn new(
        user_id: Uuid,
        tenant_id: Uuid,
        refresh_token_hash: String,
        user_agent: &str,
        ip_address: &str,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            tenant_id,
            refresh_token_hash,
            user_agent: user_agent.to_string(),
            ip_address: ip_address.to_string(),
            created_at: now,
            expires_at: now + ttl,
            revoked_at: None,
        }
    }

    /// Check if session is valid (not expired, not revoked).
    pub fn is_valid(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn revoke(&mut self) {
        if self.revoked_at.is_none() {
            self.revoked_at = Some(Utc::now());
        }
    }
}

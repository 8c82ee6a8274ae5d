//! Append-only security audit record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of audited transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventType {
    LoginSuccess,
    LoginFailed,
    Logout,
    TokenRefresh,
    PasswordChanged,
    PasswordResetRequested,
    PasswordResetCompleted,
    AccountCreated,
    AccountDisabled,
    AccountEnabled,
    RoleChanged,
    SessionRevoked,
}

impl AuthEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEventType::LoginSuccess => "login_success",
            AuthEventType::LoginFailed => "login_failed",
            AuthEventType::Logout => "logout",
            AuthEventType::TokenRefresh => "token_refresh",
            AuthEventType::PasswordChanged => "password_changed",
            AuthEventType::PasswordResetRequested => "password_reset_requested",
            AuthEventType::PasswordResetCompleted => "password_reset_completed",
            AuthEventType::AccountCreated => "account_created",
            AuthEventType::AccountDisabled => "account_disabled",
            AuthEventType::AccountEnabled => "account_enabled",
            AuthEventType::RoleChanged => "role_changed",
            AuthEventType::SessionRevoked => "session_revoked",
        }
    }
}

impl FromStr for AuthEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("Invalid auth event type: {}", s))
    }
}

/// Audit event entity. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub event_type: AuthEventType,
    pub ip_address: String,
    pub user_agent: String,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl AuthEvent {
    pub fn new(event_type: AuthEventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: None,
            tenant_id: None,
            event_type,
            ip_address: String::new(),
            user_agent: String::new(),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn client(mut self, ip_address: &str, user_agent: &str) -> Self {
        self.ip_address = ip_address.to_string();
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

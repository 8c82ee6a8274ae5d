//! User identity record.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Role, Tenant};

/// User entity. Email is globally unique and stored normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub must_reset_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new active user that must change the given (temporary) password.
    pub fn new(email: &str, password_hash: String, first_name: String, last_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash,
            first_name,
            last_name,
            is_active: true,
            must_reset_password: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A tenant membership resolved for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantMembership {
    pub tenant: Tenant,
    pub role: Role,
}

/// User with its tenant memberships eagerly loaded.
#[derive(Debug, Clone)]
pub struct UserWithTenants {
    pub user: User,
    pub memberships: Vec<TenantMembership>,
}

impl UserWithTenants {
    pub fn membership(&self, tenant_id: Uuid) -> Option<&TenantMembership> {
        self.memberships.iter().find(|m| m.tenant.id == tenant_id)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//! Tenant model - isolated business entity, read-only to this service.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: slug.into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inactive tenants block login and session issuance for every member.
    pub fn is_operational(&self) -> bool {
        self.is_active
    }
}

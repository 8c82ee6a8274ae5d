//! Binding of one user to one tenant with one role.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTenantRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserTenantRole {
    pub fn new(user_id: Uuid, tenant_id: Uuid, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            tenant_id,
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Role, UnknownRole, User};
use crate::services::{AuthError, CreatedUser, TenantUser, UserPage};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "ana@example.com")]
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    pub is_active: bool,
    pub must_reset_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(user: User, role: Option<Role>, tenant_id: Option<Uuid>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role,
            tenant_id,
            is_active: user.is_active,
            must_reset_password: user.must_reset_password,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    pub fn in_tenant(member: TenantUser, tenant_id: Uuid) -> Self {
        let tenant_id = member.role.map(|_| tenant_id);
        Self::new(member.user, member.role, tenant_id)
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "pablo@example.com")]
    pub email: String,

    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,

    /// One of owner, admin, manager, cashier, waiter, kitchen, viewer
    #[schema(example = "waiter")]
    pub role: String,
}

/// Returned once; the temporary password cannot be retrieved again.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateUserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub temporary_password: String,
    pub must_reset_password: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CreatedUser> for CreateUserResponse {
    fn from(created: CreatedUser) -> Self {
        Self {
            id: created.user.id,
            email: created.user.email,
            first_name: created.user.first_name,
            last_name: created.user.last_name,
            role: created.role,
            temporary_password: created.temporary_password,
            must_reset_password: created.user.must_reset_password,
            created_at: created.user.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    #[schema(example = "cashier")]
    pub role: String,
}

/// Unknown role names are rejected rather than defaulted.
pub fn parse_role(raw: &str) -> Result<Role, AuthError> {
    raw.parse::<Role>()
        .map_err(|UnknownRole(name)| AuthError::InvalidRole(name))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    /// 1-based page number
    pub page: Option<i64>,
    /// Page size, 1 to 100
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<UserResponse>,
    pub pagination: Pagination,
}

impl UserListResponse {
    pub fn new(page: UserPage, tenant_id: Uuid) -> Self {
        Self {
            data: page
                .users
                .into_iter()
                .map(|member| UserResponse::in_tenant(member, tenant_id))
                .collect(),
            pagination: Pagination {
                page: page.page,
                limit: page.limit,
                total: page.total,
                total_pages: page.total_pages,
            },
        }
    }
}

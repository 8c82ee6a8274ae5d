use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::users::UserResponse;
use crate::models::{Role, TokenPair};
use crate::services::{LoginResponse as LoginOutcome, Profile};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ana@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Correct1Horse")]
    pub password: String,

    /// Required when the account belongs to more than one tenant
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    #[schema(example = 3600)]
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        let TokenPair {
            access_token,
            refresh_token,
            token_type,
            expires_in,
            expires_at,
        } = outcome.tokens;

        Self {
            access_token,
            refresh_token,
            token_type,
            expires_in,
            expires_at,
            user: UserResponse::new(outcome.user, Some(outcome.role), Some(outcome.tenant.id)),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    #[schema(example = "q1b2c3...")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 1, message = "New password is required"))]
    #[schema(example = "Brand1NewPass")]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ana@example.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetCompleteRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "If the email exists, a password reset link has been sent")]
    pub message: String,
}

/// A tenant membership as shown on the profile.
#[derive(Debug, Serialize, ToSchema)]
pub struct TenantRoleInfo {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub role: Role,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub must_reset_password: bool,
    pub tenants: Vec<TenantRoleInfo>,
}

impl From<Profile> for MeResponse {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.user.id,
            email: profile.user.email,
            first_name: profile.user.first_name,
            last_name: profile.user.last_name,
            role: profile.role,
            tenant_id: profile.tenant.id,
            tenant_name: profile.tenant.name,
            must_reset_password: profile.user.must_reset_password,
            tenants: profile
                .memberships
                .into_iter()
                .map(|m| TenantRoleInfo {
                    id: m.tenant.id,
                    name: m.tenant.name,
                    slug: m.tenant.slug,
                    role: m.role,
                })
                .collect(),
        }
    }
}

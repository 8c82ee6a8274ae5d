use serde::Serialize;
use service_core::error::{AppError, ErrorDetail};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Role, TenantMembership};
use crate::repositories::RepoError;

/// A tenant the caller may pick when logging in with several memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TenantOption {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub role: Role,
}

impl From<&TenantMembership> for TenantOption {
    fn from(m: &TenantMembership) -> Self {
        Self {
            id: m.tenant.id,
            name: m.tenant.name.clone(),
            slug: m.tenant.slug.clone(),
            role: m.role,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is invalid")]
    TokenInvalid,

    #[error("Token is malformed")]
    TokenMalformed,

    #[error("Session has been revoked")]
    SessionRevoked,

    /// Part of the failure taxonomy for session stores that look sessions up
    /// by id. The refresh path reports unknown tokens as `RefreshTokenInvalid`.
    #[error("Session not found")]
    SessionNotFound,

    #[error("Refresh token is invalid")]
    RefreshTokenInvalid,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Cannot assign a role at or above your own")]
    CannotAssignRole,

    #[error("Cannot manage a user at or above your own role")]
    CannotManageRole,

    /// Not a failure: the user must choose one of these tenants and retry.
    #[error("Tenant selection required")]
    TenantRequired(Vec<TenantOption>),

    #[error("Tenant not found")]
    TenantNotFound,

    #[error("Tenant is inactive")]
    TenantInactive,

    #[error("User does not belong to this tenant")]
    UserNotInTenant,

    #[error("Email already exists")]
    EmailExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Password too weak: {0}")]
    PasswordWeak(String),

    #[error("Current password is incorrect")]
    PasswordIncorrect,

    #[error("Password reset token has expired")]
    PasswordResetExpired,

    #[error("Password reset token has already been used")]
    PasswordResetUsed,

    #[error("Password reset token is invalid")]
    PasswordResetInvalid,

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepoError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable snake_case name of the failure kind, for metrics labels and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountDisabled => "account_disabled",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenInvalid => "token_invalid",
            AuthError::TokenMalformed => "token_malformed",
            AuthError::SessionRevoked => "session_revoked",
            AuthError::SessionNotFound => "session_not_found",
            AuthError::RefreshTokenInvalid => "refresh_token_invalid",
            AuthError::Unauthorized => "unauthorized",
            AuthError::InsufficientRole => "insufficient_role",
            AuthError::CannotAssignRole => "cannot_assign_role",
            AuthError::CannotManageRole => "cannot_manage_role",
            AuthError::TenantRequired(_) => "tenant_required",
            AuthError::TenantNotFound => "tenant_not_found",
            AuthError::TenantInactive => "tenant_inactive",
            AuthError::UserNotInTenant => "user_not_in_tenant",
            AuthError::EmailExists => "email_exists",
            AuthError::UserNotFound => "user_not_found",
            AuthError::PasswordWeak(_) => "password_weak",
            AuthError::PasswordIncorrect => "password_incorrect",
            AuthError::PasswordResetExpired => "password_reset_expired",
            AuthError::PasswordResetUsed => "password_reset_used",
            AuthError::PasswordResetInvalid => "password_reset_invalid",
            AuthError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            AuthError::InvalidRole(_) => "invalid_role",
            AuthError::Repository(_) | AuthError::Internal(_) => "internal",
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidCredentials => {
                AppError::unauthorized("invalid_credentials", "Invalid email or password")
            }
            AuthError::AccountDisabled => AppError::unauthorized("account_disabled", message),
            AuthError::UserNotFound => AppError::not_found("not_found", message),
            AuthError::TokenExpired => AppError::unauthorized("token_expired", message),
            AuthError::TokenInvalid
            | AuthError::TokenMalformed
            | AuthError::RefreshTokenInvalid
            | AuthError::SessionNotFound => AppError::unauthorized("token_invalid", message),
            AuthError::SessionRevoked => AppError::unauthorized("session_revoked", message),
            AuthError::Unauthorized => AppError::unauthorized("unauthorized", message),
            AuthError::InsufficientRole
            | AuthError::CannotAssignRole
            | AuthError::CannotManageRole => AppError::forbidden("insufficient_role", message),
            AuthError::TenantRequired(tenants) => {
                let options = serde_json::to_value(&tenants).unwrap_or_default();
                AppError::BadRequest(
                    ErrorDetail::new("tenant_required", "Please select a tenant")
                        .with_extra("tenants", options),
                )
            }
            AuthError::TenantNotFound | AuthError::UserNotInTenant => {
                AppError::bad_request("invalid_tenant", message)
            }
            AuthError::TenantInactive => AppError::unauthorized("tenant_inactive", message),
            AuthError::EmailExists => AppError::bad_request("email_exists", message),
            AuthError::PasswordWeak(reason) => AppError::bad_request("password_weak", reason),
            AuthError::PasswordIncorrect => {
                AppError::bad_request("current_password_incorrect", message)
            }
            AuthError::PasswordResetInvalid => AppError::bad_request("token_invalid", message),
            AuthError::PasswordResetExpired => AppError::bad_request("token_expired", message),
            AuthError::PasswordResetUsed => AppError::bad_request("token_used", message),
            AuthError::RateLimitExceeded { retry_after } => AppError::too_many_requests(
                "Too many requests. Please try again later.",
                retry_after.max(1),
            ),
            AuthError::InvalidRole(role) => {
                AppError::bad_request("invalid_role", format!("Invalid role: {}", role))
            }
            AuthError::Repository(RepoError::Database(e)) => AppError::DatabaseError(e.into()),
            AuthError::Repository(e) => AppError::InternalError(e.into()),
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}

//! Services layer for the tenant auth module.
//!
//! Holds the login/refresh/logout engine, user and password management,
//! and the capabilities they are built on: password hashing, token
//! signing, rate limiting and audit recording.

mod audit;
mod auth;
pub mod error;
mod jwt;
pub mod metrics;
mod notifier;
mod password;
mod rate_limiter;
mod seed;
mod user;

#[cfg(test)]
pub(crate) mod test_support;

pub use audit::AuditRecorder;
pub use auth::{
    AuthContext, AuthService, ClientInfo, LoginRequest, LoginResponse, Profile, PurgeReport,
};
pub use error::{AuthError, TenantOption};
pub use jwt::{Jwk, Jwks, KeyManager, TokenConfig, TokenService};
pub use notifier::{LogNotifier, ResetNotifier};
pub use password::{random_token, token_digest, HashParams, PasswordService};
pub use rate_limiter::{RateLimitPolicy, RateLimiter, SlidingWindowLimiter};
pub use seed::{seed_demo_data, DEMO_PASSWORD, DEMO_TENANT_SLUG};
pub use user::{
    ChangePasswordRequest, CreateUserRequest, CreatedUser, TenantUser, UpdateUserRequest,
    UserPage, UserService, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

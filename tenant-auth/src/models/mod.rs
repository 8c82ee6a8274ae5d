pub mod auth_event;
pub mod password_reset_token;
pub mod role;
pub mod session;
pub mod tenant;
pub mod token;
pub mod user;
pub mod user_tenant_role;

pub use auth_event::{AuthEvent, AuthEventType};
pub use password_reset_token::{PasswordResetToken, ResetTokenState};
pub use role::{Role, UnknownRole};
pub use session::Session;
pub use tenant::Tenant;
pub use token::{Claims, TokenPair};
pub use user::{normalize_email, TenantMembership, User, UserWithTenants};
pub use user_tenant_role::UserTenantRole;

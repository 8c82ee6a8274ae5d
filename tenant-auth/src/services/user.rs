use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    normalize_email, AuthEvent, AuthEventType, PasswordResetToken, ResetTokenState, Role, User,
    UserTenantRole,
};
use crate::repositories::{RepoError, Repositories};
use crate::services::{
    AuditRecorder, AuthContext, AuthError, ClientInfo, PasswordService, RateLimiter,
    ResetNotifier,
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// A newly created user. The temporary password is never retrievable again.
#[derive(Debug, Clone)]
pub struct CreatedUser {
    pub user: User,
    pub role: Role,
    pub temporary_password: String,
}

/// Partial update: `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// A user as seen from one tenant.
#[derive(Debug, Clone)]
pub struct TenantUser {
    pub user: User,
    /// `None` when the user holds no role in that tenant.
    pub role: Option<Role>,
}

#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<TenantUser>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// User administration within a tenant, and the password lifecycle.
#[derive(Clone)]
pub struct UserService {
    repos: Repositories,
    passwords: PasswordService,
    reset_limiter: Arc<dyn RateLimiter>,
    notifier: Arc<dyn ResetNotifier>,
    audit: AuditRecorder,
    reset_token_ttl: Duration,
}

impl UserService {
    pub fn new(
        repos: Repositories,
        passwords: PasswordService,
        reset_limiter: Arc<dyn RateLimiter>,
        notifier: Arc<dyn ResetNotifier>,
        audit: AuditRecorder,
        reset_token_ttl: Duration,
    ) -> Self {
        Self {
            repos,
            passwords,
            reset_limiter,
            notifier,
            audit,
            reset_token_ttl,
        }
    }

    /// Create a user in the caller's tenant with a temporary password.
    pub async fn create(
        &self,
        ctx: &AuthContext,
        req: CreateUserRequest,
        client: &ClientInfo,
    ) -> Result<CreatedUser, AuthError> {
        if !ctx.role.can_assign(req.role) {
            return Err(AuthError::CannotAssignRole);
        }

        let email = normalize_email(&req.email);
        if self.repos.users.exists_by_email(&email).await? {
            return Err(AuthError::EmailExists);
        }

        let temporary_password = self.passwords.generate_temporary_password();
        let password_hash = self.passwords.hash(&temporary_password)?;

        let user = User::new(&email, password_hash, req.first_name, req.last_name);
        match self.repos.users.create(&user).await {
            Ok(()) => {}
            Err(RepoError::Conflict(_)) => return Err(AuthError::EmailExists),
            Err(e) => return Err(e.into()),
        }

        self.repos
            .roles
            .create(&UserTenantRole::new(user.id, ctx.tenant_id, req.role))
            .await?;

        self.audit
            .record(
                AuthEvent::new(AuthEventType::AccountCreated)
                    .user(user.id)
                    .tenant(ctx.tenant_id)
                    .client(&client.ip_address, &client.user_agent)
                    .meta("created_by", ctx.user_id.to_string())
                    .meta("role", req.role.as_str()),
            )
            .await;

        tracing::info!(
            user_id = %user.id,
            tenant_id = %ctx.tenant_id,
            created_by = %ctx.user_id,
            role = %req.role,
            "User created"
        );

        Ok(CreatedUser {
            user,
            role: req.role,
            temporary_password,
        })
    }

    pub async fn update(
        &self,
        ctx: &AuthContext,
        user_id: Uuid,
        req: UpdateUserRequest,
        client: &ClientInfo,
    ) -> Result<TenantUser, AuthError> {
        let mut user = self
            .repos
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        // Members of other tenants are invisible here. Only users with no
        // membership anywhere skip the manage check.
        let role = self
            .repos
            .roles
            .find_by_user_and_tenant(user_id, ctx.tenant_id)
            .await?
            .map(|binding| binding.role);
        match role {
            Some(current) if !ctx.role.can_manage(current) => {
                return Err(AuthError::CannotManageRole);
            }
            Some(_) => {}
            None => {
                if !self.repos.roles.list_by_user(user_id).await?.is_empty() {
                    return Err(AuthError::UserNotFound);
                }
            }
        }

        if let Some(first_name) = req.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = req.last_name {
            user.last_name = last_name;
        }

        let toggled = req.is_active.filter(|active| *active != user.is_active);
        if let Some(active) = toggled {
            user.is_active = active;
        }

        user.touch();
        self.repos.users.update(&user).await?;

        if let Some(active) = toggled {
            let event_type = if active {
                AuthEventType::AccountEnabled
            } else {
                let revoked = self.repos.sessions.revoke_all_for_user(user.id).await?;
                tracing::info!(user_id = %user.id, revoked, "Account disabled, sessions revoked");
                AuthEventType::AccountDisabled
            };

            self.audit
                .record(
                    AuthEvent::new(event_type)
                        .user(user.id)
                        .tenant(ctx.tenant_id)
                        .client(&client.ip_address, &client.user_agent)
                        .meta("updated_by", ctx.user_id.to_string()),
                )
                .await;
        }

        Ok(TenantUser { user, role })
    }

    /// Change a member's role. The caller must outrank both the current and
    /// the new role.
    pub async fn update_role(
        &self,
        ctx: &AuthContext,
        user_id: Uuid,
        new_role: Role,
        client: &ClientInfo,
    ) -> Result<TenantUser, AuthError> {
        if !ctx.role.can_assign(new_role) {
            return Err(AuthError::CannotAssignRole);
        }

        let mut binding = self
            .repos
            .roles
            .find_by_user_and_tenant(user_id, ctx.tenant_id)
            .await?
            .ok_or(AuthError::UserNotInTenant)?;

        if !ctx.role.can_manage(binding.role) {
            return Err(AuthError::CannotManageRole);
        }

        let user = self
            .repos
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let old_role = binding.role;
        binding.role = new_role;
        binding.updated_at = chrono::Utc::now();
        self.repos.roles.update(&binding).await?;

        self.audit
            .record(
                AuthEvent::new(AuthEventType::RoleChanged)
                    .user(user_id)
                    .tenant(ctx.tenant_id)
                    .client(&client.ip_address, &client.user_agent)
                    .meta("old_role", old_role.as_str())
                    .meta("new_role", new_role.as_str())
                    .meta("updated_by", ctx.user_id.to_string()),
            )
            .await;

        Ok(TenantUser {
            user,
            role: Some(new_role),
        })
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<UserPage, AuthError> {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = limit
            .filter(|l| (1..=MAX_PAGE_SIZE).contains(l))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(limit);

        let (users, total) = self
            .repos
            .users
            .list_by_tenant(tenant_id, offset, limit)
            .await?;

        let roles: HashMap<Uuid, Role> = self
            .repos
            .roles
            .list_by_tenant(tenant_id)
            .await?
            .into_iter()
            .map(|b| (b.user_id, b.role))
            .collect();

        let users = users
            .into_iter()
            .map(|user| TenantUser {
                role: roles.get(&user.id).copied(),
                user,
            })
            .collect();

        Ok(UserPage {
            users,
            total,
            page,
            limit,
            total_pages: (total + limit - 1) / limit,
        })
    }

    /// Users outside `tenant_id` are reported as not found.
    pub async fn get(&self, tenant_id: Uuid, user_id: Uuid) -> Result<TenantUser, AuthError> {
        let binding = self
            .repos
            .roles
            .find_by_user_and_tenant(user_id, tenant_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let user = self
            .repos
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(TenantUser {
            user,
            role: Some(binding.role),
        })
    }

    /// Every session of the user is revoked afterwards, including the caller's.
    pub async fn change_password(
        &self,
        ctx: &AuthContext,
        req: ChangePasswordRequest,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        let mut user = self
            .repos
            .users
            .find_by_id(ctx.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self
            .passwords
            .verify(&req.current_password, &user.password_hash)?
        {
            return Err(AuthError::PasswordIncorrect);
        }

        self.passwords.validate_password(&req.new_password)?;

        user.password_hash = self.passwords.hash(&req.new_password)?;
        user.must_reset_password = false;
        user.touch();
        self.repos.users.update(&user).await?;

        let revoked = self.repos.sessions.revoke_all_for_user(user.id).await?;

        self.audit
            .record(
                AuthEvent::new(AuthEventType::PasswordChanged)
                    .user(user.id)
                    .tenant(ctx.tenant_id)
                    .client(&client.ip_address, &client.user_agent),
            )
            .await;

        tracing::info!(user_id = %user.id, revoked, "Password changed");
        Ok(())
    }

    /// Succeeds whether or not the email exists.
    pub async fn request_password_reset(
        &self,
        email: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);

        if !self.reset_limiter.allow(&email) {
            return Err(AuthError::RateLimitExceeded {
                retry_after: self.reset_limiter.retry_after_secs(&email),
            });
        }

        let Some(user) = self.repos.users.find_by_email(&email).await? else {
            self.audit
                .record(
                    AuthEvent::new(AuthEventType::PasswordResetRequested)
                        .client(&client.ip_address, &client.user_agent)
                        .meta("email", email.as_str())
                        .meta("found", false),
                )
                .await;
            return Ok(());
        };

        let (plain, digest) = self.passwords.generate_reset_token();
        let token = PasswordResetToken::new(user.id, digest, self.reset_token_ttl);
        self.repos.reset_tokens.create(&token).await?;

        self.audit
            .record(
                AuthEvent::new(AuthEventType::PasswordResetRequested)
                    .user(user.id)
                    .client(&client.ip_address, &client.user_agent)
                    .meta("found", true),
            )
            .await;

        if let Err(e) = self.notifier.send_reset_token(&user, &plain).await {
            tracing::error!(error = %e, user_id = %user.id, "Failed to deliver password reset token");
        }

        Ok(())
    }

    pub async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        self.passwords.validate_password(new_password)?;

        let digest = self.passwords.hash_reset_token(token);
        let reset = self
            .repos
            .reset_tokens
            .find_by_token_hash(&digest)
            .await?
            .ok_or(AuthError::PasswordResetInvalid)?;

        match reset.state() {
            ResetTokenState::Used => return Err(AuthError::PasswordResetUsed),
            ResetTokenState::Expired => return Err(AuthError::PasswordResetExpired),
            ResetTokenState::Usable => {}
        }

        let mut user = self
            .repos
            .users
            .find_by_id(reset.user_id)
            .await?
            .ok_or(AuthError::PasswordResetInvalid)?;
        let password_hash = self.passwords.hash(new_password)?;

        // Claim the token before touching the password; a concurrent
        // redemption loses here.
        match self.repos.reset_tokens.mark_used(reset.id).await {
            Ok(()) => {}
            Err(RepoError::Conflict(_)) => return Err(AuthError::PasswordResetUsed),
            Err(e) => return Err(e.into()),
        }

        user.password_hash = password_hash;
        user.must_reset_password = false;
        user.touch();
        self.repos.users.update(&user).await?;

        let revoked = self.repos.sessions.revoke_all_for_user(user.id).await?;

        self.audit
            .record(
                AuthEvent::new(AuthEventType::PasswordResetCompleted)
                    .user(user.id)
                    .client(&client.ip_address, &client.user_agent),
            )
            .await;

        tracing::info!(user_id = %user.id, revoked, "Password reset completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{Fixture, PASSWORD};
    use crate::models::Tenant;
    use crate::services::{LoginRequest, LoginResponse};

    fn client() -> ClientInfo {
        ClientInfo::new("10.0.0.9", "test-agent")
    }

    fn ctx(user: &User, tenant: &Tenant, role: Role) -> AuthContext {
        AuthContext {
            user_id: user.id,
            tenant_id: tenant.id,
            role,
            email: user.email.clone(),
            token_id: Uuid::new_v4(),
        }
    }

    fn create(email: &str, role: Role) -> CreateUserRequest {
        CreateUserRequest {
            email: email.into(),
            first_name: "New".into(),
            last_name: "Hire".into(),
            role,
        }
    }

    async fn login(fx: &Fixture, email: &str, password: &str) -> Result<LoginResponse, AuthError> {
        fx.auth
            .login(
                LoginRequest {
                    email: email.into(),
                    password: password.into(),
                    tenant_id: None,
                },
                &client(),
            )
            .await
    }

    #[tokio::test]
    async fn test_manager_creates_waiter_who_can_log_in() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        let manager = fx.user("boss@example.com", &[(&tenant, Role::Manager)]).await;
        let caller = ctx(&manager, &tenant, Role::Manager);

        let created = fx
            .users
            .create(&caller, create(" Pablo@Example.com", Role::Waiter), &client())
            .await
            .unwrap();

        assert_eq!(created.user.email, "pablo@example.com");
        assert!(created.user.must_reset_password);
        fx.passwords
            .validate_password(&created.temporary_password)
            .unwrap();

        let res = login(&fx, "pablo@example.com", &created.temporary_password)
            .await
            .unwrap();
        assert_eq!(res.role, Role::Waiter);
        assert!(res.user.must_reset_password);

        for role in [Role::Manager, Role::Admin, Role::Owner] {
            let err = fx
                .users
                .create(&caller, create("other@example.com", role), &client())
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::CannotAssignRole));
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_email() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        let owner = fx.user("owner@example.com", &[(&tenant, Role::Owner)]).await;

        let err = fx
            .users
            .create(
                &ctx(&owner, &tenant, Role::Owner),
                create("OWNER@example.com", Role::Viewer),
                &client(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailExists));
    }

    #[tokio::test]
    async fn test_partial_update_and_deactivation_revokes_sessions() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        let admin = fx.user("admin@example.com", &[(&tenant, Role::Admin)]).await;
        let waiter = fx.user("w@example.com", &[(&tenant, Role::Waiter)]).await;
        let tokens = login(&fx, "w@example.com", PASSWORD).await.unwrap().tokens;
        let caller = ctx(&admin, &tenant, Role::Admin);

        let updated = fx
            .users
            .update(
                &caller,
                waiter.id,
                UpdateUserRequest {
                    first_name: Some("Walter".into()),
                    ..Default::default()
                },
                &client(),
            )
            .await
            .unwrap();
        assert_eq!(updated.user.first_name, "Walter");
        assert_eq!(updated.user.last_name, waiter.last_name);
        assert!(updated.user.is_active);

        fx.users
            .update(
                &caller,
                waiter.id,
                UpdateUserRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
                &client(),
            )
            .await
            .unwrap();

        assert!(fx.auth.refresh(&tokens.refresh_token, &client()).await.is_err());
        let disabled = fx
            .repos
            .events
            .find_by_type(AuthEventType::AccountDisabled, 0, 10)
            .await
            .unwrap();
        assert_eq!(disabled.len(), 1);

        fx.users
            .update(
                &caller,
                waiter.id,
                UpdateUserRequest {
                    is_active: Some(true),
                    ..Default::default()
                },
                &client(),
            )
            .await
            .unwrap();
        let enabled = fx
            .repos
            .events
            .find_by_type(AuthEventType::AccountEnabled, 0, 10)
            .await
            .unwrap();
        assert_eq!(enabled.len(), 1);
    }

    #[tokio::test]
    async fn test_peers_cannot_update_each_other() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        let a = fx.user("a@example.com", &[(&tenant, Role::Manager)]).await;
        let b = fx.user("b@example.com", &[(&tenant, Role::Manager)]).await;

        let err = fx
            .users
            .update(
                &ctx(&a, &tenant, Role::Manager),
                b.id,
                UpdateUserRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
                &client(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CannotManageRole));
    }

    #[tokio::test]
    async fn test_update_cannot_reach_members_of_other_tenants() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        let other = fx.tenant("Cafe Dos").await;
        let manager = fx.user("m@example.com", &[(&tenant, Role::Manager)]).await;
        let owner = fx.user("o@example.com", &[(&other, Role::Owner)]).await;
        login(&fx, "o@example.com", PASSWORD).await.unwrap();

        let err = fx
            .users
            .update(
                &ctx(&manager, &tenant, Role::Manager),
                owner.id,
                UpdateUserRequest {
                    first_name: Some("Changed".into()),
                    is_active: Some(false),
                    ..Default::default()
                },
                &client(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        let stored = fx.repos.users.find_by_id(owner.id).await.unwrap().unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.first_name, owner.first_name);
        assert_eq!(
            fx.repos.sessions.count_active_for_user(owner.id).await.unwrap(),
            1
        );

        // Users without any membership can still be edited.
        let orphan = fx.user("x@example.com", &[]).await;
        let updated = fx
            .users
            .update(
                &ctx(&manager, &tenant, Role::Manager),
                orphan.id,
                UpdateUserRequest {
                    first_name: Some("Found".into()),
                    ..Default::default()
                },
                &client(),
            )
            .await
            .unwrap();
        assert_eq!(updated.user.first_name, "Found");
    }

    #[tokio::test]
    async fn test_update_role_checks_both_roles() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        let manager = fx.user("m@example.com", &[(&tenant, Role::Manager)]).await;
        let admin = fx.user("a@example.com", &[(&tenant, Role::Admin)]).await;
        let waiter = fx.user("w@example.com", &[(&tenant, Role::Waiter)]).await;
        let caller = ctx(&manager, &tenant, Role::Manager);

        let promoted = fx
            .users
            .update_role(&caller, waiter.id, Role::Cashier, &client())
            .await
            .unwrap();
        assert_eq!(promoted.role, Some(Role::Cashier));

        let err = fx
            .users
            .update_role(&caller, waiter.id, Role::Manager, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CannotAssignRole));

        let err = fx
            .users
            .update_role(&caller, admin.id, Role::Viewer, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CannotManageRole));

        let outsider = fx.user("x@example.com", &[]).await;
        let err = fx
            .users
            .update_role(&caller, outsider.id, Role::Viewer, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotInTenant));

        let events = fx
            .repos
            .events
            .find_by_type(AuthEventType::RoleChanged, 0, 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata["old_role"], "waiter");
        assert_eq!(events[0].metadata["new_role"], "cashier");
    }

    #[tokio::test]
    async fn test_list_and_get_are_tenant_scoped() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        let other = fx.tenant("Cafe Dos").await;
        for i in 0..3 {
            fx.user(&format!("u{i}@example.com"), &[(&tenant, Role::Waiter)])
                .await;
        }
        let stranger = fx.user("s@example.com", &[(&other, Role::Owner)]).await;

        let page = fx.users.list(tenant.id, Some(1), Some(2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.users.len(), 2);
        assert_eq!(page.total_pages, 2);
        assert!(page.users.iter().all(|u| u.role == Some(Role::Waiter)));

        let defaults = fx.users.list(tenant.id, Some(0), Some(500)).await.unwrap();
        assert_eq!(defaults.page, 1);
        assert_eq!(defaults.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(defaults.users.len(), 3);

        let err = fx.users.get(tenant.id, stranger.id).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
        assert_eq!(
            fx.users.get(other.id, stranger.id).await.unwrap().role,
            Some(Role::Owner)
        );
    }

    #[tokio::test]
    async fn test_change_password_revokes_all_sessions() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        let user = fx.user("ana@example.com", &[(&tenant, Role::Waiter)]).await;
        let first = login(&fx, "ana@example.com", PASSWORD).await.unwrap().tokens;
        let second = login(&fx, "ana@example.com", PASSWORD).await.unwrap().tokens;
        let caller = ctx(&user, &tenant, Role::Waiter);

        let err = fx
            .users
            .change_password(
                &caller,
                ChangePasswordRequest {
                    current_password: "Nope1234".into(),
                    new_password: "Brand1New".into(),
                },
                &client(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PasswordIncorrect));

        let err = fx
            .users
            .change_password(
                &caller,
                ChangePasswordRequest {
                    current_password: PASSWORD.into(),
                    new_password: "weak".into(),
                },
                &client(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PasswordWeak(_)));

        fx.users
            .change_password(
                &caller,
                ChangePasswordRequest {
                    current_password: PASSWORD.into(),
                    new_password: "Brand1New".into(),
                },
                &client(),
            )
            .await
            .unwrap();

        for tokens in [first, second] {
            assert!(fx.auth.refresh(&tokens.refresh_token, &client()).await.is_err());
        }
        assert!(matches!(
            login(&fx, "ana@example.com", PASSWORD).await.unwrap_err(),
            AuthError::InvalidCredentials
        ));
        assert!(login(&fx, "ana@example.com", "Brand1New").await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_request_is_silent_for_unknown_email() {
        let fx = Fixture::new();
        fx.users
            .request_password_reset("ghost@example.com", &client())
            .await
            .unwrap();
        assert!(fx.notifier.last_token().is_none());

        let events = fx
            .repos
            .events
            .find_by_type(AuthEventType::PasswordResetRequested, 0, 10)
            .await
            .unwrap();
        assert_eq!(events[0].metadata["found"], false);
    }

    #[tokio::test]
    async fn test_reset_request_is_rate_limited_per_email() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        fx.user("ana@example.com", &[(&tenant, Role::Waiter)]).await;

        fx.users
            .request_password_reset("ana@example.com", &client())
            .await
            .unwrap();
        let err = fx
            .users
            .request_password_reset("ANA@example.com", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_full_reset_flow_is_single_use() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        fx.user("ana@example.com", &[(&tenant, Role::Waiter)]).await;
        let old = login(&fx, "ana@example.com", PASSWORD).await.unwrap().tokens;

        fx.users
            .request_password_reset("ana@example.com", &client())
            .await
            .unwrap();
        let token = fx.notifier.last_token().unwrap();

        let err = fx
            .users
            .complete_password_reset(&token, "short", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PasswordWeak(_)));

        fx.users
            .complete_password_reset(&token, "Reset1Done", &client())
            .await
            .unwrap();

        assert!(fx.auth.refresh(&old.refresh_token, &client()).await.is_err());
        let res = login(&fx, "ana@example.com", "Reset1Done").await.unwrap();
        assert!(!res.user.must_reset_password);

        let err = fx
            .users
            .complete_password_reset(&token, "Again1Reset", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PasswordResetUsed));

        let err = fx
            .users
            .complete_password_reset("not-a-token", "Again1Reset", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PasswordResetInvalid));
    }

    #[tokio::test]
    async fn test_used_and_expired_token_reports_used() {
        let fx = Fixture::new();
        let tenant = fx.tenant("Cafe Uno").await;
        let user = fx.user("ana@example.com", &[(&tenant, Role::Waiter)]).await;

        let expired = PasswordResetToken::new(
            user.id,
            fx.passwords.hash_reset_token("expired"),
            Duration::seconds(-5),
        );
        fx.repos.reset_tokens.create(&expired).await.unwrap();
        let err = fx
            .users
            .complete_password_reset("expired", "Reset1Done", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PasswordResetExpired));

        fx.repos.reset_tokens.mark_used(expired.id).await.unwrap();
        let err = fx
            .users
            .complete_password_reset("expired", "Reset1Done", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PasswordResetUsed));
    }
}

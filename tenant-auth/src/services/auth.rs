use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    normalize_email, AuthEvent, AuthEventType, Claims, Role, Session, Tenant, TenantMembership,
    TokenPair, User,
};
use crate::repositories::{RepoError, Repositories};
use crate::services::{
    error::{AuthError, TenantOption},
    AuditRecorder, PasswordService, RateLimiter, TokenService,
};

const DEFAULT_EVENT_RETENTION_DAYS: i64 = 90;

/// Network origin of a request, recorded on sessions and audit events.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Identity resolved from a validated access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    pub email: String,
    pub token_id: Uuid,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            role: claims.role,
            email: claims.email,
            token_id: claims.jti,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Required when the user belongs to more than one tenant.
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub tokens: TokenPair,
    pub user: User,
    pub tenant: Tenant,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub user: User,
    pub tenant: Tenant,
    pub role: Role,
    pub memberships: Vec<TenantMembership>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: u64,
    pub reset_tokens: u64,
    pub events: u64,
}

/// Login, refresh rotation and logout.
#[derive(Clone)]
pub struct AuthService {
    repos: Repositories,
    tokens: TokenService,
    passwords: PasswordService,
    login_limiter: Arc<dyn RateLimiter>,
    audit: AuditRecorder,
    event_retention: Duration,
}

impl AuthService {
    pub fn new(
        repos: Repositories,
        tokens: TokenService,
        passwords: PasswordService,
        login_limiter: Arc<dyn RateLimiter>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            repos,
            tokens,
            passwords,
            login_limiter,
            audit,
            event_retention: Duration::days(DEFAULT_EVENT_RETENTION_DAYS),
        }
    }

    pub fn with_event_retention(mut self, retention: Duration) -> Self {
        self.event_retention = retention;
        self
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn login(
        &self,
        req: LoginRequest,
        client: &ClientInfo,
    ) -> Result<LoginResponse, AuthError> {
        let email = normalize_email(&req.email);

        // Rate limit by IP
        if !self.login_limiter.allow(&client.ip_address) {
            let retry_after = self.login_limiter.retry_after_secs(&client.ip_address);
            self.login_failed(None, client, "rate_limit_exceeded", Some(&email))
                .await;
            return Err(AuthError::RateLimitExceeded { retry_after });
        }

        let Some(found) = self.repos.users.find_by_email_with_tenants(&email).await? else {
            self.login_failed(None, client, "user_not_found", Some(&email))
                .await;
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .passwords
            .verify(&req.password, &found.user.password_hash)?
        {
            self.login_failed(Some(found.user.id), client, "invalid_password", None)
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        if !found.user.is_active {
            self.login_failed(Some(found.user.id), client, "account_disabled", None)
                .await;
            return Err(AuthError::AccountDisabled);
        }

        // Resolve which tenant this session belongs to
        let membership = match (found.memberships.as_slice(), req.tenant_id) {
            ([], _) => {
                self.login_failed(Some(found.user.id), client, "no_tenant", None)
                    .await;
                return Err(AuthError::UserNotInTenant);
            }
            ([only], _) => only.clone(),
            (_, Some(tenant_id)) => match found.membership(tenant_id) {
                Some(m) => m.clone(),
                None => return Err(AuthError::UserNotInTenant),
            },
            (all, None) => {
                return Err(AuthError::TenantRequired(
                    all.iter().map(TenantOption::from).collect(),
                ));
            }
        };

        let tenant = self
            .repos
            .tenants
            .find_by_id(membership.tenant.id)
            .await?
            .ok_or(AuthError::TenantNotFound)?;

        if !tenant.is_operational() {
            self.login_failed(Some(found.user.id), client, "tenant_inactive", None)
                .await;
            return Err(AuthError::TenantInactive);
        }

        let user = found.user;
        let (tokens, refresh_hash) =
            self.tokens
                .generate_token_pair(&user, tenant.id, membership.role)?;

        let session = Session::new(
            user.id,
            tenant.id,
            refresh_hash,
            &client.user_agent,
            &client.ip_address,
            self.tokens.refresh_token_ttl(),
        );
        self.repos.sessions.create(&session).await?;

        self.audit
            .record(
                AuthEvent::new(AuthEventType::LoginSuccess)
                    .user(user.id)
                    .tenant(tenant.id)
                    .client(&client.ip_address, &client.user_agent),
            )
            .await;

        tracing::info!(
            user_id = %user.id,
            tenant_id = %tenant.id,
            session_id = %session.id,
            role = %membership.role,
            "User logged in"
        );

        Ok(LoginResponse {
            tokens,
            user,
            tenant,
            role: membership.role,
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is spent.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, AuthError> {
        let token_hash = self.passwords.hash_refresh_token(refresh_token);

        let session = self
            .repos
            .sessions
            .find_by_token_hash(&token_hash)
            .await?
            .ok_or(AuthError::RefreshTokenInvalid)?;

        if session.is_revoked() {
            tracing::warn!(
                session_id = %session.id,
                user_id = %session.user_id,
                ip = %client.ip_address,
                "Revoked refresh token presented"
            );
            return Err(AuthError::SessionRevoked);
        }
        if session.is_expired() {
            return Err(AuthError::TokenExpired);
        }

        let found = self
            .repos
            .users
            .find_by_id_with_tenants(session.user_id)
            .await?
            .ok_or(AuthError::RefreshTokenInvalid)?;

        if !found.user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        // Current role, not the one granted at login
        let membership = found
            .membership(session.tenant_id)
            .ok_or(AuthError::UserNotInTenant)?;
        if !membership.tenant.is_operational() {
            return Err(AuthError::TenantInactive);
        }
        let role = membership.role;

        let (tokens, refresh_hash) =
            self.tokens
                .generate_token_pair(&found.user, session.tenant_id, role)?;

        let replacement = Session::new(
            found.user.id,
            session.tenant_id,
            refresh_hash,
            &client.user_agent,
            &client.ip_address,
            self.tokens.refresh_token_ttl(),
        );

        match self.repos.sessions.rotate(session.id, &replacement).await {
            Ok(()) => {}
            Err(RepoError::Conflict(_)) => return Err(AuthError::SessionRevoked),
            Err(e) => return Err(e.into()),
        }

        self.audit
            .record(
                AuthEvent::new(AuthEventType::TokenRefresh)
                    .user(found.user.id)
                    .tenant(session.tenant_id)
                    .client(&client.ip_address, &client.user_agent),
            )
            .await;

        tracing::debug!(
            old_session_id = %session.id,
            session_id = %replacement.id,
            "Session rotated"
        );

        Ok(tokens)
    }

    /// Idempotent: unknown or already revoked tokens succeed.
    pub async fn logout(&self, refresh_token: &str, client: &ClientInfo) -> Result<(), AuthError> {
        let token_hash = self.passwords.hash_refresh_token(refresh_token);

        let Some(session) = self.repos.sessions.find_by_token_hash(&token_hash).await? else {
            return Ok(());
        };
        if session.is_revoked() {
            return Ok(());
        }

        self.repos.sessions.revoke(session.id).await?;

        self.audit
            .record(
                AuthEvent::new(AuthEventType::Logout)
                    .user(session.user_id)
                    .tenant(session.tenant_id)
                    .client(&client.ip_address, &client.user_agent),
            )
            .await;

        Ok(())
    }

    /// Revoke every live session of the user. Returns how many were revoked.
    pub async fn logout_all(&self, user_id: Uuid, client: &ClientInfo) -> Result<u64, AuthError> {
        let revoked = self.repos.sessions.revoke_all_for_user(user_id).await?;

        self.audit
            .record(
                AuthEvent::new(AuthEventType::SessionRevoked)
                    .user(user_id)
                    .client(&client.ip_address, &client.user_agent)
                    .meta("scope", "all_sessions")
                    .meta("count", revoked),
            )
            .await;

        tracing::info!(user_id = %user_id, revoked, "All sessions revoked");
        Ok(revoked)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.tokens.validate_token(token)
    }

    pub async fn me(&self, ctx: &AuthContext) -> Result<Profile, AuthError> {
        let found = self
            .repos
            .users
            .find_by_id_with_tenants(ctx.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let current = found
            .membership(ctx.tenant_id)
            .cloned()
            .ok_or(AuthError::UserNotInTenant)?;

        Ok(Profile {
            user: found.user,
            tenant: current.tenant,
            role: current.role,
            memberships: found.memberships,
        })
    }

    /// Delete expired sessions and reset tokens, and events past retention.
    /// Meant to be driven by an external scheduler.
    pub async fn purge_expired(&self) -> Result<PurgeReport, AuthError> {
        let report = PurgeReport {
            sessions: self.repos.sessions.delete_expired().await?,
            reset_tokens: self.repos.reset_tokens.delete_expired().await?,
            events: self
                .repos
                .events
                .delete_older_than(Utc::now() - self.event_retention)
                .await?,
        };

        tracing::info!(
            sessions = report.sessions,
            reset_tokens = report.reset_tokens,
            events = report.events,
            "Purged expired auth records"
        );
        Ok(report)
    }

    async fn login_failed(
        &self,
        user_id: Option<Uuid>,
        client: &ClientInfo,
        reason: &'static str,
        email: Option<&str>,
    ) {
        let mut event = AuthEvent::new(AuthEventType::LoginFailed)
            .client(&client.ip_address, &client.user_agent)
            .meta("reason", reason);
        if let Some(user_id) = user_id {
            event = event.user(user_id);
        }
        if let Some(email) = email {
            event = event.meta("email", email);
        }

        tracing::info!(user_id = ?user_id, ip = %client.ip_address, reason, "Login failed");
        self.audit.record(event).await;
    }
}

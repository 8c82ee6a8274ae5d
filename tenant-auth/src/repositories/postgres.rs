//! PostgreSQL implementation of the repository contracts.
//!
//! Uses sqlx runtime queries; rows are mapped into domain models here so the
//! models stay free of persistence concerns.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::{
    AuthEventRepository, PasswordResetRepository, RepoError, SessionRepository,
    TenantRepository, UserRepository, UserTenantRoleRepository,
};
use crate::models::{
    AuthEvent, AuthEventType, PasswordResetToken, Role, Session, Tenant, TenantMembership, User,
    UserTenantRole, UserWithTenants,
};

/// PostgreSQL store wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_memberships(&self, user_id: Uuid) -> Result<Vec<TenantMembership>, RepoError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT t.id, t.name, t.slug, t.is_active, t.created_at, t.updated_at, r.role
            FROM user_tenant_roles r
            JOIN tenants t ON t.id = r.tenant_id
            WHERE r.user_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn unique_conflict(err: sqlx::Error, what: &str) -> RepoError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepoError::Conflict(format!("{} already exists", what))
        }
        _ => RepoError::Database(err),
    }
}

fn parse_role(value: &str) -> Result<Role, RepoError> {
    value
        .parse()
        .map_err(|e| RepoError::Internal(anyhow!("corrupt role column: {}", e)))
}

// ==================== Row types ====================

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    is_active: bool,
    must_reset_password: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            first_name: r.first_name,
            last_name: r.last_name,
            is_active: r.is_active,
            must_reset_password: r.must_reset_password,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(FromRow)]
struct TenantRow {
    id: Uuid,
    name: String,
    slug: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TenantRow> for Tenant {
    fn from(r: TenantRow) -> Self {
        Tenant {
            id: r.id,
            name: r.name,
            slug: r.slug,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MembershipRow {
    #[sqlx(flatten)]
    tenant: TenantRow,
    role: String,
}

impl TryFrom<MembershipRow> for TenantMembership {
    type Error = RepoError;

    fn try_from(r: MembershipRow) -> Result<Self, Self::Error> {
        Ok(TenantMembership {
            role: parse_role(&r.role)?,
            tenant: r.tenant.into(),
        })
    }
}

#[derive(FromRow)]
struct RoleRow {
    id: Uuid,
    user_id: Uuid,
    tenant_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RoleRow> for UserTenantRole {
    type Error = RepoError;

    fn try_from(r: RoleRow) -> Result<Self, Self::Error> {
        Ok(UserTenantRole {
            id: r.id,
            user_id: r.user_id,
            tenant_id: r.tenant_id,
            role: parse_role(&r.role)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    tenant_id: Uuid,
    refresh_token_hash: String,
    user_agent: String,
    ip_address: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for Session {
    fn from(r: SessionRow) -> Self {
        Session {
            id: r.id,
            user_id: r.user_id,
            tenant_id: r.tenant_id,
            refresh_token_hash: r.refresh_token_hash,
            user_agent: r.user_agent,
            ip_address: r.ip_address,
            created_at: r.created_at,
            expires_at: r.expires_at,
            revoked_at: r.revoked_at,
        }
    }
}

#[derive(FromRow)]
struct ResetTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}

impl From<ResetTokenRow> for PasswordResetToken {
    fn from(r: ResetTokenRow) -> Self {
        PasswordResetToken {
            id: r.id,
            user_id: r.user_id,
            token_hash: r.token_hash,
            created_at: r.created_at,
            expires_at: r.expires_at,
            used_at: r.used_at,
        }
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    user_id: Option<Uuid>,
    tenant_id: Option<Uuid>,
    event_type: String,
    ip_address: String,
    user_agent: String,
    metadata: Json<Map<String, Value>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for AuthEvent {
    type Error = RepoError;

    fn try_from(r: EventRow) -> Result<Self, Self::Error> {
        let event_type: AuthEventType = r
            .event_type
            .parse()
            .map_err(|e: String| RepoError::Internal(anyhow!(e)))?;
        Ok(AuthEvent {
            id: r.id,
            user_id: r.user_id,
            tenant_id: r.tenant_id,
            event_type,
            ip_address: r.ip_address,
            user_agent: r.user_agent,
            metadata: r.metadata.0,
            created_at: r.created_at,
        })
    }
}

fn events(rows: Vec<EventRow>) -> Result<Vec<AuthEvent>, RepoError> {
    rows.into_iter().map(TryInto::try_into).collect()
}

// ==================== Users ====================

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_id_with_tenants(
        &self,
        id: Uuid,
    ) -> Result<Option<UserWithTenants>, RepoError> {
        let Some(user) = UserRepository::find_by_id(self, id).await? else {
            return Ok(None);
        };
        let memberships = self.load_memberships(user.id).await?;
        Ok(Some(UserWithTenants { user, memberships }))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_email_with_tenants(
        &self,
        email: &str,
    ) -> Result<Option<UserWithTenants>, RepoError> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };
        let memberships = self.load_memberships(user.id).await?;
        Ok(Some(UserWithTenants { user, memberships }))
    }

    async fn create(&self, user: &User) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, is_active, must_reset_password, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.must_reset_password)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "email"))?;
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, first_name = $4, last_name = $5,
                is_active = $6, must_reset_password = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.must_reset_password)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "email"))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound("user"));
        }
        Ok(())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepoError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<User>, i64), RepoError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_tenant_roles WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.* FROM users u
            JOIN user_tenant_roles r ON r.user_id = u.id
            WHERE r.tenant_id = $1
            ORDER BY u.created_at, u.id
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }
}

// ==================== Sessions ====================

#[async_trait]
impl SessionRepository for PgStore {
    async fn create(&self, session: &Session) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, tenant_id, refresh_token_hash, user_agent, ip_address, created_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.tenant_id)
        .bind(&session.refresh_token_hash)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.revoked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "session"))?;
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, RepoError> {
        let row =
            sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE refresh_token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn revoke(&self, id: Uuid) -> Result<(), RepoError> {
        let result =
            sqlx::query("UPDATE sessions SET revoked_at = COALESCE(revoked_at, $2) WHERE id = $1")
                .bind(id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound("session"));
        }
        Ok(())
    }

    async fn rotate(&self, old_id: Uuid, replacement: &Session) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            "UPDATE sessions SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(old_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepoError::Conflict("session already revoked".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, tenant_id, refresh_token_hash, user_agent, ip_address, created_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL)
            "#,
        )
        .bind(replacement.id)
        .bind(replacement.user_id)
        .bind(replacement.tenant_id)
        .bind(&replacement.refresh_token_hash)
        .bind(&replacement.user_agent)
        .bind(&replacement.ip_address)
        .bind(replacement.created_at)
        .bind(replacement.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_conflict(e, "session"))?;

        tx.commit().await?;
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn revoke_all_for_user_in_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = $3 WHERE user_id = $1 AND tenant_id = $2 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_active_for_user(&self, user_id: Uuid) -> Result<i64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

// ==================== Tenants ====================

#[async_trait]
impl TenantRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, RepoError> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, RepoError> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn create(&self, tenant: &Tenant) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, slug, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.is_active)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "tenant slug"))?;
        Ok(())
    }

    async fn update(&self, tenant: &Tenant) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE tenants SET name = $2, slug = $3, is_active = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.is_active)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "tenant slug"))?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound("tenant"));
        }
        Ok(())
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool, RepoError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM tenants WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

// ==================== Tenant roles ====================

#[async_trait]
impl UserTenantRoleRepository for PgStore {
    async fn find_by_user_and_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<UserTenantRole>, RepoError> {
        let row = sqlx::query_as::<_, RoleRow>(
            "SELECT * FROM user_tenant_roles WHERE user_id = $1 AND tenant_id = $2",
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create(&self, binding: &UserTenantRole) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO user_tenant_roles (id, user_id, tenant_id, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(binding.id)
        .bind(binding.user_id)
        .bind(binding.tenant_id)
        .bind(binding.role.as_str())
        .bind(binding.created_at)
        .bind(binding.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "tenant role"))?;
        Ok(())
    }

    async fn update(&self, binding: &UserTenantRole) -> Result<(), RepoError> {
        let result =
            sqlx::query("UPDATE user_tenant_roles SET role = $2, updated_at = $3 WHERE id = $1")
                .bind(binding.id)
                .bind(binding.role.as_str())
                .bind(binding.updated_at)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound("user tenant role"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM user_tenant_roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_user_and_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM user_tenant_roles WHERE user_id = $1 AND tenant_id = $2")
            .bind(user_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<UserTenantRole>, RepoError> {
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT * FROM user_tenant_roles WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<UserTenantRole>, RepoError> {
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT * FROM user_tenant_roles WHERE tenant_id = $1 ORDER BY created_at",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// ==================== Password reset tokens ====================

#[async_trait]
impl PasswordResetRepository for PgStore {
    async fn create(&self, token: &PasswordResetToken) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, created_at, expires_at, used_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "reset token"))?;
        Ok(())
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, RepoError> {
        let row = sqlx::query_as::<_, ResetTokenRow>(
            "SELECT * FROM password_reset_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn mark_used(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE password_reset_tokens SET used_at = $2 WHERE id = $1 AND used_at IS NULL",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict("reset token already used".to_string()));
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_recent_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM password_reset_tokens WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

// ==================== Auth events ====================

#[async_trait]
impl AuthEventRepository for PgStore {
    async fn create(&self, event: &AuthEvent) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO auth_events (id, user_id, tenant_id, event_type, ip_address, user_agent, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.tenant_id)
        .bind(event.event_type.as_str())
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(Json(&event.metadata))
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, RepoError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM auth_events WHERE user_id = $1 ORDER BY created_at DESC OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        events(rows)
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, RepoError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM auth_events WHERE tenant_id = $1 ORDER BY created_at DESC OFFSET $2 LIMIT $3",
        )
        .bind(tenant_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        events(rows)
    }

    async fn find_by_type(
        &self,
        event_type: AuthEventType,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, RepoError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM auth_events WHERE event_type = $1 ORDER BY created_at DESC OFFSET $2 LIMIT $3",
        )
        .bind(event_type.as_str())
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        events(rows)
    }

    async fn find_by_user_and_type_since(
        &self,
        user_id: Uuid,
        event_type: AuthEventType,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuthEvent>, RepoError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT * FROM auth_events
            WHERE user_id = $1 AND event_type = $2 AND created_at >= $3
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(event_type.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        events(rows)
    }

    async fn count_recent_by_ip_and_type(
        &self,
        ip_address: &str,
        event_type: AuthEventType,
        since: DateTime<Utc>,
    ) -> Result<i64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM auth_events WHERE ip_address = $1 AND event_type = $2 AND created_at >= $3",
        )
        .bind(ip_address)
        .bind(event_type.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn delete_older_than(&self, before: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM auth_events WHERE created_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

//! Storage contracts consumed by the auth services.
//!
//! Every operation is async and cancellable by dropping the future. Two
//! implementations ship with the crate: [`memory::MemoryStore`] for
//! development and tests, and [`postgres::PgStore`] for deployments.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuthEvent, AuthEventType, PasswordResetToken, Session, Tenant, User, UserTenantRole,
    UserWithTenants,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    async fn find_by_id_with_tenants(&self, id: Uuid)
        -> Result<Option<UserWithTenants>, RepoError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    async fn find_by_email_with_tenants(
        &self,
        email: &str,
    ) -> Result<Option<UserWithTenants>, RepoError>;
    /// Fails with `Conflict` when the email is taken.
    async fn create(&self, user: &User) -> Result<(), RepoError>;
    async fn update(&self, user: &User) -> Result<(), RepoError>;
    async fn exists_by_email(&self, email: &str) -> Result<bool, RepoError>;
    /// Users holding a role in the tenant, ordered by creation, plus the total count.
    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<User>, i64), RepoError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), RepoError>;
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, RepoError>;
    /// Idempotent for already-revoked sessions.
    async fn revoke(&self, id: Uuid) -> Result<(), RepoError>;
    /// Revoke `old_id` and insert `replacement` as one unit. Fails with
    /// `Conflict` if `old_id` was already revoked, leaving nothing inserted.
    async fn rotate(&self, old_id: Uuid, replacement: &Session) -> Result<(), RepoError>;
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepoError>;
    async fn revoke_all_for_user_in_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<u64, RepoError>;
    async fn delete_expired(&self) -> Result<u64, RepoError>;
    async fn count_active_for_user(&self, user_id: Uuid) -> Result<i64, RepoError>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, RepoError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, RepoError>;
    async fn create(&self, tenant: &Tenant) -> Result<(), RepoError>;
    async fn update(&self, tenant: &Tenant) -> Result<(), RepoError>;
    async fn exists_by_slug(&self, slug: &str) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait UserTenantRoleRepository: Send + Sync {
    async fn find_by_user_and_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<UserTenantRole>, RepoError>;
    /// Fails with `Conflict` when the (user, tenant) pair already has a role.
    async fn create(&self, binding: &UserTenantRole) -> Result<(), RepoError>;
    async fn update(&self, binding: &UserTenantRole) -> Result<(), RepoError>;
    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;
    async fn delete_by_user_and_tenant(&self, user_id: Uuid, tenant_id: Uuid)
        -> Result<(), RepoError>;
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<UserTenantRole>, RepoError>;
    async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<UserTenantRole>, RepoError>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    async fn create(&self, token: &PasswordResetToken) -> Result<(), RepoError>;
    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, RepoError>;
    /// Claim the token. Fails with `Conflict` if it was already used.
    async fn mark_used(&self, id: Uuid) -> Result<(), RepoError>;
    async fn delete_expired(&self) -> Result<u64, RepoError>;
    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, RepoError>;
    async fn count_recent_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepoError>;
}

#[async_trait]
pub trait AuthEventRepository: Send + Sync {
    async fn create(&self, event: &AuthEvent) -> Result<(), RepoError>;
    /// Newest first.
    async fn find_by_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, RepoError>;
    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, RepoError>;
    async fn find_by_type(
        &self,
        event_type: AuthEventType,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, RepoError>;
    async fn find_by_user_and_type_since(
        &self,
        user_id: Uuid,
        event_type: AuthEventType,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuthEvent>, RepoError>;
    async fn count_recent_by_ip_and_type(
        &self,
        ip_address: &str,
        event_type: AuthEventType,
        since: DateTime<Utc>,
    ) -> Result<i64, RepoError>;
    async fn delete_older_than(&self, before: DateTime<Utc>) -> Result<u64, RepoError>;
}

/// The full set of stores the services depend on.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub tenants: Arc<dyn TenantRepository>,
    pub roles: Arc<dyn UserTenantRoleRepository>,
    pub reset_tokens: Arc<dyn PasswordResetRepository>,
    pub events: Arc<dyn AuthEventRepository>,
}

impl Repositories {
    /// All six contracts backed by one shared in-process store.
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(memory::MemoryStore::new()))
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_store(Arc::new(postgres::PgStore::new(pool)))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository
            + SessionRepository
            + TenantRepository
            + UserTenantRoleRepository
            + PasswordResetRepository
            + AuthEventRepository
            + 'static,
    {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            tenants: store.clone(),
            roles: store.clone(),
            reset_tokens: store.clone(),
            events: store,
        }
    }
}

//! In-process store implementing every repository contract.
//!
//! All tables live behind a single mutex, so compound operations such as
//! session rotation are atomic.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    AuthEventRepository, PasswordResetRepository, RepoError, SessionRepository,
    TenantRepository, UserRepository, UserTenantRoleRepository,
};
use crate::models::{
    AuthEvent, AuthEventType, PasswordResetToken, Session, Tenant, TenantMembership, User,
    UserTenantRole, UserWithTenants,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tenants: HashMap<Uuid, Tenant>,
    roles: HashMap<Uuid, UserTenantRole>,
    sessions: HashMap<Uuid, Session>,
    reset_tokens: HashMap<Uuid, PasswordResetToken>,
    events: Vec<AuthEvent>,
}

impl Tables {
    fn with_tenants(&self, user: &User) -> UserWithTenants {
        let mut memberships: Vec<TenantMembership> = self
            .roles
            .values()
            .filter(|r| r.user_id == user.id)
            .filter_map(|r| {
                self.tenants.get(&r.tenant_id).map(|t| TenantMembership {
                    tenant: t.clone(),
                    role: r.role,
                })
            })
            .collect();
        memberships.sort_by(|a, b| a.tenant.name.cmp(&b.tenant.name));
        UserWithTenants {
            user: user.clone(),
            memberships,
        }
    }

    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepoError> {
        self.tables
            .lock()
            .map_err(|_| RepoError::Internal(anyhow!("memory store mutex poisoned")))
    }
}

fn page<T: Clone>(items: Vec<&T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_by_id_with_tenants(
        &self,
        id: Uuid,
    ) -> Result<Option<UserWithTenants>, RepoError> {
        let tables = self.lock()?;
        Ok(tables.users.get(&id).map(|u| tables.with_tenants(u)))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        Ok(self.lock()?.user_by_email(email).cloned())
    }

    async fn find_by_email_with_tenants(
        &self,
        email: &str,
    ) -> Result<Option<UserWithTenants>, RepoError> {
        let tables = self.lock()?;
        Ok(tables.user_by_email(email).map(|u| tables.with_tenants(u)))
    }

    async fn create(&self, user: &User) -> Result<(), RepoError> {
        let mut tables = self.lock()?;
        if tables.user_by_email(&user.email).is_some() {
            return Err(RepoError::Conflict(format!("email {} exists", user.email)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), RepoError> {
        let mut tables = self.lock()?;
        match tables.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(RepoError::NotFound("user")),
        }
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepoError> {
        Ok(self.lock()?.user_by_email(email).is_some())
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<User>, i64), RepoError> {
        let tables = self.lock()?;
        let mut members: Vec<&User> = tables
            .roles
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .filter_map(|r| tables.users.get(&r.user_id))
            .collect();
        members.sort_by_key(|u| (u.created_at, u.id));
        let total = members.len() as i64;
        Ok((page(members, offset, limit), total))
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create(&self, session: &Session) -> Result<(), RepoError> {
        self.lock()?.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, RepoError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .find(|s| s.refresh_token_hash == token_hash)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, RepoError> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    async fn revoke(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.lock()?;
        let session = tables
            .sessions
            .get_mut(&id)
            .ok_or(RepoError::NotFound("session"))?;
        session.revoke();
        Ok(())
    }

    async fn rotate(&self, old_id: Uuid, replacement: &Session) -> Result<(), RepoError> {
        let mut tables = self.lock()?;
        let old = tables
            .sessions
            .get_mut(&old_id)
            .ok_or(RepoError::NotFound("session"))?;
        if old.is_revoked() {
            return Err(RepoError::Conflict("session already revoked".to_string()));
        }
        old.revoke();
        tables.sessions.insert(replacement.id, replacement.clone());
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let mut tables = self.lock()?;
        let mut count = 0;
        for session in tables.sessions.values_mut() {
            if session.user_id == user_id && !session.is_revoked() {
                session.revoke();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn revoke_all_for_user_in_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<u64, RepoError> {
        let mut tables = self.lock()?;
        let mut count = 0;
        for session in tables.sessions.values_mut() {
            if session.user_id == user_id && session.tenant_id == tenant_id && !session.is_revoked()
            {
                session.revoke();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_expired(&self) -> Result<u64, RepoError> {
        let mut tables = self.lock()?;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| !s.is_expired());
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn count_active_for_user(&self, user_id: Uuid) -> Result<i64, RepoError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_valid())
            .count() as i64)
    }
}

#[async_trait]
impl TenantRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, RepoError> {
        Ok(self.lock()?.tenants.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, RepoError> {
        Ok(self
            .lock()?
            .tenants
            .values()
            .find(|t| t.slug == slug)
            .cloned())
    }

    async fn create(&self, tenant: &Tenant) -> Result<(), RepoError> {
        let mut tables = self.lock()?;
        if tables.tenants.values().any(|t| t.slug == tenant.slug) {
            return Err(RepoError::Conflict(format!("slug {} exists", tenant.slug)));
        }
        tables.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn update(&self, tenant: &Tenant) -> Result<(), RepoError> {
        let mut tables = self.lock()?;
        match tables.tenants.get_mut(&tenant.id) {
            Some(existing) => {
                *existing = tenant.clone();
                Ok(())
            }
            None => Err(RepoError::NotFound("tenant")),
        }
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool, RepoError> {
        Ok(self.lock()?.tenants.values().any(|t| t.slug == slug))
    }
}

#[async_trait]
impl UserTenantRoleRepository for MemoryStore {
    async fn find_by_user_and_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<UserTenantRole>, RepoError> {
        Ok(self
            .lock()?
            .roles
            .values()
            .find(|r| r.user_id == user_id && r.tenant_id == tenant_id)
            .cloned())
    }

    async fn create(&self, binding: &UserTenantRole) -> Result<(), RepoError> {
        let mut tables = self.lock()?;
        if tables
            .roles
            .values()
            .any(|r| r.user_id == binding.user_id && r.tenant_id == binding.tenant_id)
        {
            return Err(RepoError::Conflict(
                "user already has a role in tenant".to_string(),
            ));
        }
        tables.roles.insert(binding.id, binding.clone());
        Ok(())
    }

    async fn update(&self, binding: &UserTenantRole) -> Result<(), RepoError> {
        let mut tables = self.lock()?;
        match tables.roles.get_mut(&binding.id) {
            Some(existing) => {
                *existing = binding.clone();
                Ok(())
            }
            None => Err(RepoError::NotFound("user tenant role")),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.lock()?.roles.remove(&id);
        Ok(())
    }

    async fn delete_by_user_and_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<(), RepoError> {
        self.lock()?
            .roles
            .retain(|_, r| !(r.user_id == user_id && r.tenant_id == tenant_id));
        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<UserTenantRole>, RepoError> {
        Ok(self
            .lock()?
            .roles
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<UserTenantRole>, RepoError> {
        Ok(self
            .lock()?
            .roles
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PasswordResetRepository for MemoryStore {
    async fn create(&self, token: &PasswordResetToken) -> Result<(), RepoError> {
        self.lock()?.reset_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, RepoError> {
        Ok(self
            .lock()?
            .reset_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn mark_used(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.lock()?;
        let token = tables
            .reset_tokens
            .get_mut(&id)
            .ok_or(RepoError::NotFound("password reset token"))?;
        if token.is_used() {
            return Err(RepoError::Conflict("reset token already used".to_string()));
        }
        token.used_at = Some(Utc::now());
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, RepoError> {
        let mut tables = self.lock()?;
        let before = tables.reset_tokens.len();
        tables.reset_tokens.retain(|_, t| !t.is_expired());
        Ok((before - tables.reset_tokens.len()) as u64)
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let mut tables = self.lock()?;
        let before = tables.reset_tokens.len();
        tables.reset_tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - tables.reset_tokens.len()) as u64)
    }

    async fn count_recent_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepoError> {
        Ok(self
            .lock()?
            .reset_tokens
            .values()
            .filter(|t| t.user_id == user_id && t.created_at >= since)
            .count() as i64)
    }
}

#[async_trait]
impl AuthEventRepository for MemoryStore {
    async fn create(&self, event: &AuthEvent) -> Result<(), RepoError> {
        self.lock()?.events.push(event.clone());
        Ok(())
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, RepoError> {
        let tables = self.lock()?;
        let matching = tables
            .events
            .iter()
            .rev()
            .filter(|e| e.user_id == Some(user_id))
            .collect();
        Ok(page(matching, offset, limit))
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, RepoError> {
        let tables = self.lock()?;
        let matching = tables
            .events
            .iter()
            .rev()
            .filter(|e| e.tenant_id == Some(tenant_id))
            .collect();
        Ok(page(matching, offset, limit))
    }

    async fn find_by_type(
        &self,
        event_type: AuthEventType,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuthEvent>, RepoError> {
        let tables = self.lock()?;
        let matching = tables
            .events
            .iter()
            .rev()
            .filter(|e| e.event_type == event_type)
            .collect();
        Ok(page(matching, offset, limit))
    }

    async fn find_by_user_and_type_since(
        &self,
        user_id: Uuid,
        event_type: AuthEventType,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuthEvent>, RepoError> {
        Ok(self
            .lock()?
            .events
            .iter()
            .rev()
            .filter(|e| {
                e.user_id == Some(user_id) && e.event_type == event_type && e.created_at >= since
            })
            .cloned()
            .collect())
    }

    async fn count_recent_by_ip_and_type(
        &self,
        ip_address: &str,
        event_type: AuthEventType,
        since: DateTime<Utc>,
    ) -> Result<i64, RepoError> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|e| {
                e.ip_address == ip_address && e.event_type == event_type && e.created_at >= since
            })
            .count() as i64)
    }

    async fn delete_older_than(&self, before: DateTime<Utc>) -> Result<u64, RepoError> {
        let mut tables = self.lock()?;
        let count = tables.events.len();
        tables.events.retain(|e| e.created_at >= before);
        Ok((count - tables.events.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::repositories::Repositories;
    use chrono::Duration;

    async fn seeded() -> (Repositories, User, Tenant) {
        let repos = Repositories::in_memory();
        let tenant = Tenant::new("Cafe Uno", "cafe-uno");
        let user = User::new("ana@example.com", "hash".into(), "Ana".into(), "Diaz".into());
        repos.tenants.create(&tenant).await.unwrap();
        repos.users.create(&user).await.unwrap();
        repos
            .roles
            .create(&UserTenantRole::new(user.id, tenant.id, Role::Waiter))
            .await
            .unwrap();
        (repos, user, tenant)
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (repos, _, _) = seeded().await;
        let dup = User::new("ANA@example.com", "h".into(), "A".into(), "B".into());
        assert!(matches!(
            repos.users.create(&dup).await,
            Err(RepoError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_find_with_tenants_joins_memberships() {
        let (repos, user, tenant) = seeded().await;
        let found = repos
            .users
            .find_by_email_with_tenants("ana@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user.id, user.id);
        assert_eq!(found.memberships.len(), 1);
        assert_eq!(found.memberships[0].tenant.id, tenant.id);
        assert_eq!(found.memberships[0].role, Role::Waiter);
    }

    #[tokio::test]
    async fn test_duplicate_role_binding_conflicts() {
        let (repos, user, tenant) = seeded().await;
        let again = UserTenantRole::new(user.id, tenant.id, Role::Cashier);
        assert!(matches!(
            repos.roles.create(&again).await,
            Err(RepoError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_rotate_refuses_revoked_session() {
        let (repos, user, tenant) = seeded().await;
        let old = Session::new(user.id, tenant.id, "a".into(), "ua", "ip", Duration::days(1));
        repos.sessions.create(&old).await.unwrap();

        let first = Session::new(user.id, tenant.id, "b".into(), "ua", "ip", Duration::days(1));
        repos.sessions.rotate(old.id, &first).await.unwrap();

        let second = Session::new(user.id, tenant.id, "c".into(), "ua", "ip", Duration::days(1));
        assert!(matches!(
            repos.sessions.rotate(old.id, &second).await,
            Err(RepoError::Conflict(_))
        ));
        assert!(repos
            .sessions
            .find_by_token_hash("c")
            .await
            .unwrap()
            .is_none());
        assert_eq!(repos.sessions.count_active_for_user(user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_revoke_all_counts_only_live_sessions() {
        let (repos, user, tenant) = seeded().await;
        for hash in ["a", "b", "c"] {
            let s = Session::new(user.id, tenant.id, hash.into(), "ua", "ip", Duration::days(1));
            repos.sessions.create(&s).await.unwrap();
        }
        let first = repos.sessions.find_by_token_hash("a").await.unwrap().unwrap();
        repos.sessions.revoke(first.id).await.unwrap();

        assert_eq!(repos.sessions.revoke_all_for_user(user.id).await.unwrap(), 2);
        assert_eq!(repos.sessions.count_active_for_user(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tenant_scoped_revoke_leaves_other_tenants_live() {
        let (repos, user, tenant) = seeded().await;
        let other = Tenant::new("Bar Dos", "bar-dos");
        repos.tenants.create(&other).await.unwrap();
        repos
            .roles
            .create(&UserTenantRole::new(user.id, other.id, Role::Manager))
            .await
            .unwrap();

        for (hash, t) in [("a", &tenant), ("b", &tenant), ("c", &other)] {
            let s = Session::new(user.id, t.id, hash.into(), "ua", "ip", Duration::days(1));
            repos.sessions.create(&s).await.unwrap();
        }

        let revoked = repos
            .sessions
            .revoke_all_for_user_in_tenant(user.id, tenant.id)
            .await
            .unwrap();
        assert_eq!(revoked, 2);
        let survivor = repos.sessions.find_by_token_hash("c").await.unwrap().unwrap();
        assert!(!survivor.is_revoked());
        assert_eq!(repos.sessions.count_active_for_user(user.id).await.unwrap(), 1);

        let memberships = repos.roles.list_by_user(user.id).await.unwrap();
        assert_eq!(memberships.len(), 2);
        assert!(memberships.iter().any(|r| r.tenant_id == other.id && r.role == Role::Manager));
    }

    #[tokio::test]
    async fn test_reset_token_counts_and_deletes_per_user() {
        let (repos, user, _) = seeded().await;
        let stranger = User::new("bo@example.com", "h".into(), "Bo".into(), "X".into());
        repos.users.create(&stranger).await.unwrap();

        let since = Utc::now() - Duration::minutes(15);
        let mut stale = PasswordResetToken::new(user.id, "stale".into(), Duration::hours(1));
        stale.created_at = since - Duration::seconds(1);
        let mut edge = PasswordResetToken::new(user.id, "edge".into(), Duration::hours(1));
        edge.created_at = since;
        let fresh = PasswordResetToken::new(user.id, "fresh".into(), Duration::hours(1));
        let theirs = PasswordResetToken::new(stranger.id, "theirs".into(), Duration::hours(1));
        for token in [&stale, &edge, &fresh, &theirs] {
            repos.reset_tokens.create(token).await.unwrap();
        }

        assert_eq!(
            repos.reset_tokens.count_recent_for_user(user.id, since).await.unwrap(),
            2
        );
        assert_eq!(repos.reset_tokens.delete_for_user(user.id).await.unwrap(), 3);
        assert!(repos
            .reset_tokens
            .find_by_token_hash("fresh")
            .await
            .unwrap()
            .is_none());
        assert!(repos
            .reset_tokens
            .find_by_token_hash("theirs")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_mark_used_is_single_shot() {
        let (repos, user, _) = seeded().await;
        let token = PasswordResetToken::new(user.id, "hash".into(), Duration::hours(1));
        repos.reset_tokens.create(&token).await.unwrap();

        repos.reset_tokens.mark_used(token.id).await.unwrap();
        assert!(matches!(
            repos.reset_tokens.mark_used(token.id).await,
            Err(RepoError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_housekeeping_deletes() {
        let (repos, user, tenant) = seeded().await;
        let live = Session::new(user.id, tenant.id, "a".into(), "ua", "ip", Duration::days(1));
        let dead = Session::new(user.id, tenant.id, "b".into(), "ua", "ip", Duration::seconds(-1));
        repos.sessions.create(&live).await.unwrap();
        repos.sessions.create(&dead).await.unwrap();
        assert_eq!(repos.sessions.delete_expired().await.unwrap(), 1);

        let mut old_event = AuthEvent::new(AuthEventType::Logout).user(user.id);
        old_event.created_at = Utc::now() - Duration::days(400);
        repos.events.create(&old_event).await.unwrap();
        repos
            .events
            .create(&AuthEvent::new(AuthEventType::Logout).user(user.id))
            .await
            .unwrap();
        let cutoff = Utc::now() - Duration::days(365);
        assert_eq!(repos.events.delete_older_than(cutoff).await.unwrap(), 1);
        assert_eq!(repos.events.find_by_user(user.id, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_tenant_paginates() {
        let (repos, _, tenant) = seeded().await;
        for i in 0..4 {
            let u = User::new(&format!("u{}@example.com", i), "h".into(), "U".into(), "X".into());
            repos.users.create(&u).await.unwrap();
            repos
                .roles
                .create(&UserTenantRole::new(u.id, tenant.id, Role::Viewer))
                .await
                .unwrap();
        }

        let (first, total) = repos.users.list_by_tenant(tenant.id, 0, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(first.len(), 2);
        let (last, _) = repos.users.list_by_tenant(tenant.id, 4, 2).await.unwrap();
        assert_eq!(last.len(), 1);
    }
}

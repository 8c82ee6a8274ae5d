//! Shared fixtures for service unit tests.

use chrono::Duration;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    AuditRecorder, AuthService, HashParams, KeyManager, PasswordService, RateLimitPolicy,
    ResetNotifier, SlidingWindowLimiter, TokenConfig, TokenService, UserService,
};
use crate::models::{Role, Tenant, User, UserTenantRole};
use crate::repositories::Repositories;

const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/jwt_private.pem");
const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/jwt_public.pem");

pub const PASSWORD: &str = "Correct1Horse";

pub fn passwords() -> PasswordService {
    PasswordService::with_params(HashParams {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        output_len: 32,
    })
    .unwrap()
}

pub fn tokens() -> TokenService {
    let keys = KeyManager::new("key-1");
    keys.load_private_key_pem(PRIVATE_PEM).unwrap();
    keys.load_public_key_pem(PUBLIC_PEM).unwrap();
    TokenService::new(
        Arc::new(keys),
        TokenConfig {
            issuer: "solobueno-erp".into(),
            audience: vec!["solobueno-api".into()],
            access_token_ttl: Duration::minutes(60),
            refresh_token_ttl: Duration::days(30),
        },
    )
}

/// Records every token handed out for delivery.
#[derive(Default)]
pub struct CapturingNotifier {
    pub sent: Mutex<Vec<(uuid::Uuid, String)>>,
}

impl CapturingNotifier {
    pub fn last_token(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, t)| t.clone())
    }
}

#[async_trait]
impl ResetNotifier for CapturingNotifier {
    async fn send_reset_token(&self, user: &User, token: &str) -> Result<(), anyhow::Error> {
        self.sent.lock().unwrap().push((user.id, token.to_string()));
        Ok(())
    }
}

pub struct Fixture {
    pub repos: Repositories,
    pub auth: AuthService,
    pub users: UserService,
    pub notifier: Arc<CapturingNotifier>,
    pub passwords: PasswordService,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_login_policy(RateLimitPolicy::login())
    }

    pub fn with_login_policy(policy: RateLimitPolicy) -> Self {
        let repos = Repositories::in_memory();
        let passwords = passwords();
        let audit = AuditRecorder::new(repos.events.clone());
        let notifier = Arc::new(CapturingNotifier::default());

        let auth = AuthService::new(
            repos.clone(),
            tokens(),
            passwords.clone(),
            Arc::new(SlidingWindowLimiter::new(policy)),
            audit.clone(),
        );
        let users = UserService::new(
            repos.clone(),
            passwords.clone(),
            Arc::new(SlidingWindowLimiter::new(RateLimitPolicy::password_reset())),
            notifier.clone(),
            audit,
            Duration::hours(1),
        );

        Self {
            repos,
            auth,
            users,
            notifier,
            passwords,
        }
    }

    pub async fn tenant(&self, name: &str) -> Tenant {
        let tenant = Tenant::new(name, name.to_lowercase().replace(' ', "-"));
        self.repos.tenants.create(&tenant).await.unwrap();
        tenant
    }

    /// Active user with [`PASSWORD`] and no pending reset.
    pub async fn user(&self, email: &str, memberships: &[(&Tenant, Role)]) -> User {
        let mut user = User::new(
            email,
            self.passwords.hash(PASSWORD).unwrap(),
            "Test".into(),
            "User".into(),
        );
        user.must_reset_password = false;
        self.repos.users.create(&user).await.unwrap();

        for (tenant, role) in memberships {
            self.repos
                .roles
                .create(&UserTenantRole::new(user.id, tenant.id, *role))
                .await
                .unwrap();
        }
        user
    }
}

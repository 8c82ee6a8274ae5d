//! Shared setup for tenant-auth HTTP tests.
//!
//! Every test gets its own in-memory store, fixture signing keys and cheap
//! Argon2 parameters, and drives the router with `oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use secrecy::Secret;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tenant_auth::{
    build_router,
    config::{AuthConfig, Environment, JwtConfig, RateLimitConfig, SecurityConfig},
    models::{Role, Tenant, User, UserTenantRole},
    repositories::Repositories,
    services::{HashParams, KeyManager, PasswordService, ResetNotifier},
    AppState,
};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const PRIVATE_KEY: &str = include_str!("../fixtures/jwt_private.pem");
pub const PUBLIC_KEY: &str = include_str!("../fixtures/jwt_public.pem");

pub const PASSWORD: &str = "Correct1Horse";
pub const DEFAULT_IP: &str = "203.0.113.10";

/// Keeps every token handed out for delivery.
#[derive(Default)]
pub struct CapturingNotifier {
    sent: Mutex<Vec<(Uuid, String)>>,
}

impl CapturingNotifier {
    pub fn last_token(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, token)| token.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ResetNotifier for CapturingNotifier {
    async fn send_reset_token(&self, user: &User, token: &str) -> Result<(), anyhow::Error> {
        self.sent.lock().unwrap().push((user.id, token.to_string()));
        Ok(())
    }
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "tenant-auth".into(),
        service_version: "test".into(),
        log_level: "error".into(),
        otlp_endpoint: None,
        database: None,
        jwt: JwtConfig {
            private_key: Secret::new(PRIVATE_KEY.to_string()),
            public_key: PUBLIC_KEY.to_string(),
            key_id: "key-1".into(),
            issuer: "solobueno-erp".into(),
            audience: vec!["solobueno-api".into()],
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".into()],
        },
        rate_limit: RateLimitConfig {
            global_ip_limit: 10_000,
            ..RateLimitConfig::default()
        },
        password_reset_token_ttl_minutes: 60,
        request_timeout_seconds: 30,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repos: Repositories,
    pub passwords: PasswordService,
    pub notifier: Arc<CapturingNotifier>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: AuthConfig) -> Self {
        let repos = Repositories::in_memory();
        let passwords = PasswordService::with_params(HashParams {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            output_len: 32,
        })
        .expect("Failed to build password service");
        let keys = Arc::new(KeyManager::from_config(&config.jwt).expect("Failed to load keys"));
        let notifier = Arc::new(CapturingNotifier::default());

        let state = AppState::new(
            config,
            repos.clone(),
            None,
            keys,
            passwords.clone(),
            notifier.clone(),
        );
        let router = build_router(state.clone()).expect("Failed to build router");

        Self {
            router,
            state,
            repos,
            passwords,
            notifier,
        }
    }

    pub async fn create_tenant(&self, name: &str) -> Tenant {
        let tenant = Tenant::new(name, name.to_lowercase().replace(' ', "-"));
        self.repos
            .tenants
            .create(&tenant)
            .await
            .expect("Failed to create tenant");
        tenant
    }

    /// Active user with [`PASSWORD`] bound to the given tenants.
    pub async fn create_user(&self, email: &str, memberships: &[(&Tenant, Role)]) -> User {
        let mut user = User::new(
            email,
            self.passwords.hash(PASSWORD).expect("Failed to hash"),
            "Test".into(),
            "User".into(),
        );
        user.must_reset_password = false;
        self.repos
            .users
            .create(&user)
            .await
            .expect("Failed to create user");

        for (tenant, role) in memberships {
            self.repos
                .roles
                .create(&UserTenantRole::new(user.id, tenant.id, *role))
                .await
                .expect("Failed to bind role");
        }
        user
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.request_from(DEFAULT_IP, method, uri, token, body).await
    }

    /// Send a request that appears to come from `ip` via `X-Forwarded-For`.
    pub async fn request_from(
        &self,
        ip: &str,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", ip)
            .header(header::USER_AGENT, "integration-test")
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn login(&self, email: &str, password: &str, tenant_id: Option<Uuid>) -> TestResponse {
        let mut body = serde_json::json!({ "email": email, "password": password });
        if let Some(tenant_id) = tenant_id {
            body["tenant_id"] = Value::String(tenant_id.to_string());
        }
        self.post("/auth/login", None, body).await
    }

    /// Log in and return `(access_token, refresh_token)`, panicking on failure.
    pub async fn login_tokens(&self, email: &str, tenant_id: Option<Uuid>) -> (String, String) {
        let res = self.login(email, PASSWORD, tenant_id).await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.body);
        (
            res.body["access_token"].as_str().unwrap().to_string(),
            res.body["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    pub async fn shutdown(&self) {
        self.state.limiters.shutdown().await;
    }
}

pub fn error_code(res: &TestResponse) -> &str {
    res.body["error"]["code"].as_str().unwrap_or_default()
}

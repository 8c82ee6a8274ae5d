pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{get, patch, post},
    Json, Router,
};
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::AuthConfig;
use crate::models::Role;
use crate::repositories::Repositories;
use crate::services::{
    AuditRecorder, AuthService, KeyManager, PasswordService, RateLimitPolicy, ResetNotifier,
    SlidingWindowLimiter, TokenConfig, TokenService, UserService,
};
use service_core::error::AppError;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::well_known::jwks,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::logout_all,
        handlers::auth::me,
        handlers::auth::change_password,
        handlers::auth::request_password_reset,
        handlers::auth::complete_password_reset,
        handlers::users::create_user,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::update_user,
        handlers::users::update_user_role,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::ErrorBody,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::RefreshRequest,
            dtos::auth::LogoutRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::PasswordResetRequest,
            dtos::auth::PasswordResetCompleteRequest,
            dtos::auth::MessageResponse,
            dtos::auth::TenantRoleInfo,
            dtos::auth::MeResponse,
            dtos::users::UserResponse,
            dtos::users::CreateUserRequest,
            dtos::users::CreateUserResponse,
            dtos::users::UpdateUserRequest,
            dtos::users::UpdateRoleRequest,
            dtos::users::Pagination,
            dtos::users::UserListResponse,
            models::Role,
            models::TokenPair,
            services::TenantOption,
            services::Jwk,
            services::Jwks,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, session rotation and password lifecycle"),
        (name = "Users", description = "Tenant user administration"),
        (name = "Well-Known", description = "Public service metadata"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Keyed limiters owned by the state so their sweep tasks can be stopped.
#[derive(Clone)]
pub struct Limiters {
    pub login: Arc<SlidingWindowLimiter>,
    pub password_reset: Arc<SlidingWindowLimiter>,
}

impl Limiters {
    pub fn from_config(config: &AuthConfig) -> Self {
        let limits = &config.rate_limit;
        Self {
            login: Arc::new(SlidingWindowLimiter::new(RateLimitPolicy::new(
                limits.login_attempts,
                Duration::from_secs(limits.login_window_seconds),
            ))),
            password_reset: Arc::new(SlidingWindowLimiter::new(RateLimitPolicy::new(
                limits.password_reset_attempts,
                Duration::from_secs(limits.password_reset_window_seconds),
            ))),
        }
    }

    pub async fn shutdown(&self) {
        self.login.shutdown().await;
        self.password_reset.shutdown().await;
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub db: Option<sqlx::PgPool>,
    pub auth: AuthService,
    pub users: UserService,
    pub keys: Arc<KeyManager>,
    pub limiters: Limiters,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire services over `repos`. Must be called inside a tokio runtime.
    pub fn new(
        config: AuthConfig,
        repos: Repositories,
        db: Option<sqlx::PgPool>,
        keys: Arc<KeyManager>,
        passwords: PasswordService,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        let limiters = Limiters::from_config(&config);
        let audit = AuditRecorder::new(repos.events.clone());
        let tokens = TokenService::new(keys.clone(), TokenConfig::from(&config.jwt));

        let auth = AuthService::new(
            repos.clone(),
            tokens,
            passwords.clone(),
            limiters.login.clone(),
            audit.clone(),
        );
        let users = UserService::new(
            repos,
            passwords,
            limiters.password_reset.clone(),
            notifier,
            audit,
            chrono::Duration::minutes(config.password_reset_token_ttl_minutes),
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Self {
            config,
            db,
            auth,
            users,
            keys,
            limiters,
            ip_rate_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let public_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .route(
            "/auth/password-reset/complete",
            post(handlers::auth::complete_password_reset),
        );

    let user_routes = Router::new()
        .route(
            "/users",
            post(handlers::users::create_user).get(handlers::users::list_users),
        )
        .route(
            "/users/:id",
            get(handlers::users::get_user).patch(handlers::users::update_user),
        )
        .route("/users/:id/role", patch(handlers::users::update_user_role))
        .layer(from_fn(|req: Request, next: Next| {
            middleware::require_role(Role::Manager, req, next)
        }));

    let authenticated_routes = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/change-password", post(handlers::auth::change_password))
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .merge(user_routes)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();
    let cors = cors_layer(&state.config)?;
    let timeout = Duration::from_secs(state.config.request_timeout_seconds);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/.well-known/jwks.json", get(handlers::well_known::jwks))
        .route("/.well-known/openapi.json", get(handlers::well_known::openapi))
        .merge(public_routes)
        .merge(authenticated_routes)
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        // Global IP flood guard
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}

fn cors_layer(config: &AuthConfig) -> Result<CorsLayer, AppError> {
    let allowed = &config.security.allowed_origins;
    let origin = if allowed.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_origins(allowed)?)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

fn parse_origins(allowed: &[String]) -> Result<Vec<HeaderValue>, AppError> {
    allowed
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid CORS origin '{}': {}", origin, e))
            })
        })
        .collect()
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let storage = match &state.db {
        Some(pool) => {
            db::health_check(pool).await.map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                AppError::ServiceUnavailable
            })?;
            "postgres"
        }
        None => "memory",
    };

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "storage": storage,
        }
    })))
}

use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::auth::{
        ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, MeResponse,
        MessageResponse, PasswordResetCompleteRequest, PasswordResetRequest, RefreshRequest,
    },
    middleware::{Client, CurrentUser},
    models::TokenPair,
    services::{self, metrics},
    utils::ValidatedJson,
    AppState,
};

const RESET_REQUESTED_MESSAGE: &str = "If the email exists, a password reset link has been sent";

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Tenant selection required or invalid tenant", body = crate::dtos::ErrorResponse),
        (status = 401, description = "Invalid credentials, disabled account or inactive tenant", body = crate::dtos::ErrorResponse),
        (status = 429, description = "Too many attempts from this address", body = crate::dtos::ErrorResponse),
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let result = state
        .auth
        .login(
            services::LoginRequest {
                email: req.email,
                password: req.password,
                tenant_id: req.tenant_id,
            },
            &client,
        )
        .await;

    metrics::record_login(result.as_ref().map_or_else(|e| e.kind(), |_| "success"));

    Ok(Json(result?.into()))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair; the presented refresh token is spent", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or revoked", body = crate::dtos::ErrorResponse),
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let result = state.auth.refresh(&req.refresh_token, &client).await;

    metrics::record_refresh(result.as_ref().map_or_else(|e| e.kind(), |_| "success"));

    Ok(Json(result?))
}

/// End the session behind a refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Logged out, also for unknown or already revoked tokens"),
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    Client(client): Client,
    Json(req): Json<LogoutRequest>,
) -> Result<StatusCode, AppError> {
    if !req.refresh_token.is_empty() {
        state.auth.logout(&req.refresh_token, &client).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke every session of the caller
#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 204, description = "All sessions revoked"),
        (status = 401, description = "Missing or invalid access token", body = crate::dtos::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn logout_all(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Client(client): Client,
) -> Result<StatusCode, AppError> {
    state.auth.logout_all(ctx.user_id, &client).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current user, tenant and memberships
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Profile of the authenticated user", body = MeResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::dtos::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Json<MeResponse>, AppError> {
    let profile = state.auth.me(&ctx).await?;
    Ok(Json(profile.into()))
}

/// Change the caller's password; signs out every session
#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Current password incorrect or new password too weak", body = crate::dtos::ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::dtos::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    state
        .users
        .change_password(
            &ctx,
            services::ChangePasswordRequest {
                current_password: req.current_password,
                new_password: req.new_password,
            },
            &client,
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Request a password reset token
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Accepted whether or not the email exists", body = MessageResponse),
        (status = 429, description = "A reset was requested for this email recently", body = crate::dtos::ErrorResponse),
    ),
    tag = "Authentication"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .users
        .request_password_reset(&req.email, &client)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: RESET_REQUESTED_MESSAGE.to_string(),
        }),
    ))
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/auth/password-reset/complete",
    request_body = PasswordResetCompleteRequest,
    responses(
        (status = 204, description = "Password reset; every session signed out"),
        (status = 400, description = "Token invalid, expired or used, or password too weak", body = crate::dtos::ErrorResponse),
    ),
    tag = "Authentication"
)]
pub async fn complete_password_reset(
    State(state): State<AppState>,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<PasswordResetCompleteRequest>,
) -> Result<StatusCode, AppError> {
    state
        .users
        .complete_password_reset(&req.token, &req.new_password, &client)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

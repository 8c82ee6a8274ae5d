use service_core::{
    axum::{
        async_trait,
        extract::{ConnectInfo, FromRequestParts, Request, State},
        http::{header, request::Parts},
        middleware::Next,
        response::Response,
    },
    error::AppError,
    middleware::rate_limit::client_ip,
};
use std::net::SocketAddr;

use crate::{
    models::Role,
    services::{AuthContext, AuthError, ClientInfo},
    AppState,
};

/// Validate the bearer access token and attach the resolved [`AuthContext`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthorized)?;

    let claims = state.auth.validate_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        e
    })?;

    req.extensions_mut().insert(AuthContext::from(claims));

    Ok(next.run(req).await)
}

/// Reject callers below `minimum`. Must run inside [`auth_middleware`].
pub async fn require_role(minimum: Role, req: Request, next: Next) -> Result<Response, AppError> {
    let ctx = req.extensions().get::<AuthContext>().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Auth context missing from request extensions"
        ))
    })?;

    if !ctx.role.is_at_least(minimum) {
        tracing::warn!(
            user_id = %ctx.user_id,
            tenant_id = %ctx.tenant_id,
            role = %ctx.role,
            required = %minimum,
            "Insufficient role"
        );
        return Err(AuthError::InsufficientRole.into());
    }

    Ok(next.run(req).await)
}

/// Extractor for the authenticated caller.
pub struct CurrentUser(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AuthError::Unauthorized.into())
    }
}

/// Extractor for the caller's address and user agent. Never rejects.
pub struct Client(pub ClientInfo);

#[async_trait]
impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let ip_address = client_ip(&parts.headers, peer).unwrap_or_else(|| "unknown".to_string());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        Ok(Client(ClientInfo::new(ip_address, user_agent)))
    }
}

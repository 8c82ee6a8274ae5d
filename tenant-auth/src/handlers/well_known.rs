use crate::{ApiDoc, AppState};
use service_core::{
    axum::{extract::State, http::header, response::IntoResponse, Json},
    error::AppError,
};
use utoipa::OpenApi;

/// Get JSON Web Key Set (JWKS)
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses(
        (status = 200, description = "Every key that may verify a live access token", body = crate::services::Jwks)
    ),
    tag = "Well-Known"
)]
pub async fn jwks(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let jwks = state.keys.jwks()?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(jwks),
    ))
}

pub async fn openapi() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

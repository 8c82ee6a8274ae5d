use service_core::{
    axum::{
        async_trait,
        extract::{FromRequest, FromRequestParts, Path, Request},
        http::request::Parts,
        Json,
    },
    error::{AppError, ErrorDetail},
};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::Validate;

/// JSON body that has passed `validator` checks.
///
/// Unparseable bodies are `invalid_request` (400); bodies that parse but fail
/// validation are `validation_error` (422).
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            AppError::BadRequest(
                ErrorDetail::new("invalid_request", "Invalid request body")
                    .with_details(e.body_text()),
            )
        })?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// A UUID path segment; anything else is `invalid_id`.
pub struct PathId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::bad_request("invalid_id", "Invalid ID"))?;

        raw.parse::<Uuid>()
            .map(PathId)
            .map_err(|_| AppError::bad_request("invalid_id", "Invalid ID"))
    }
}

pub mod auth;
pub mod users;

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::TenantOption;

/// Shape of every error body, for API docs.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "invalid_credentials")]
    pub code: String,
    #[schema(example = "Invalid email or password")]
    pub message: String,
    /// Seconds, on 429 responses
    pub retry_after: Option<u64>,
    /// Candidate tenants, on `tenant_required`
    pub tenants: Option<Vec<TenantOption>>,
    pub details: Option<String>,
}

//! HTTP handlers for the tenant auth service.

pub mod auth;
pub mod metrics;
pub mod users;
pub mod well_known;

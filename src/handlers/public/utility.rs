// handlers/public/utility.rs - Diagnostic endpoints under /api/v1

use serde::Serialize;
use tracing::error;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// GET /api/v1/version
pub async fn version() -> ApiResult<VersionInfo> {
    Ok(ApiResponse::success(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/v1/notfound - Always 404, used by clients to exercise error handling
pub async fn not_found() -> ApiResult<()> {
    Err(ApiError::not_found("Not found"))
}

/// GET /api/v1/boom - Always 500
pub async fn boom() -> ApiResult<()> {
    error!("Boom endpoint called");
    Err(ApiError::internal_server_error("Boom!"))
}

/// Fallback for unmatched routes
pub async fn fallback() -> ApiError {
    ApiError::not_found("Not found")
}

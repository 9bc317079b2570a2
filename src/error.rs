// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::api::permission::{ModelActionResults, PermissionResult};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 400 Bad Request carrying per-id outcomes of a bulk operation
    PartialFailure {
        message: String,
        results: ModelActionResults,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::PartialFailure { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::PartialFailure { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            ApiError::PartialFailure { message, results } => {
                json!({
                    "error": true,
                    "message": message,
                    "code": "PARTIAL_FAILURE",
                    "results": results
                })
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::PartialFailure { .. } => "PARTIAL_FAILURE",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn partial_failure(message: impl Into<String>, results: ModelActionResults) -> Self {
        ApiError::PartialFailure {
            message: message.into(),
            results,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<crate::database::DatabaseError> for ApiError {
    fn from(err: crate::database::DatabaseError) -> Self {
        use crate::database::DatabaseError;

        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Validation(errors) => {
                let message = errors
                    .values()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| "Validation failed".to_string());
                ApiError::validation_error(message, Some(errors))
            }
            DatabaseError::VersionConflict { collection, id } => ApiError::conflict(format!(
                "The {} '{}' was modified by another request. Reload and try again.",
                collection, id
            )),
            DatabaseError::DuplicateDocument(msg) => ApiError::conflict(msg),
            DatabaseError::Filter(e) => e.into(),
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Storage misconfigured: {}", err);
                ApiError::service_unavailable("Storage temporarily unavailable")
            }
            DatabaseError::Serialization(e) => {
                tracing::error!("Document serialization error: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            DatabaseError::QueryError(msg) => {
                // Don't expose internal storage errors to clients
                tracing::error!("Database query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<crate::json_patch::PatchError> for ApiError {
    fn from(err: crate::json_patch::PatchError) -> Self {
        use crate::json_patch::PatchError;

        match err {
            PatchError::InvalidDocument(_) | PatchError::InvalidOperation(_) => {
                ApiError::invalid_json(err.to_string())
            }
            _ => ApiError::bad_request(err.to_string()),
        }
    }
}

impl From<crate::filter::error::FilterError> for ApiError {
    fn from(err: crate::filter::error::FilterError) -> Self {
        tracing::debug!("Rejected search filter: {}", err);
        ApiError::bad_request("An error has occurred. Please check your search filter.")
    }
}

impl From<crate::queue::QueueError> for ApiError {
    fn from(err: crate::queue::QueueError) -> Self {
        tracing::error!("Queue error: {}", err);
        ApiError::service_unavailable("Background processing temporarily unavailable")
    }
}

impl From<crate::services::oauth::OAuthError> for ApiError {
    fn from(err: crate::services::oauth::OAuthError) -> Self {
        use crate::services::oauth::OAuthError;

        match err {
            OAuthError::ProviderNotConfigured(_) => ApiError::not_found("Not found"),
            other => {
                tracing::warn!("OAuth provider error: {}", other);
                ApiError::bad_request("Unable to get user info.")
            }
        }
    }
}

impl From<crate::services::organization_service::MembershipError> for ApiError {
    fn from(err: crate::services::organization_service::MembershipError) -> Self {
        use crate::services::organization_service::MembershipError;

        match err {
            MembershipError::Database(e) => e.into(),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

impl From<crate::mail::MailError> for ApiError {
    fn from(err: crate::mail::MailError) -> Self {
        use crate::mail::MailError;

        match err {
            MailError::Queue(e) => e.into(),
            other => {
                tracing::error!("Mail error: {}", other);
                ApiError::internal_server_error("Unable to send email")
            }
        }
    }
}

impl From<PermissionResult> for ApiError {
    fn from(permission: PermissionResult) -> Self {
        let message = permission
            .message
            .clone()
            .unwrap_or_else(|| "Permission denied".to_string());

        match permission.status_code {
            401 => ApiError::unauthorized(message),
            403 => ApiError::forbidden(message),
            404 => ApiError::not_found(message),
            _ => ApiError::bad_request(message),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

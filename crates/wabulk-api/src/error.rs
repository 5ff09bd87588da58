//! Error to HTTP mapping

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;
use wabulk_common::{Error, ErrorSeverity};

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. `VALIDATION_ERROR`
    pub error_code: String,
    /// Human-readable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub http_status: u16,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Convert a domain error into a response, hiding internal details
pub fn api_error(err: Error) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let message = match &err {
        Error::Validation(msg) | Error::NotFound(msg) | Error::Unauthorized(msg) => msg.clone(),
        Error::Conflict { message, .. } | Error::BusinessLogic { message, .. } => message.clone(),
        Error::ExternalService(_) => "External service unavailable".to_string(),
        Error::Timeout(_) => "Operation timed out".to_string(),
        Error::Config(_) | Error::Database(_) | Error::Internal(_) | Error::Other(_) => {
            "Internal server error".to_string()
        }
    };

    match err.severity() {
        ErrorSeverity::Low => {}
        ErrorSeverity::Medium => warn!(code = err.code(), error = %err, "Request rejected"),
        ErrorSeverity::High | ErrorSeverity::Critical => {
            error!(code = err.code(), error = %err, "Request failed")
        }
    }

    (
        status,
        Json(ErrorResponse {
            error_code: err.code().to_string(),
            message,
            description: None,
            http_status: status.as_u16(),
        }),
    )
}

/// A 400 response for malformed input caught before reaching the services
pub fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(Error::Validation(message.into()))
}

//! Error types for WaBulk

use serde::Serialize;
use thiserror::Error;

/// Stable conflict codes
pub const CAMPAIGN_ALREADY_RUNNING: &str = "CAMPAIGN_ALREADY_RUNNING";
pub const NON_CANCELLABLE_STATE: &str = "NON_CANCELLABLE_STATE";
pub const NON_STARTABLE_STATE: &str = "NON_STARTABLE_STATE";

/// Main error type for WaBulk
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict { code: &'static str, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Business rule violated: {message}")]
    BusinessLogic { message: String, retryable: bool },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for WaBulk
pub type Result<T> = std::result::Result<T, Error>;

/// How loudly an error should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "low"),
            ErrorSeverity::Medium => write!(f, "medium"),
            ErrorSeverity::High => write!(f, "high"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

impl Error {
    pub fn campaign_already_running() -> Self {
        Error::Conflict {
            code: CAMPAIGN_ALREADY_RUNNING,
            message: "campaign already running".to_string(),
        }
    }

    pub fn non_cancellable(status: impl std::fmt::Display) -> Self {
        Error::Conflict {
            code: NON_CANCELLABLE_STATE,
            message: format!("campaign cannot be cancelled in status {}", status),
        }
    }

    pub fn non_startable(status: impl std::fmt::Display) -> Self {
        Error::Conflict {
            code: NON_STARTABLE_STATE,
            message: format!("campaign cannot be started in status {}", status),
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Conflict { .. } => 409,
            Error::Unauthorized(_) => 401,
            Error::ExternalService(_) => 502,
            Error::Database(_) => 500,
            Error::Timeout(_) => 504,
            Error::BusinessLogic { .. } => 422,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict { code, .. } => code,
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::BusinessLogic { .. } => "BUSINESS_LOGIC_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Error::Validation(_) | Error::NotFound(_) => ErrorSeverity::Low,
            Error::Conflict { .. } | Error::Unauthorized(_) | Error::BusinessLogic { .. } => {
                ErrorSeverity::Medium
            }
            Error::ExternalService(_) | Error::Timeout(_) | Error::Database(_) => ErrorSeverity::High,
            Error::Config(_) | Error::Internal(_) | Error::Other(_) => ErrorSeverity::Critical,
        }
    }

    /// Whether repeating the failed operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ExternalService(_) | Error::Timeout(_) | Error::Database(_) => true,
            Error::BusinessLogic { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Whether the message is safe to show to API clients
    pub fn is_client_facing(&self) -> bool {
        self.status_code() < 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Validation("x".into()).status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::campaign_already_running().status_code(), 409);
        assert_eq!(Error::ExternalService("x".into()).status_code(), 502);
        assert_eq!(Error::Timeout("x".into()).status_code(), 504);
    }

    #[test]
    fn test_conflict_codes() {
        assert_eq!(Error::campaign_already_running().code(), CAMPAIGN_ALREADY_RUNNING);
        assert_eq!(Error::non_cancellable("finished").code(), NON_CANCELLABLE_STATE);
        assert_eq!(
            Error::non_cancellable("finished").to_string(),
            "Conflict: campaign cannot be cancelled in status finished"
        );
    }

    #[test]
    fn test_retryable_and_severity() {
        let err = Error::BusinessLogic {
            message: "quota".into(),
            retryable: true,
        };
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(!Error::Validation("x".into()).is_retryable());
        assert_eq!(Error::Internal("x".into()).severity(), ErrorSeverity::Critical);
        assert!(!Error::Internal("x".into()).is_client_facing());
    }
}

//! Outbound WhatsApp gateway
//!
//! The engine talks to the provider only through [`MessageGateway`]. A send
//! either returns an outcome (successful or not) or an error; the dispatcher
//! treats both failure shapes the same way and never retries.

mod settings_aware;
mod whatsgate;

pub use settings_aware::SettingsAwareGateway;
pub use whatsgate::WhatsgateClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use wabulk_common::{Media, Result};

/// Outcome of a single send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub phone_number: String,
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SendOutcome {
    pub fn sent(phone_number: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            success: true,
            message_id,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(phone_number: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            success: false,
            message_id: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Result of probing the gateway credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConnectionTestResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// One-shot message delivery through a WhatsApp provider
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send_text(&self, phone: &str, body: &str, async_send: bool) -> Result<SendOutcome>;

    /// Send `media` with `body` as its caption
    async fn send_media(
        &self,
        phone: &str,
        body: &str,
        media: &Media,
        async_send: bool,
    ) -> Result<SendOutcome>;

    async fn test_connection(&self) -> Result<ConnectionTestResult>;
}

/// Substrings of errors worth another attempt
const RETRYABLE_MARKERS: &[&str] = &[
    "network error",
    "timeout",
    "connection refused",
    "server error",
    "temporary failure",
];

pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error = error.to_lowercase();
    RETRYABLE_MARKERS.iter().any(|marker| error.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("network error: connection reset"));
        assert!(is_retryable_error("server error: API returned HTTP 503 - busy"));
        assert!(is_retryable_error("request Timeout"));
        assert!(!is_retryable_error("unauthorized: invalid credentials"));
        assert!(!is_retryable_error("file size exceeds limit: 20 bytes"));
    }
}

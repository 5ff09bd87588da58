//! WhatsGate HTTP client

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use wabulk_common::config::GatewayConfig;
use wabulk_common::{Error, Media, MessageType, PhoneNumber, Result, WhatsgateSettings};

use super::{is_retryable_error, ConnectionTestResult, MessageGateway, SendOutcome};

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    #[serde(rename = "WhatsappID")]
    whatsapp_id: &'a str,
    #[serde(rename = "async")]
    async_send: bool,
    recipient: Recipient<'a>,
    message: MessageBody<'a>,
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    number: &'a str,
}

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    #[serde(rename = "type")]
    kind: MessageType,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaBody<'a>>,
}

#[derive(Debug, Serialize)]
struct MediaBody<'a> {
    mimetype: &'a str,
    data: String,
    filename: &'a str,
}

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    #[serde(rename = "WhatsappID")]
    whatsapp_id: &'a str,
    number: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    id: Option<serde_json::Value>,
}

impl SendResponse {
    fn message_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
            serde_json::Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    data: bool,
}

/// Client for the WhatsGate REST API
pub struct WhatsgateClient {
    http: Client,
    base_url: String,
    api_key: String,
    whatsapp_id: String,
    retry_attempts: u32,
    retry_delay: Duration,
    max_file_size: usize,
    check_number: String,
}

impl WhatsgateClient {
    pub fn new(settings: &WhatsgateSettings, config: &GatewayConfig) -> Result<Self> {
        settings.validate()?;

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            whatsapp_id: settings.whatsapp_id.clone(),
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay(),
            max_file_size: config.max_file_size,
            check_number: config.check_number.clone(),
        })
    }

    async fn send_with_retry(&self, phone: &str, request: &SendRequest<'_>) -> SendOutcome {
        let mut attempt = 0;
        loop {
            let outcome = self.send_once(phone, request).await;
            let retryable = !outcome.success
                && outcome.error.as_deref().is_some_and(is_retryable_error);
            if !retryable || attempt >= self.retry_attempts {
                return outcome;
            }

            attempt += 1;
            warn!(
                phone = %phone,
                attempt,
                error = ?outcome.error,
                "WhatsGate send failed, retrying"
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn send_once(&self, phone: &str, request: &SendRequest<'_>) -> SendOutcome {
        let (status, body) = match self.post("send", request).await {
            Ok(response) => response,
            Err(error) => return SendOutcome::failed(phone, error),
        };

        if status == StatusCode::OK {
            let message_id = serde_json::from_str::<SendResponse>(&body)
                .ok()
                .and_then(|r| r.message_id());
            debug!(phone = %phone, message_id = ?message_id, "WhatsGate accepted message");
            return SendOutcome::sent(phone, message_id);
        }

        let parsed: SendResponse = serde_json::from_str(&body).unwrap_or_default();
        SendOutcome::failed(phone, describe_http_error(status, &body, &parsed))
    }

    async fn check_once(&self) -> ConnectionTestResult {
        let request = CheckRequest {
            whatsapp_id: &self.whatsapp_id,
            number: &self.check_number,
        };

        let (status, body) = match self.post("check", &request).await {
            Ok(response) => response,
            Err(error) => return ConnectionTestResult::failed(error),
        };

        if status != StatusCode::OK {
            let parsed: SendResponse = serde_json::from_str(&body).unwrap_or_default();
            return ConnectionTestResult::failed(describe_http_error(status, &body, &parsed));
        }

        match serde_json::from_str::<CheckResponse>(&body) {
            Ok(check) if check.result == "success" && check.data => ConnectionTestResult::ok(),
            Ok(check) => {
                ConnectionTestResult::failed(format!("Connection test failed: {}", check.result))
            }
            Err(_) => ConnectionTestResult::failed("failed to decode response"),
        }
    }

    /// POST a JSON body, returning status and raw body or a transport error
    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> std::result::Result<(StatusCode, String), String> {
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .header("X-Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("network error: timeout: {}", e)
                } else {
                    format!("network error: {}", e)
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read response: {}", e))?;
        Ok((status, body))
    }
}

fn describe_http_error(status: StatusCode, body: &str, parsed: &SendResponse) -> String {
    if status == StatusCode::UNAUTHORIZED {
        "unauthorized: invalid credentials".to_string()
    } else if status.is_server_error() {
        format!(
            "server error: API returned HTTP {} - {}",
            status.as_u16(),
            body
        )
    } else {
        format!(
            "API client error: HTTP {}. Status: {}. Message: {}",
            status.as_u16(),
            parsed.status.as_deref().unwrap_or_default(),
            parsed.message.as_deref().unwrap_or_default()
        )
    }
}

#[async_trait]
impl MessageGateway for WhatsgateClient {
    async fn send_text(&self, phone: &str, body: &str, async_send: bool) -> Result<SendOutcome> {
        let number = match PhoneNumber::parse(phone) {
            Ok(number) => number,
            Err(_) => {
                return Ok(SendOutcome::failed(
                    phone,
                    format!("invalid phone number: {}", phone),
                ))
            }
        };
        if body.trim().is_empty() {
            return Ok(SendOutcome::failed(phone, "message cannot be empty"));
        }

        let request = SendRequest {
            whatsapp_id: &self.whatsapp_id,
            async_send,
            recipient: Recipient {
                number: number.as_str(),
            },
            message: MessageBody {
                kind: MessageType::Text,
                body,
                media: None,
            },
        };

        Ok(self.send_with_retry(number.as_str(), &request).await)
    }

    async fn send_media(
        &self,
        phone: &str,
        body: &str,
        media: &Media,
        async_send: bool,
    ) -> Result<SendOutcome> {
        let number = match PhoneNumber::parse(phone) {
            Ok(number) => number,
            Err(_) => {
                return Ok(SendOutcome::failed(
                    phone,
                    format!("invalid phone number: {}", phone),
                ))
            }
        };
        if media.message_type() == MessageType::Text {
            return Ok(SendOutcome::failed(phone, "invalid message type"));
        }
        if media.data().is_empty() {
            return Ok(SendOutcome::failed(phone, "media file is empty"));
        }
        if media.size() > self.max_file_size {
            return Ok(SendOutcome::failed(
                phone,
                format!("file size exceeds limit: {} bytes", media.size()),
            ));
        }

        let request = SendRequest {
            whatsapp_id: &self.whatsapp_id,
            async_send,
            recipient: Recipient {
                number: number.as_str(),
            },
            message: MessageBody {
                kind: media.message_type(),
                body,
                media: Some(MediaBody {
                    mimetype: media.mime_type(),
                    data: STANDARD.encode(media.data()),
                    filename: media.filename(),
                }),
            },
        };

        Ok(self.send_with_retry(number.as_str(), &request).await)
    }

    async fn test_connection(&self) -> Result<ConnectionTestResult> {
        let mut attempt = 0;
        loop {
            let result = self.check_once().await;
            let retryable =
                !result.success && result.error.as_deref().is_some_and(is_retryable_error);
            if !retryable || attempt >= self.retry_attempts {
                return Ok(result);
            }
            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, max_file_size: usize) -> WhatsgateClient {
        let settings = WhatsgateSettings::new("wa-42", "test-key", server.uri()).unwrap();
        let config = GatewayConfig {
            retry_attempts: 2,
            retry_delay_ms: 1,
            max_file_size,
            check_number: "79990000000".to_string(),
            ..GatewayConfig::default()
        };
        WhatsgateClient::new(&settings, &config).unwrap()
    }

    #[tokio::test]
    async fn test_send_text_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("X-Api-Key", "test-key"))
            .and(body_json(json!({
                "WhatsappID": "wa-42",
                "async": true,
                "recipient": { "number": "79990001122" },
                "message": { "type": "text", "body": "hello" }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "status": "ok", "id": "msg-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 1024);
        let outcome = client
            .send_text("+7 (999) 000-11-22", "hello", true)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.phone_number, "79990001122");
        assert_eq!(outcome.message_id.as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn test_send_media_encodes_payload() {
        let server = MockServer::start().await;
        let media = Media::new("pic.png", "image/png", vec![1, 2, 3]);

        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_json(json!({
                "WhatsappID": "wa-42",
                "async": false,
                "recipient": { "number": "79990001122" },
                "message": {
                    "type": "image",
                    "body": "caption",
                    "media": { "mimetype": "image/png", "data": "AQID", "filename": "pic.png" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 1024);
        let outcome = client
            .send_media("79990001122", "caption", &media, false)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.message_id, None);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server, 1024);
        let outcome = client.send_text("79990001122", "hi", true).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("server error: API returned HTTP 503 - busy")
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 1024);
        let outcome = client.send_text("79990001122", "hi", true).await.unwrap();

        assert_eq!(
            outcome.error.as_deref(),
            Some("unauthorized: invalid credentials")
        );
    }

    #[tokio::test]
    async fn test_client_error_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "status": "error", "message": "bad number" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 1024);
        let outcome = client.send_text("79990001122", "hi", true).await.unwrap();

        assert_eq!(
            outcome.error.as_deref(),
            Some("API client error: HTTP 400. Status: error. Message: bad number")
        );
    }

    #[tokio::test]
    async fn test_preflight_validation_skips_http() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, 2);

        let bad_phone = client.send_text("89990001122", "hi", true).await.unwrap();
        assert_eq!(
            bad_phone.error.as_deref(),
            Some("invalid phone number: 89990001122")
        );

        let empty = client.send_text("79990001122", "  ", true).await.unwrap();
        assert_eq!(empty.error.as_deref(), Some("message cannot be empty"));

        let media = Media::new("doc.pdf", "application/pdf", vec![0; 3]);
        let oversized = client
            .send_media("79990001122", "caption", &media, true)
            .await
            .unwrap();
        assert_eq!(
            oversized.error.as_deref(),
            Some("file size exceeds limit: 3 bytes")
        );
    }

    #[tokio::test]
    async fn test_connection_check() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/check"))
            .and(body_json(json!({ "WhatsappID": "wa-42", "number": "79990000000" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "result": "success", "data": true })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, 1024);
        let result = client.test_connection().await.unwrap();
        assert!(result.success);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_connection_check_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/check"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "result": "error", "data": false })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, 1024);
        let result = client.test_connection().await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Connection test failed: error"));
    }
}

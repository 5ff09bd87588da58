//! WhatsGate credential management

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use wabulk_common::{Error, Result, WhatsgateSettings};
use wabulk_storage::SettingsRepository;

use crate::gateway::{ConnectionTestResult, MessageGateway, SettingsAwareGateway};

/// Reads and writes the stored credentials and keeps the gateway cache in step
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    gateway: Arc<SettingsAwareGateway>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>, gateway: Arc<SettingsAwareGateway>) -> Self {
        Self { repo, gateway }
    }

    pub async fn get(&self) -> Result<WhatsgateSettings> {
        self.repo
            .get()
            .await?
            .ok_or_else(|| Error::NotFound("WhatsGate settings are not configured".to_string()))
    }

    pub async fn update(
        &self,
        whatsapp_id: &str,
        api_key: &str,
        base_url: &str,
    ) -> Result<WhatsgateSettings> {
        let mut settings = WhatsgateSettings::new(whatsapp_id, api_key, base_url)?;
        if let Some(existing) = self.repo.get().await? {
            settings.created_at = existing.created_at;
            settings.updated_at = Utc::now();
        }

        self.repo.save(&settings).await?;
        self.gateway.invalidate().await;

        info!(whatsapp_id = %settings.whatsapp_id, base_url = %settings.base_url, "WhatsGate settings updated");
        Ok(settings)
    }

    pub async fn reset(&self) -> Result<()> {
        self.repo.reset().await?;
        self.gateway.invalidate().await;
        info!("WhatsGate settings reset");
        Ok(())
    }

    pub async fn test_connection(&self) -> Result<ConnectionTestResult> {
        self.gateway.test_connection().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wabulk_common::config::GatewayConfig;
    use wabulk_storage::MemorySettingsRepository;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service() -> SettingsService {
        let repo: Arc<dyn SettingsRepository> = Arc::new(MemorySettingsRepository::new());
        let gateway = Arc::new(SettingsAwareGateway::new(
            repo.clone(),
            GatewayConfig::default(),
        ));
        SettingsService::new(repo, gateway)
    }

    #[tokio::test]
    async fn test_get_unconfigured() {
        let service = service();
        assert!(matches!(service.get().await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_keeps_created_at() {
        let service = service();
        let first = service
            .update("wa-1", "first-key", "https://whatsgate.ru/api/v1")
            .await
            .unwrap();
        let second = service
            .update(" wa-2 ", "second-key", "https://whatsgate.ru/api/v1/")
            .await
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);

        let stored = service.get().await.unwrap();
        assert_eq!(stored.whatsapp_id, "wa-2");
        assert_eq!(stored.api_key, "second-key");
        assert_eq!(stored.base_url, "https://whatsgate.ru/api/v1");
    }

    #[tokio::test]
    async fn test_update_rejects_invalid() {
        let service = service();
        let err = service.update("wa", "", "https://x.ru").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(service.get().await.is_err());
    }

    #[tokio::test]
    async fn test_reset_then_test_connection() {
        let service = service();
        service.update("wa", "key", "https://x.ru").await.unwrap();
        service.reset().await.unwrap();

        assert!(service.get().await.is_err());
        let check = service.test_connection().await.unwrap();
        assert!(!check.success);
        assert_eq!(check.error.as_deref(), Some("settings not configured"));
    }

    #[tokio::test]
    async fn test_connection_uses_new_settings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "success", "data": true })))
            .mount(&server)
            .await;

        let service = service();
        let before = service.test_connection().await.unwrap();
        assert!(!before.success);

        service.update("wa", "key", &server.uri()).await.unwrap();
        let after = service.test_connection().await.unwrap();
        assert!(after.success);
    }
}

//! Gateway that reads credentials from the settings store

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};
use wabulk_common::config::GatewayConfig;
use wabulk_common::{Media, Result};
use wabulk_storage::SettingsRepository;

use super::{ConnectionTestResult, MessageGateway, SendOutcome, WhatsgateClient};

const NOT_CONFIGURED: &str = "settings not configured";

struct CachedClient {
    client: Arc<WhatsgateClient>,
    loaded_at: Instant,
}

/// [`MessageGateway`] that builds a [`WhatsgateClient`] from stored settings
/// and reuses it for a TTL. Call [`invalidate`](Self::invalidate) after the
/// settings change.
pub struct SettingsAwareGateway {
    settings: Arc<dyn SettingsRepository>,
    config: GatewayConfig,
    ttl: Duration,
    cache: RwLock<Option<CachedClient>>,
}

impl SettingsAwareGateway {
    pub fn new(settings: Arc<dyn SettingsRepository>, config: GatewayConfig) -> Self {
        let ttl = config.settings_cache_ttl();
        Self {
            settings,
            config,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached client so the next call reloads settings
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        info!("WhatsGate client cache invalidated");
    }

    async fn client(&self) -> Result<Option<Arc<WhatsgateClient>>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.loaded_at.elapsed() < self.ttl) {
                return Ok(Some(cached.client.clone()));
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref().filter(|c| c.loaded_at.elapsed() < self.ttl) {
            return Ok(Some(cached.client.clone()));
        }

        match self.settings.get().await? {
            Some(settings) => {
                let client = Arc::new(WhatsgateClient::new(&settings, &self.config)?);
                debug!(base_url = %settings.base_url, "Loaded WhatsGate client from settings");
                *cache = Some(CachedClient {
                    client: client.clone(),
                    loaded_at: Instant::now(),
                });
                Ok(Some(client))
            }
            None => {
                *cache = None;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl MessageGateway for SettingsAwareGateway {
    async fn send_text(&self, phone: &str, body: &str, async_send: bool) -> Result<SendOutcome> {
        match self.client().await? {
            Some(client) => client.send_text(phone, body, async_send).await,
            None => Ok(SendOutcome::failed(phone, NOT_CONFIGURED)),
        }
    }

    async fn send_media(
        &self,
        phone: &str,
        body: &str,
        media: &Media,
        async_send: bool,
    ) -> Result<SendOutcome> {
        match self.client().await? {
            Some(client) => client.send_media(phone, body, media, async_send).await,
            None => Ok(SendOutcome::failed(phone, NOT_CONFIGURED)),
        }
    }

    async fn test_connection(&self) -> Result<ConnectionTestResult> {
        match self.client().await? {
            Some(client) => client.test_connection().await,
            None => Ok(ConnectionTestResult::failed(NOT_CONFIGURED)),
        }
    }
}

//! Repository layer for data access

pub mod campaigns;
pub mod phone_statuses;
pub mod settings;

use std::sync::Arc;
use wabulk_common::config::DatabaseConfig;
use wabulk_common::{Error, Result};

use crate::db::DatabasePool;
use crate::memory::{
    MemoryCampaignRepository, MemoryPhoneStatusRepository, MemorySettingsRepository,
};

pub use campaigns::{CampaignRepository, DbCampaignRepository};
pub use phone_statuses::{DbPhoneStatusRepository, PhoneStatusRepository};
pub use settings::{DbSettingsRepository, SettingsRepository};

/// The repositories of one storage backend
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub phone_statuses: Arc<dyn PhoneStatusRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pool: Option<DatabasePool>,
}

impl Repositories {
    /// Connect the configured backend, running migrations for Postgres
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        match config.backend.as_str() {
            "postgres" => {
                let pool = DatabasePool::open(config).await?;
                Ok(Self::postgres(pool))
            }
            "memory" => Ok(Self::memory()),
            other => Err(Error::Config(format!(
                "Unsupported database backend: {}",
                other
            ))),
        }
    }

    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            phone_statuses: Arc::new(DbPhoneStatusRepository::new(pool.clone())),
            settings: Arc::new(DbSettingsRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    pub fn memory() -> Self {
        Self {
            campaigns: Arc::new(MemoryCampaignRepository::new()),
            phone_statuses: Arc::new(MemoryPhoneStatusRepository::new()),
            settings: Arc::new(MemorySettingsRepository::new()),
            pool: None,
        }
    }

    pub fn backend(&self) -> &'static str {
        if self.pool.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }

    /// Readiness of the campaign store: the campaigns table answers a query.
    /// The memory backend is always ready.
    pub async fn health_check(&self) -> Result<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };
        sqlx::query_scalar::<_, i32>("SELECT 1 FROM bulk_campaigns LIMIT 1")
            .fetch_optional(pool.pool())
            .await
            .map(|_| ())
            .map_err(|e| Error::Database(format!("campaign store unavailable: {}", e)))
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_postgres_backend_requires_url() {
        let config = DatabaseConfig {
            backend: "postgres".to_string(),
            url: Some("  ".to_string()),
            ..DatabaseConfig::default()
        };
        assert!(matches!(
            Repositories::connect(&config).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_backend_is_always_ready() {
        let config = DatabaseConfig {
            backend: "memory".to_string(),
            ..DatabaseConfig::default()
        };
        let repos = Repositories::connect(&config).await.unwrap();
        assert_eq!(repos.backend(), "memory");
        assert!(repos.health_check().await.is_ok());
        repos.close().await;
    }

    #[tokio::test]
    async fn test_unknown_backend_is_rejected() {
        let config = DatabaseConfig {
            backend: "sqlite".to_string(),
            ..DatabaseConfig::default()
        };
        assert!(matches!(
            Repositories::connect(&config).await,
            Err(Error::Config(_))
        ));
    }
}

//! Postgres pool for the campaign store

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::debug;
use wabulk_common::config::DatabaseConfig;
use wabulk_common::{Error, Result};

/// Schema for campaigns, their recipients and the gateway settings
static SCHEMA: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct DatabasePool(PgPool);

impl DatabasePool {
    /// Open the pool and bring the campaign schema up to date.
    ///
    /// `database.url` is mandatory here; the memory backend never gets a pool.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("database.url is required for the postgres backend".to_string())
            })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| Error::Database(format!("cannot reach campaign store: {}", e)))?;

        SCHEMA
            .run(&pool)
            .await
            .map_err(|e| Error::Database(format!("campaign schema migration failed: {}", e)))?;
        debug!(
            migrations = SCHEMA.iter().count(),
            max_connections = config.max_connections,
            "Campaign store schema is current"
        );

        Ok(Self(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.0
    }

    pub async fn close(&self) {
        self.0.close().await;
    }
}

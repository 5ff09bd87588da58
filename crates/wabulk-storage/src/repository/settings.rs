//! Gateway settings repository

use async_trait::async_trait;
use wabulk_common::{Error, Result, WhatsgateSettings};

use crate::db::DatabasePool;
use crate::models::SettingsRow;

/// Settings repository trait
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self) -> Result<Option<WhatsgateSettings>>;
    /// Insert or replace the single settings row
    async fn save(&self, settings: &WhatsgateSettings) -> Result<()>;
    async fn reset(&self) -> Result<()>;
}

/// Database settings repository
#[derive(Clone)]
pub struct DbSettingsRepository {
    pool: DatabasePool,
}

impl DbSettingsRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for DbSettingsRepository {
    async fn get(&self) -> Result<Option<WhatsgateSettings>> {
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT whatsapp_id, api_key, base_url, created_at, updated_at
            FROM whatsgate_settings WHERE id = 1
            "#,
        )
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(WhatsgateSettings::from))
    }

    async fn save(&self, settings: &WhatsgateSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO whatsgate_settings (id, whatsapp_id, api_key, base_url, created_at, updated_at)
            VALUES (1, $1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                whatsapp_id = EXCLUDED.whatsapp_id,
                api_key = EXCLUDED.api_key,
                base_url = EXCLUDED.base_url,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&settings.whatsapp_id)
        .bind(&settings.api_key)
        .bind(&settings.base_url)
        .bind(settings.created_at)
        .bind(settings.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM whatsgate_settings")
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

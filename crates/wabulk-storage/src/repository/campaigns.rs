//! Campaign repository

use async_trait::async_trait;
use chrono::Utc;
use wabulk_common::{Campaign, CampaignId, CampaignStatus, Error, Result};

use crate::db::DatabasePool;
use crate::models::CampaignRow;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn save(&self, campaign: &Campaign) -> Result<()>;
    async fn get_by_id(&self, id: CampaignId) -> Result<Option<Campaign>>;
    /// Overwrite mutable fields; `NotFound` when the row is missing
    async fn update(&self, campaign: &Campaign) -> Result<()>;
    async fn delete(&self, id: CampaignId) -> Result<()>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Campaign>>;
    async fn list_by_status(
        &self,
        status: CampaignStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>>;
    async fn count(&self) -> Result<i64>;
    async fn count_by_status(&self, status: CampaignStatus) -> Result<i64>;
    async fn update_status(&self, id: CampaignId, status: CampaignStatus) -> Result<()>;
    async fn update_processed_count(&self, id: CampaignId, processed: i32) -> Result<()>;
    async fn increment_processed_count(&self, id: CampaignId) -> Result<()>;
    async fn increment_error_count(&self, id: CampaignId) -> Result<()>;
    /// Move a `pending` or `started` campaign to the terminal `status` in one
    /// atomic step, optionally replacing `(processed, errors)`. A campaign that
    /// is already terminal keeps its status. Returns the status stored afterwards.
    async fn finalize_if_active(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        counts: Option<(i32, i32)>,
    ) -> Result<CampaignStatus>;
    /// Campaigns in `pending` or `started`
    async fn get_active(&self) -> Result<Vec<Campaign>>;
}

/// Columns for listings; media bytes stay in the database
const SUMMARY_COLUMNS: &str = r#"
    id, name, message, total, processed_count, error_count, status,
    media_filename, media_mime, media_type, NULL::BYTEA AS media_data,
    messages_per_hour, initiator, created_at, updated_at
"#;

/// Database campaign repository
#[derive(Clone)]
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn expect_row(affected: u64, id: CampaignId) -> Result<()> {
        if affected == 0 {
            Err(Error::NotFound(format!("campaign {} not found", id)))
        } else {
            Ok(())
        }
    }

    fn into_campaigns(rows: Vec<CampaignRow>) -> Result<Vec<Campaign>> {
        rows.into_iter().map(CampaignRow::into_domain).collect()
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn save(&self, campaign: &Campaign) -> Result<()> {
        let row = CampaignRow::from_domain(campaign);

        sqlx::query(
            r#"
            INSERT INTO bulk_campaigns (
                id, name, message, total, processed_count, error_count, status,
                media_filename, media_mime, media_type, media_data,
                messages_per_hour, initiator, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.message)
        .bind(row.total)
        .bind(row.processed_count)
        .bind(row.error_count)
        .bind(&row.status)
        .bind(&row.media_filename)
        .bind(&row.media_mime)
        .bind(&row.media_type)
        .bind(&row.media_data)
        .bind(row.messages_per_hour)
        .bind(&row.initiator)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_by_id(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, CampaignRow>("SELECT * FROM bulk_campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .map(CampaignRow::into_domain)
            .transpose()
    }

    async fn update(&self, campaign: &Campaign) -> Result<()> {
        let row = CampaignRow::from_domain(campaign);

        let result = sqlx::query(
            r#"
            UPDATE bulk_campaigns SET
                name = $2,
                message = $3,
                total = $4,
                processed_count = $5,
                error_count = $6,
                status = $7,
                media_filename = $8,
                media_mime = $9,
                media_type = $10,
                media_data = COALESCE($11, media_data),
                messages_per_hour = $12,
                initiator = $13,
                updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.message)
        .bind(row.total)
        .bind(row.processed_count)
        .bind(row.error_count)
        .bind(&row.status)
        .bind(&row.media_filename)
        .bind(&row.media_mime)
        .bind(&row.media_type)
        .bind(&row.media_data)
        .bind(row.messages_per_hour)
        .bind(&row.initiator)
        .bind(row.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::expect_row(result.rows_affected(), row.id)
    }

    async fn delete(&self, id: CampaignId) -> Result<()> {
        let result = sqlx::query("DELETE FROM bulk_campaigns WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Self::expect_row(result.rows_affected(), id)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {} FROM bulk_campaigns ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            SUMMARY_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::into_campaigns(rows)
    }

    async fn list_by_status(
        &self,
        status: CampaignStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(&format!(
            r#"
            SELECT {} FROM bulk_campaigns
            WHERE status = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            SUMMARY_COLUMNS
        ))
        .bind(status.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::into_campaigns(rows)
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bulk_campaigns")
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_by_status(&self, status: CampaignStatus) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bulk_campaigns WHERE status = $1")
            .bind(status.to_string())
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_status(&self, id: CampaignId, status: CampaignStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE bulk_campaigns SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(status.to_string())
                .bind(Utc::now())
                .execute(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        Self::expect_row(result.rows_affected(), id)
    }

    async fn update_processed_count(&self, id: CampaignId, processed: i32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE bulk_campaigns
            SET processed_count = LEAST(GREATEST($2, 0), total),
                error_count = LEAST(error_count, LEAST(GREATEST($2, 0), total)),
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(processed)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::expect_row(result.rows_affected(), id)
    }

    async fn increment_processed_count(&self, id: CampaignId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE bulk_campaigns
            SET processed_count = LEAST(processed_count + 1, total), updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::expect_row(result.rows_affected(), id)
    }

    async fn increment_error_count(&self, id: CampaignId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE bulk_campaigns
            SET error_count = LEAST(error_count + 1, processed_count), updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::expect_row(result.rows_affected(), id)
    }

    async fn finalize_if_active(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        counts: Option<(i32, i32)>,
    ) -> Result<CampaignStatus> {
        let (processed, errors) = counts.unzip();

        // The row lock taken by the CTE serialises concurrent finalizers
        let stored = sqlx::query_scalar::<_, String>(
            r#"
            WITH previous AS (
                SELECT id, status FROM bulk_campaigns WHERE id = $1 FOR UPDATE
            )
            UPDATE bulk_campaigns c SET
                status = CASE
                    WHEN previous.status IN ('pending', 'started') THEN $2
                    ELSE previous.status
                END,
                processed_count = LEAST(GREATEST(COALESCE($3, c.processed_count), 0), c.total),
                error_count = LEAST(
                    GREATEST(COALESCE($4, c.error_count), 0),
                    LEAST(GREATEST(COALESCE($3, c.processed_count), 0), c.total)
                ),
                updated_at = $5
            FROM previous
            WHERE c.id = previous.id
            RETURNING c.status
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(processed)
        .bind(errors)
        .bind(Utc::now())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| Error::NotFound(format!("campaign {} not found", id)))?;

        stored.parse().map_err(Error::Database)
    }

    async fn get_active(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(&format!(
            r#"
            SELECT {} FROM bulk_campaigns
            WHERE status IN ('pending', 'started')
            ORDER BY created_at ASC
            "#,
            SUMMARY_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::into_campaigns(rows)
    }
}

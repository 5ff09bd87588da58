//! Per-recipient delivery status repository

use async_trait::async_trait;
use wabulk_common::types::PhoneStatusId;
use wabulk_common::{
    CampaignId, CampaignPhoneStatus, Error, PhoneNumber, RecipientStatus, Result,
};

use crate::db::DatabasePool;
use crate::models::PhoneStatusRow;

/// Phone status repository trait
///
/// Listings return rows in insertion order.
#[async_trait]
pub trait PhoneStatusRepository: Send + Sync {
    async fn save(&self, status: &CampaignPhoneStatus) -> Result<()>;
    async fn get_by_id(&self, id: PhoneStatusId) -> Result<Option<CampaignPhoneStatus>>;
    async fn update(&self, status: &CampaignPhoneStatus) -> Result<()>;
    /// Set the outcome for a recipient addressed by its natural key.
    /// `sent` stamps `sent_at`, `failed` stores the error, other statuses clear both.
    async fn update_by_phone_number(
        &self,
        campaign_id: CampaignId,
        phone: &PhoneNumber,
        status: RecipientStatus,
        error: Option<&str>,
    ) -> Result<()>;
    async fn delete(&self, id: PhoneStatusId) -> Result<()>;
    async fn list_by_campaign_id(&self, campaign_id: CampaignId)
        -> Result<Vec<CampaignPhoneStatus>>;
    async fn list_by_campaign_and_status(
        &self,
        campaign_id: CampaignId,
        status: RecipientStatus,
    ) -> Result<Vec<CampaignPhoneStatus>>;
    /// Move every row of a campaign from `old` to `new`; returns the number changed
    async fn update_statuses_by_campaign_id(
        &self,
        campaign_id: CampaignId,
        old: RecipientStatus,
        new: RecipientStatus,
    ) -> Result<u64>;
    async fn mark_as_sent(&self, id: PhoneStatusId) -> Result<()>;
    async fn mark_as_failed(&self, id: PhoneStatusId, error: &str) -> Result<()>;
    async fn mark_as_cancelled(&self, id: PhoneStatusId) -> Result<()>;
    async fn get_sent_numbers_by_campaign_id(&self, campaign_id: CampaignId)
        -> Result<Vec<PhoneNumber>>;
    async fn get_failed_statuses_by_campaign_id(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<CampaignPhoneStatus>>;
    async fn count_statuses_by_campaign_id(
        &self,
        campaign_id: CampaignId,
        status: RecipientStatus,
    ) -> Result<i64>;
}

const SET_OUTCOME: &str = r#"
    status = $1,
    error = CASE WHEN $1 = 'failed' THEN COALESCE(NULLIF($2, ''), 'unknown error') ELSE NULL END,
    sent_at = CASE WHEN $1 = 'sent' THEN NOW() ELSE NULL END
"#;

/// Database phone status repository
#[derive(Clone)]
pub struct DbPhoneStatusRepository {
    pool: DatabasePool,
}

impl DbPhoneStatusRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn set_outcome(
        &self,
        id: PhoneStatusId,
        status: RecipientStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(&format!(
            "UPDATE bulk_campaign_statuses SET {} WHERE id = $3",
            SET_OUTCOME
        ))
        .bind(status.to_string())
        .bind(error)
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("phone status {} not found", id)));
        }
        Ok(())
    }

    fn into_statuses(rows: Vec<PhoneStatusRow>) -> Result<Vec<CampaignPhoneStatus>> {
        rows.into_iter().map(PhoneStatusRow::into_domain).collect()
    }
}

#[async_trait]
impl PhoneStatusRepository for DbPhoneStatusRepository {
    async fn save(&self, status: &CampaignPhoneStatus) -> Result<()> {
        let row = PhoneStatusRow::from_domain(status);

        sqlx::query(
            r#"
            INSERT INTO bulk_campaign_statuses (
                id, campaign_id, phone_number, status, error, sent_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.id)
        .bind(row.campaign_id)
        .bind(&row.phone_number)
        .bind(&row.status)
        .bind(&row.error)
        .bind(row.sent_at)
        .bind(row.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_by_id(&self, id: PhoneStatusId) -> Result<Option<CampaignPhoneStatus>> {
        sqlx::query_as::<_, PhoneStatusRow>(
            r#"
            SELECT id, campaign_id, phone_number, status, error, sent_at, created_at
            FROM bulk_campaign_statuses WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .map(PhoneStatusRow::into_domain)
        .transpose()
    }

    async fn update(&self, status: &CampaignPhoneStatus) -> Result<()> {
        let row = PhoneStatusRow::from_domain(status);

        let result = sqlx::query(
            r#"
            UPDATE bulk_campaign_statuses
            SET status = $2, error = $3, sent_at = $4
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(&row.status)
        .bind(&row.error)
        .bind(row.sent_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("phone status {} not found", row.id)));
        }
        Ok(())
    }

    async fn update_by_phone_number(
        &self,
        campaign_id: CampaignId,
        phone: &PhoneNumber,
        status: RecipientStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE bulk_campaign_statuses SET {}
            WHERE campaign_id = $3 AND phone_number = $4
            "#,
            SET_OUTCOME
        ))
        .bind(status.to_string())
        .bind(error)
        .bind(campaign_id)
        .bind(phone.as_str())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "phone {} not found in campaign {}",
                phone, campaign_id
            )));
        }
        Ok(())
    }

    async fn delete(&self, id: PhoneStatusId) -> Result<()> {
        let result = sqlx::query("DELETE FROM bulk_campaign_statuses WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("phone status {} not found", id)));
        }
        Ok(())
    }

    async fn list_by_campaign_id(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<CampaignPhoneStatus>> {
        let rows = sqlx::query_as::<_, PhoneStatusRow>(
            r#"
            SELECT id, campaign_id, phone_number, status, error, sent_at, created_at
            FROM bulk_campaign_statuses
            WHERE campaign_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::into_statuses(rows)
    }

    async fn list_by_campaign_and_status(
        &self,
        campaign_id: CampaignId,
        status: RecipientStatus,
    ) -> Result<Vec<CampaignPhoneStatus>> {
        let rows = sqlx::query_as::<_, PhoneStatusRow>(
            r#"
            SELECT id, campaign_id, phone_number, status, error, sent_at, created_at
            FROM bulk_campaign_statuses
            WHERE campaign_id = $1 AND status = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(campaign_id)
        .bind(status.to_string())
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::into_statuses(rows)
    }

    async fn update_statuses_by_campaign_id(
        &self,
        campaign_id: CampaignId,
        old: RecipientStatus,
        new: RecipientStatus,
    ) -> Result<u64> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE bulk_campaign_statuses SET {}
            WHERE campaign_id = $3 AND status = $4
            "#,
            SET_OUTCOME
        ))
        .bind(new.to_string())
        .bind(None::<String>)
        .bind(campaign_id)
        .bind(old.to_string())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn mark_as_sent(&self, id: PhoneStatusId) -> Result<()> {
        self.set_outcome(id, RecipientStatus::Sent, None).await
    }

    async fn mark_as_failed(&self, id: PhoneStatusId, error: &str) -> Result<()> {
        self.set_outcome(id, RecipientStatus::Failed, Some(error)).await
    }

    async fn mark_as_cancelled(&self, id: PhoneStatusId) -> Result<()> {
        self.set_outcome(id, RecipientStatus::Cancelled, None).await
    }

    async fn get_sent_numbers_by_campaign_id(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<PhoneNumber>> {
        let numbers = sqlx::query_scalar::<_, String>(
            r#"
            SELECT phone_number FROM bulk_campaign_statuses
            WHERE campaign_id = $1 AND status = 'sent'
            ORDER BY seq ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        numbers
            .iter()
            .map(|n| {
                PhoneNumber::parse(n)
                    .map_err(|_| Error::Database(format!("stored phone number {} is not valid", n)))
            })
            .collect()
    }

    async fn get_failed_statuses_by_campaign_id(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<CampaignPhoneStatus>> {
        self.list_by_campaign_and_status(campaign_id, RecipientStatus::Failed)
            .await
    }

    async fn count_statuses_by_campaign_id(
        &self,
        campaign_id: CampaignId,
        status: RecipientStatus,
    ) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bulk_campaign_statuses WHERE campaign_id = $1 AND status = $2",
        )
        .bind(campaign_id)
        .bind(status.to_string())
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}

//! In-memory repositories
//!
//! Used by the `memory` database backend and by tests. Semantics match the
//! Postgres repositories, including insertion order and not-found errors.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use wabulk_common::types::PhoneStatusId;
use wabulk_common::{
    Campaign, CampaignId, CampaignPhoneStatus, CampaignStatus, Error, PhoneNumber,
    RecipientStatus, Result, WhatsgateSettings,
};

use crate::models::{CampaignRow, PhoneStatusRow};
use crate::repository::{CampaignRepository, PhoneStatusRepository, SettingsRepository};

fn campaign_not_found(id: CampaignId) -> Error {
    Error::NotFound(format!("campaign {} not found", id))
}

fn status_not_found(id: PhoneStatusId) -> Error {
    Error::NotFound(format!("phone status {} not found", id))
}

/// Campaigns kept in a map of rows
#[derive(Default)]
pub struct MemoryCampaignRepository {
    rows: RwLock<HashMap<CampaignId, CampaignRow>>,
}

impl MemoryCampaignRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, id: CampaignId, f: F) -> Result<()>
    where
        F: FnOnce(&mut CampaignRow) + Send,
    {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| campaign_not_found(id))?;
        f(row);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn select<P>(&self, predicate: P, limit: i64, offset: i64) -> Result<Vec<Campaign>>
    where
        P: Fn(&CampaignRow) -> bool + Send,
    {
        let rows = self.rows.read().await;
        let mut matching: Vec<&CampaignRow> = rows.values().filter(|r| predicate(r)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        matching
            .into_iter()
            .skip(usize::try_from(offset.max(0)).unwrap_or(usize::MAX))
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .map(|row| row.clone().into_domain())
            .collect()
    }
}

#[async_trait]
impl CampaignRepository for MemoryCampaignRepository {
    async fn save(&self, campaign: &Campaign) -> Result<()> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&campaign.id()) {
            return Err(Error::Database(format!(
                "campaign {} already exists",
                campaign.id()
            )));
        }
        rows.insert(campaign.id(), CampaignRow::from_domain(campaign));
        Ok(())
    }

    async fn get_by_id(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let rows = self.rows.read().await;
        rows.get(&id).cloned().map(CampaignRow::into_domain).transpose()
    }

    async fn update(&self, campaign: &Campaign) -> Result<()> {
        let mut next = CampaignRow::from_domain(campaign);
        self.modify(campaign.id(), move |row| {
            if next.media_data.is_none() {
                next.media_data = row.media_data.take();
            }
            next.created_at = row.created_at;
            *row = next;
        })
        .await
    }

    async fn delete(&self, id: CampaignId) -> Result<()> {
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| campaign_not_found(id))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Campaign>> {
        self.select(|_| true, limit, offset).await
    }

    async fn list_by_status(
        &self,
        status: CampaignStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>> {
        let status = status.to_string();
        self.select(move |row| row.status == status, limit, offset)
            .await
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.read().await.len() as i64)
    }

    async fn count_by_status(&self, status: CampaignStatus) -> Result<i64> {
        let status = status.to_string();
        let rows = self.rows.read().await;
        Ok(rows.values().filter(|r| r.status == status).count() as i64)
    }

    async fn update_status(&self, id: CampaignId, status: CampaignStatus) -> Result<()> {
        self.modify(id, |row| row.status = status.to_string()).await
    }

    async fn update_processed_count(&self, id: CampaignId, processed: i32) -> Result<()> {
        self.modify(id, |row| {
            row.processed_count = processed.clamp(0, row.total);
            row.error_count = row.error_count.min(row.processed_count);
        })
        .await
    }

    async fn increment_processed_count(&self, id: CampaignId) -> Result<()> {
        self.modify(id, |row| {
            row.processed_count = (row.processed_count + 1).min(row.total);
        })
        .await
    }

    async fn increment_error_count(&self, id: CampaignId) -> Result<()> {
        self.modify(id, |row| {
            row.error_count = (row.error_count + 1).min(row.processed_count);
        })
        .await
    }

    async fn finalize_if_active(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        counts: Option<(i32, i32)>,
    ) -> Result<CampaignStatus> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| campaign_not_found(id))?;

        let current: CampaignStatus = row.status.parse().map_err(Error::Database)?;
        if !current.is_terminal() {
            row.status = status.to_string();
        }
        if let Some((processed, errors)) = counts {
            row.processed_count = processed.clamp(0, row.total);
            row.error_count = errors.clamp(0, row.processed_count);
        }
        row.updated_at = Utc::now();

        row.status.parse().map_err(Error::Database)
    }

    async fn get_active(&self) -> Result<Vec<Campaign>> {
        let mut active = self
            .select(
                |row| row.status == "pending" || row.status == "started",
                i64::MAX,
                0,
            )
            .await?;
        active.reverse();
        Ok(active)
    }
}

/// Phone statuses kept in insertion order
#[derive(Default)]
pub struct MemoryPhoneStatusRepository {
    rows: RwLock<Vec<PhoneStatusRow>>,
}

impl MemoryPhoneStatusRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_outcome(row: &mut PhoneStatusRow, status: RecipientStatus, error: Option<&str>) {
        row.status = status.to_string();
        row.error = match status {
            RecipientStatus::Failed => Some(
                error
                    .filter(|e| !e.is_empty())
                    .unwrap_or("unknown error")
                    .to_string(),
            ),
            _ => None,
        };
        row.sent_at = match status {
            RecipientStatus::Sent => Some(Utc::now()),
            _ => None,
        };
    }

    async fn set_outcome(
        &self,
        id: PhoneStatusId,
        status: RecipientStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| status_not_found(id))?;
        Self::apply_outcome(row, status, error);
        Ok(())
    }

    async fn select<P>(&self, predicate: P) -> Result<Vec<CampaignPhoneStatus>>
    where
        P: Fn(&PhoneStatusRow) -> bool + Send,
    {
        let rows = self.rows.read().await;
        rows.iter()
            .filter(|r| predicate(r))
            .cloned()
            .map(PhoneStatusRow::into_domain)
            .collect()
    }
}

#[async_trait]
impl PhoneStatusRepository for MemoryPhoneStatusRepository {
    async fn save(&self, status: &CampaignPhoneStatus) -> Result<()> {
        let mut rows = self.rows.write().await;
        let phone = status.phone_number().as_str();
        if rows
            .iter()
            .any(|r| r.campaign_id == status.campaign_id() && r.phone_number == phone)
        {
            return Err(Error::Database(format!(
                "phone {} already recorded for campaign {}",
                phone,
                status.campaign_id()
            )));
        }
        rows.push(PhoneStatusRow::from_domain(status));
        Ok(())
    }

    async fn get_by_id(&self, id: PhoneStatusId) -> Result<Option<CampaignPhoneStatus>> {
        let rows = self.rows.read().await;
        rows.iter()
            .find(|r| r.id == id)
            .cloned()
            .map(PhoneStatusRow::into_domain)
            .transpose()
    }

    async fn update(&self, status: &CampaignPhoneStatus) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == status.id())
            .ok_or_else(|| status_not_found(status.id()))?;
        let next = PhoneStatusRow::from_domain(status);
        row.status = next.status;
        row.error = next.error;
        row.sent_at = next.sent_at;
        Ok(())
    }

    async fn update_by_phone_number(
        &self,
        campaign_id: CampaignId,
        phone: &PhoneNumber,
        status: RecipientStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.campaign_id == campaign_id && r.phone_number == phone.as_str())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "phone {} not found in campaign {}",
                    phone, campaign_id
                ))
            })?;
        Self::apply_outcome(row, status, error);
        Ok(())
    }

    async fn delete(&self, id: PhoneStatusId) -> Result<()> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(status_not_found(id));
        }
        Ok(())
    }

    async fn list_by_campaign_id(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<CampaignPhoneStatus>> {
        self.select(|r| r.campaign_id == campaign_id).await
    }

    async fn list_by_campaign_and_status(
        &self,
        campaign_id: CampaignId,
        status: RecipientStatus,
    ) -> Result<Vec<CampaignPhoneStatus>> {
        let status = status.to_string();
        self.select(move |r| r.campaign_id == campaign_id && r.status == status)
            .await
    }

    async fn update_statuses_by_campaign_id(
        &self,
        campaign_id: CampaignId,
        old: RecipientStatus,
        new: RecipientStatus,
    ) -> Result<u64> {
        let old = old.to_string();
        let mut rows = self.rows.write().await;
        let mut changed = 0;
        for row in rows
            .iter_mut()
            .filter(|r| r.campaign_id == campaign_id && r.status == old)
        {
            Self::apply_outcome(row, new, None);
            changed += 1;
        }
        Ok(changed)
    }

    async fn mark_as_sent(&self, id: PhoneStatusId) -> Result<()> {
        self.set_outcome(id, RecipientStatus::Sent, None).await
    }

    async fn mark_as_failed(&self, id: PhoneStatusId, error: &str) -> Result<()> {
        self.set_outcome(id, RecipientStatus::Failed, Some(error))
            .await
    }

    async fn mark_as_cancelled(&self, id: PhoneStatusId) -> Result<()> {
        self.set_outcome(id, RecipientStatus::Cancelled, None).await
    }

    async fn get_sent_numbers_by_campaign_id(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<PhoneNumber>> {
        let sent = self
            .list_by_campaign_and_status(campaign_id, RecipientStatus::Sent)
            .await?;
        Ok(sent.into_iter().map(|s| s.phone_number().clone()).collect())
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
        let status = status.to_string();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.campaign_id == campaign_id && r.status == status)
            .count() as i64)
    }
}

/// Settings held in a single slot
#[derive(Default)]
pub struct MemorySettingsRepository {
    slot: RwLock<Option<WhatsgateSettings>>,
}

impl MemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsRepository for MemorySettingsRepository {
    async fn get(&self) -> Result<Option<WhatsgateSettings>> {
        Ok(self.slot.read().await.clone())
    }

    async fn save(&self, settings: &WhatsgateSettings) -> Result<()> {
        let mut slot = self.slot.write().await;
        let mut next = settings.clone();
        if let Some(existing) = slot.as_ref() {
            next.created_at = existing.created_at;
        }
        *slot = Some(next);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        *self.slot.write().await = None;
        Ok(())
    }
}

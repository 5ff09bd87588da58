//! Database row models and their conversion to domain types

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;
use wabulk_common::campaign::CampaignSnapshot;
use wabulk_common::{
    Campaign, CampaignPhoneStatus, CampaignStatus, Error, Media, MessageType, PhoneNumber,
    RecipientStatus, Result, WhatsgateSettings,
};

/// Row of `bulk_campaigns`
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CampaignRow {
    pub id: Uuid,
    pub name: String,
    pub message: String,
    pub total: i32,
    pub processed_count: i32,
    pub error_count: i32,
    pub status: String,
    pub media_filename: Option<String>,
    pub media_mime: Option<String>,
    pub media_type: Option<String>,
    #[serde(skip)]
    pub media_data: Option<Vec<u8>>,
    pub messages_per_hour: i32,
    pub initiator: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignRow {
    pub fn from_domain(campaign: &Campaign) -> Self {
        let media = campaign.media();
        Self {
            id: campaign.id(),
            name: campaign.name().to_string(),
            message: campaign.message().to_string(),
            total: campaign.metrics().total(),
            processed_count: campaign.metrics().processed(),
            error_count: campaign.metrics().errors(),
            status: campaign.status().to_string(),
            media_filename: media.map(|m| m.filename().to_string()),
            media_mime: media.map(|m| m.mime_type().to_string()),
            media_type: media.map(|m| m.message_type().to_string()),
            media_data: media.map(|m| m.data().to_vec()),
            messages_per_hour: campaign.messages_per_hour(),
            initiator: campaign.initiator().map(str::to_string),
            created_at: campaign.created_at(),
            updated_at: Utc::now(),
        }
    }

    pub fn into_domain(self) -> Result<Campaign> {
        let status: CampaignStatus = self.status.parse().map_err(Error::Database)?;

        let media = match (self.media_filename, self.media_mime) {
            (Some(filename), Some(mime_type)) => {
                let message_type = match self.media_type {
                    Some(t) => t.parse().map_err(Error::Database)?,
                    None => MessageType::from_mime(&mime_type),
                };
                Some(Media::restore(
                    filename,
                    mime_type,
                    message_type,
                    self.media_data.unwrap_or_default(),
                ))
            }
            _ => None,
        };

        Ok(Campaign::from_snapshot(CampaignSnapshot {
            id: self.id,
            name: self.name,
            message: self.message,
            media,
            messages_per_hour: self.messages_per_hour,
            initiator: self.initiator,
            status,
            total: self.total,
            processed: self.processed_count,
            errors: self.error_count,
            created_at: self.created_at,
        }))
    }
}

/// Row of `bulk_campaign_statuses`
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PhoneStatusRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub phone_number: String,
    pub status: String,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PhoneStatusRow {
    pub fn from_domain(status: &CampaignPhoneStatus) -> Self {
        Self {
            id: status.id(),
            campaign_id: status.campaign_id(),
            phone_number: status.phone_number().to_string(),
            status: status.status().to_string(),
            error: status.error().map(str::to_string),
            sent_at: status.sent_at(),
            created_at: status.created_at(),
        }
    }

    pub fn into_domain(self) -> Result<CampaignPhoneStatus> {
        let phone = PhoneNumber::parse(&self.phone_number).map_err(|_| {
            Error::Database(format!(
                "stored phone number {} is not valid",
                self.phone_number
            ))
        })?;
        let status: RecipientStatus = self.status.parse().map_err(Error::Database)?;

        Ok(CampaignPhoneStatus::restore(
            self.id,
            self.campaign_id,
            phone,
            status,
            self.error,
            self.sent_at,
            self.created_at,
        ))
    }
}

/// Row of `whatsgate_settings`
#[derive(Debug, Clone, FromRow)]
pub struct SettingsRow {
    pub whatsapp_id: String,
    pub api_key: String,
    pub base_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SettingsRow> for WhatsgateSettings {
    fn from(row: SettingsRow) -> Self {
        WhatsgateSettings {
            whatsapp_id: row.whatsapp_id,
            api_key: row.api_key,
            base_url: row.base_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_campaign_row_round_trip() {
        let mut campaign = Campaign::new("Promo", "hello", 30).unwrap();
        campaign
            .add_primary(vec![PhoneNumber::parse("79990001122").unwrap()])
            .unwrap();
        campaign
            .set_media(Media::new("a.png", "image/png", vec![1, 2, 3]))
            .unwrap();
        campaign.set_initiator("ops");

        let restored = CampaignRow::from_domain(&campaign).into_domain().unwrap();
        assert_eq!(restored.id(), campaign.id());
        assert_eq!(restored.name(), "Promo");
        assert_eq!(restored.total(), 1);
        assert_eq!(restored.initiator(), Some("ops"));
        assert_eq!(restored.media(), campaign.media());
        assert_eq!(restored.status(), CampaignStatus::Pending);
    }

    #[test]
    fn test_unknown_status_is_database_error() {
        let campaign = Campaign::new("Promo", "hello", 30).unwrap();
        let mut row = CampaignRow::from_domain(&campaign);
        row.status = "running".to_string();
        assert!(matches!(row.into_domain(), Err(Error::Database(_))));
    }
}

//! Campaign service inputs and outputs

use chrono::{DateTime, Utc};
use serde::Serialize;
use wabulk_common::{
    Campaign, CampaignId, CampaignStatus, Media, MessageType, PhoneNumber,
};

/// A phone list uploaded alongside a create request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Input of [`CampaignService::create`](super::CampaignService::create)
#[derive(Debug, Clone, Default)]
pub struct CreateCampaign {
    pub name: String,
    pub message: String,
    pub messages_per_hour: i32,
    pub file: Option<UploadedFile>,
    /// Header of the phone column in `file`, when it is not auto-detected
    pub phone_column: Option<String>,
    pub media: Option<Media>,
    pub additional_numbers: Vec<String>,
    pub exclude_numbers: Vec<String>,
    pub initiator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaInfo {
    pub filename: String,
    pub mime_type: String,
    pub message_type: MessageType,
    pub size: usize,
}

impl From<&Media> for MediaInfo {
    fn from(media: &Media) -> Self {
        Self {
            filename: media.filename().to_string(),
            mime_type: media.mime_type().to_string(),
            message_type: media.message_type(),
            size: media.size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSummary {
    pub id: CampaignId,
    pub name: String,
    pub message: String,
    pub status: CampaignStatus,
    pub messages_per_hour: i32,
    pub initiator: Option<String>,
    pub total: i32,
    pub processed: i32,
    pub errors: i32,
    pub progress: f64,
    pub media: Option<MediaInfo>,
    pub created_at: DateTime<Utc>,
}

impl From<&Campaign> for CampaignSummary {
    fn from(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id(),
            name: campaign.name().to_string(),
            message: campaign.message().to_string(),
            status: campaign.status(),
            messages_per_hour: campaign.messages_per_hour(),
            initiator: campaign.initiator().map(str::to_string),
            total: campaign.metrics().total(),
            processed: campaign.metrics().processed(),
            errors: campaign.metrics().errors(),
            progress: campaign.progress(),
            media: campaign.media().map(MediaInfo::from),
            created_at: campaign.created_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedCampaign {
    pub campaign: CampaignSummary,
    pub valid_phones: usize,
    pub invalid_phones: usize,
    pub total_numbers: i32,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedCampaign {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub total_numbers: usize,
    /// e.g. "2.5 hours"
    pub estimated_completion: String,
    pub worker_started: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelledCampaign {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub cancelled_numbers: i64,
    pub already_sent_numbers: i64,
    pub total_numbers: i32,
    pub worker_stopped: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedNumber {
    pub phone_number: PhoneNumber,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignDetail {
    pub campaign: CampaignSummary,
    pub sent_numbers: Vec<PhoneNumber>,
    pub failed_numbers: Vec<FailedNumber>,
}

/// Listing filter; out-of-range paging values are normalised
#[derive(Debug, Clone, Copy, Default)]
pub struct ListCampaigns {
    pub limit: i64,
    pub offset: i64,
    pub status: Option<CampaignStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignPage {
    pub campaigns: Vec<CampaignSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

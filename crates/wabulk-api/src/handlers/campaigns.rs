//! Campaign handlers

use axum::{
    extract::{multipart::Field, Multipart, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use wabulk_common::config::MAX_MEDIA_BYTES;
use wabulk_common::{CampaignStatus, Media};
use wabulk_core::campaigns::{FailedNumber, MediaInfo};
use wabulk_core::{
    CampaignDetail, CampaignPage, CampaignSummary, CancelledCampaign, CreateCampaign,
    CreatedCampaign, ListCampaigns, StartedCampaign, UploadedFile,
};

use crate::error::{api_error, bad_request, ApiError, ErrorResponse};
use crate::state::AppState;

/// Rate used when the form leaves `messages_per_hour` empty
pub const DEFAULT_MESSAGES_PER_HOUR: i32 = 60;
pub const MAX_CANCEL_REASON_LENGTH: usize = 500;

/// Multipart form accepted by campaign creation
#[derive(Debug, ToSchema)]
pub struct CreateCampaignForm {
    pub name: String,
    pub message: String,
    /// Defaults to 60
    pub messages_per_hour: Option<i32>,
    /// Spreadsheet with a phone column (xlsx, xls, xlsm, ods)
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
    /// Header of the phone column; detected when omitted
    pub phone_column: Option<String>,
    /// Attachment of at most 10 MiB
    #[schema(value_type = Option<String>, format = Binary)]
    pub media: Option<Vec<u8>>,
    /// Repeatable, or a comma/newline separated list, or a JSON array
    pub additional_numbers: Option<Vec<String>>,
    pub exclude_numbers: Option<Vec<String>>,
    pub initiator: Option<String>,
}

/// Query parameters for listing campaigns
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListCampaignsQuery {
    /// 1..=1000, defaults to 500
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// pending, started, finished, failed or cancelled
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelCampaignRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MediaResponse {
    pub filename: String,
    pub mime_type: String,
    pub message_type: String,
    pub size: usize,
}

impl From<MediaInfo> for MediaResponse {
    fn from(m: MediaInfo) -> Self {
        Self {
            filename: m.filename,
            mime_type: m.mime_type,
            message_type: m.message_type.to_string(),
            size: m.size,
        }
    }
}

/// Campaign response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub message: String,
    pub status: String,
    pub messages_per_hour: i32,
    pub initiator: Option<String>,
    pub total: i32,
    pub processed: i32,
    pub errors: i32,
    /// Percentage of processed recipients
    pub progress: f64,
    pub media: Option<MediaResponse>,
    pub created_at: DateTime<Utc>,
}

impl From<CampaignSummary> for CampaignResponse {
    fn from(c: CampaignSummary) -> Self {
        Self {
            id: c.id,
            name: c.name,
            message: c.message,
            status: c.status.to_string(),
            messages_per_hour: c.messages_per_hour,
            initiator: c.initiator,
            total: c.total,
            processed: c.processed,
            errors: c.errors,
            progress: c.progress,
            media: c.media.map(MediaResponse::from),
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateCampaignResponse {
    pub campaign: CampaignResponse,
    pub valid_phones: usize,
    pub invalid_phones: usize,
    pub total_numbers: i32,
    pub warnings: Vec<String>,
}

impl From<CreatedCampaign> for CreateCampaignResponse {
    fn from(c: CreatedCampaign) -> Self {
        Self {
            campaign: c.campaign.into(),
            valid_phones: c.valid_phones,
            invalid_phones: c.invalid_phones,
            total_numbers: c.total_numbers,
            warnings: c.warnings,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FailedNumberResponse {
    pub phone_number: String,
    pub error: Option<String>,
}

impl From<FailedNumber> for FailedNumberResponse {
    fn from(f: FailedNumber) -> Self {
        Self {
            phone_number: f.phone_number.to_string(),
            error: f.error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CampaignDetailResponse {
    pub campaign: CampaignResponse,
    pub sent_numbers: Vec<String>,
    pub failed_numbers: Vec<FailedNumberResponse>,
}

impl From<CampaignDetail> for CampaignDetailResponse {
    fn from(d: CampaignDetail) -> Self {
        Self {
            campaign: d.campaign.into(),
            sent_numbers: d.sent_numbers.iter().map(ToString::to_string).collect(),
            failed_numbers: d.failed_numbers.into_iter().map(Into::into).collect(),
        }
    }
}

/// Campaign list response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CampaignListResponse {
    pub campaigns: Vec<CampaignResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl From<CampaignPage> for CampaignListResponse {
    fn from(p: CampaignPage) -> Self {
        Self {
            campaigns: p.campaigns.into_iter().map(Into::into).collect(),
            total: p.total,
            limit: p.limit,
            offset: p.offset,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StartCampaignResponse {
    pub campaign_id: Uuid,
    pub status: String,
    pub total_numbers: usize,
    pub estimated_completion: String,
    pub worker_started: bool,
}

impl From<StartedCampaign> for StartCampaignResponse {
    fn from(s: StartedCampaign) -> Self {
        Self {
            campaign_id: s.campaign_id,
            status: s.status.to_string(),
            total_numbers: s.total_numbers,
            estimated_completion: s.estimated_completion,
            worker_started: s.worker_started,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CancelCampaignResponse {
    pub campaign_id: Uuid,
    pub status: String,
    pub cancelled_numbers: i64,
    pub already_sent_numbers: i64,
    pub total_numbers: i32,
    pub worker_stopped: bool,
    pub reason: Option<String>,
}

impl From<CancelledCampaign> for CancelCampaignResponse {
    fn from(c: CancelledCampaign) -> Self {
        Self {
            campaign_id: c.campaign_id,
            status: c.status.to_string(),
            cancelled_numbers: c.cancelled_numbers,
            already_sent_numbers: c.already_sent_numbers,
            total_numbers: c.total_numbers,
            worker_stopped: c.worker_stopped,
            reason: c.reason,
        }
    }
}

/// Create a campaign from an uploaded spreadsheet and/or explicit numbers
#[utoipa::path(
    post,
    path = "/api/v1/campaigns",
    tag = "campaigns",
    request_body(content = CreateCampaignForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Campaign created", body = CreateCampaignResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Another campaign is active", body = ErrorResponse)
    )
)]
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<CreateCampaignResponse>, ApiError> {
    let request = read_create_form(&mut multipart).await?;
    let created = state.campaigns.create(request).await.map_err(api_error)?;

    info!(
        campaign_id = %created.campaign.id,
        total = created.total_numbers,
        "Campaign created via API"
    );
    Ok(Json(created.into()))
}

/// List campaigns, newest first
#[utoipa::path(
    get,
    path = "/api/v1/campaigns",
    tag = "campaigns",
    params(ListCampaignsQuery),
    responses(
        (status = 200, description = "Campaign page", body = CampaignListResponse),
        (status = 400, description = "Invalid query", body = ErrorResponse)
    )
)]
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<CampaignListResponse>, ApiError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<CampaignStatus>().map_err(bad_request)?),
    };

    let page = state
        .campaigns
        .list(ListCampaigns {
            limit: query.limit.unwrap_or(0),
            offset: query.offset.unwrap_or(0),
            status,
        })
        .await
        .map_err(api_error)?;

    Ok(Json(page.into()))
}

/// Get a campaign with its sent and failed numbers
#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}",
    tag = "campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign detail", body = CampaignDetailResponse),
        (status = 404, description = "Unknown campaign", body = ErrorResponse)
    )
)]
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignDetailResponse>, ApiError> {
    let detail = state.campaigns.get(id).await.map_err(api_error)?;
    Ok(Json(detail.into()))
}

/// Start sending a pending campaign
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/start",
    tag = "campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign started", body = StartCampaignResponse),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
        (status = 409, description = "Campaign is not pending", body = ErrorResponse)
    )
)]
pub async fn start_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StartCampaignResponse>, ApiError> {
    let started = state.campaigns.start(id).await.map_err(api_error)?;
    Ok(Json(started.into()))
}

/// Cancel a pending or running campaign
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/cancel",
    tag = "campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body(content = CancelCampaignRequest, description = "Optional cancel reason"),
    responses(
        (status = 200, description = "Campaign cancelled", body = CancelCampaignResponse),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
        (status = 409, description = "Campaign already completed", body = ErrorResponse)
    )
)]
pub async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelCampaignRequest>>,
) -> Result<Json<CancelCampaignResponse>, ApiError> {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    if reason
        .as_ref()
        .is_some_and(|r| r.chars().count() > MAX_CANCEL_REASON_LENGTH)
    {
        return Err(bad_request(format!(
            "cancel reason too long (max {} characters)",
            MAX_CANCEL_REASON_LENGTH
        )));
    }

    let cancelled = state.campaigns.cancel(id, reason).await.map_err(api_error)?;
    Ok(Json(cancelled.into()))
}

async fn read_create_form(multipart: &mut Multipart) -> Result<CreateCampaign, ApiError> {
    let mut request = CreateCampaign {
        messages_per_hour: DEFAULT_MESSAGES_PER_HOUR,
        ..CreateCampaign::default()
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" => request.name = field_text(field).await?,
            "message" => request.message = field_text(field).await?,
            "messages_per_hour" => {
                let raw = field_text(field).await?;
                if !raw.trim().is_empty() {
                    request.messages_per_hour = raw
                        .trim()
                        .parse()
                        .map_err(|_| bad_request("messages_per_hour must be an integer"))?;
                }
            }
            "phone_column" => request.phone_column = non_blank(field_text(field).await?),
            "initiator" => request.initiator = non_blank(field_text(field).await?),
            "additional_numbers" | "additional_numbers[]" => request
                .additional_numbers
                .extend(split_numbers(&field_text(field).await?)),
            "exclude_numbers" | "exclude_numbers[]" => request
                .exclude_numbers
                .extend(split_numbers(&field_text(field).await?)),
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                if !data.is_empty() {
                    request.file = Some(UploadedFile {
                        filename,
                        data: data.to_vec(),
                    });
                }
            }
            "media" => request.media = read_media(field).await?,
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(request)
}

/// Read the attachment chunk by chunk, giving up as soon as it grows past the ceiling
async fn read_media(mut field: Field<'_>) -> Result<Option<Media>, ApiError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let mime_type = match field.content_type() {
        Some("application/octet-stream") | None => String::new(),
        Some(mime) => mime.to_string(),
    };

    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if data.len() + chunk.len() > MAX_MEDIA_BYTES {
            return Err(bad_request(format!(
                "media file exceeds {} bytes",
                MAX_MEDIA_BYTES
            )));
        }
        data.extend_from_slice(&chunk);
    }

    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(Media::new(filename, mime_type, data)))
}

async fn field_text(field: Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(multipart_error)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    bad_request(format!("invalid multipart form: {}", err.body_text()))
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Accept a JSON array or a comma, semicolon or newline separated list
fn split_numbers(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
            return list
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
        }
    }
    raw.split([',', ';', '\n', '\r'])
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

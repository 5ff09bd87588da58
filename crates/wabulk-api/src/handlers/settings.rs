//! WhatsGate settings handlers

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use wabulk_common::WhatsgateSettings;
use wabulk_core::gateway::ConnectionTestResult;

use crate::error::{api_error, bad_request, ApiError, ErrorResponse};
use crate::state::AppState;

const MAX_WHATSAPP_ID_LENGTH: usize = 50;
const MAX_API_KEY_LENGTH: usize = 200;
const MAX_BASE_URL_LENGTH: usize = 500;

/// Stored credentials; the API key is masked
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettingsResponse {
    pub whatsapp_id: String,
    pub api_key: String,
    pub base_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WhatsgateSettings> for SettingsResponse {
    fn from(s: &WhatsgateSettings) -> Self {
        Self {
            whatsapp_id: s.whatsapp_id.clone(),
            api_key: s.masked_api_key(),
            base_url: s.base_url.clone(),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub whatsapp_id: String,
    pub api_key: String,
    pub base_url: String,
}

impl UpdateSettingsRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let fields = [
            ("whatsapp_id", &self.whatsapp_id, MAX_WHATSAPP_ID_LENGTH),
            ("api_key", &self.api_key, MAX_API_KEY_LENGTH),
            ("base_url", &self.base_url, MAX_BASE_URL_LENGTH),
        ];
        for (name, value, max) in fields {
            if value.trim().is_empty() {
                return Err(bad_request(format!("{} is required", name)));
            }
            if value.chars().count() > max {
                return Err(bad_request(format!(
                    "{} must be at most {} characters",
                    name, max
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<ConnectionTestResult> for ConnectionTestResponse {
    fn from(r: ConnectionTestResult) -> Self {
        Self {
            success: r.success,
            error: r.error,
            timestamp: r.timestamp,
        }
    }
}

/// Read the gateway credentials
#[utoipa::path(
    get,
    path = "/api/v1/settings",
    tag = "settings",
    responses(
        (status = 200, description = "Current settings", body = SettingsResponse),
        (status = 404, description = "Settings not configured", body = ErrorResponse)
    )
)]
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = state.settings.get().await.map_err(api_error)?;
    Ok(Json(SettingsResponse::from(&settings)))
}

/// Replace the gateway credentials
#[utoipa::path(
    put,
    path = "/api/v1/settings",
    tag = "settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = SettingsResponse),
        (status = 400, description = "Invalid settings", body = ErrorResponse)
    )
)]
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    request.validate()?;

    let settings = state
        .settings
        .update(&request.whatsapp_id, &request.api_key, &request.base_url)
        .await
        .map_err(api_error)?;

    Ok(Json(SettingsResponse::from(&settings)))
}

/// Delete the gateway credentials
#[utoipa::path(
    delete,
    path = "/api/v1/settings/reset",
    tag = "settings",
    responses(
        (status = 204, description = "Settings removed")
    )
)]
pub async fn reset_settings(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.settings.reset().await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check the stored credentials against the gateway
#[utoipa::path(
    post,
    path = "/api/v1/settings/test",
    tag = "settings",
    responses(
        (status = 200, description = "Connection test result", body = ConnectionTestResponse)
    )
)]
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConnectionTestResponse>, ApiError> {
    let result = state.settings.test_connection().await.map_err(api_error)?;
    Ok(Json(result.into()))
}

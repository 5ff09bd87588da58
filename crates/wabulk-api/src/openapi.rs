//! OpenAPI documentation
//!
//! The document is generated from the handler annotations and served with a
//! Swagger UI page loaded from a CDN.

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers::{campaigns, health, settings};

pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "WaBulk API",
        description = "Bulk WhatsApp campaigns delivered through the WhatsGate gateway",
        version = "1.0.0",
        license(name = "Apache-2.0", url = "https://www.apache.org/licenses/LICENSE-2.0")
    ),
    paths(
        health::health,
        health::liveness,
        health::readiness,
        health::health_detailed,
        campaigns::create_campaign,
        campaigns::list_campaigns,
        campaigns::get_campaign,
        campaigns::start_campaign,
        campaigns::cancel_campaign,
        settings::get_settings,
        settings::update_settings,
        settings::reset_settings,
        settings::test_connection,
    ),
    components(schemas(
        ErrorResponse,
        health::HealthResponse,
        health::DetailedHealthResponse,
        health::HealthChecks,
        health::ComponentHealth,
        health::DispatcherHealth,
        health::QueueHealth,
        campaigns::CreateCampaignForm,
        campaigns::CancelCampaignRequest,
        campaigns::MediaResponse,
        campaigns::CampaignResponse,
        campaigns::CreateCampaignResponse,
        campaigns::FailedNumberResponse,
        campaigns::CampaignDetailResponse,
        campaigns::CampaignListResponse,
        campaigns::StartCampaignResponse,
        campaigns::CancelCampaignResponse,
        settings::SettingsResponse,
        settings::UpdateSettingsRequest,
        settings::ConnectionTestResponse,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "campaigns", description = "Campaign lifecycle"),
        (name = "settings", description = "WhatsGate credentials")
    )
)]
pub struct ApiDoc;

/// Create OpenAPI routes
pub fn create_openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(OPENAPI_PATH, get(openapi_json))
        .route("/docs", get(swagger_ui))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn swagger_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>WaBulk API Documentation</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body { margin: 0; padding: 0; }
        .swagger-ui .topbar { display: none; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: "/api-docs/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [SwaggerUIBundle.presets.apis]
            });
        };
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_campaign_paths() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        for path in [
            "/api/v1/campaigns",
            "/api/v1/campaigns/{id}",
            "/api/v1/campaigns/{id}/start",
            "/api/v1/campaigns/{id}/cancel",
            "/api/v1/settings",
            "/api/v1/settings/reset",
            "/health/ready",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }
}

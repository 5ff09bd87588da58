//! API routes

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use wabulk_common::config::HttpConfig;

use crate::handlers::{campaigns, health, settings};
use crate::openapi::create_openapi_routes;
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>, http: &HttpConfig) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed));

    let campaign_routes = Router::new()
        .route(
            "/",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route("/:id", get(campaigns::get_campaign))
        .route("/:id/start", post(campaigns::start_campaign))
        .route("/:id/cancel", post(campaigns::cancel_campaign));

    let settings_routes = Router::new()
        .route(
            "/",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/reset", delete(settings::reset_settings))
        .route("/test", post(settings::test_connection));

    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .nest("/settings", settings_routes)
        .layer(DefaultBodyLimit::max(http.max_upload_bytes));

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .merge(create_openapi_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&http.cors_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorResponse;
    use crate::handlers::campaigns::{
        CampaignDetailResponse, CampaignListResponse, CancelCampaignResponse,
        CreateCampaignResponse, StartCampaignResponse,
    };
    use crate::handlers::health::{DetailedHealthResponse, HealthResponse};
    use crate::handlers::settings::SettingsResponse;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum_test::multipart::MultipartForm;
    use axum_test::TestServer;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;
    use wabulk_common::config::{DispatcherConfig, GatewayConfig};
    use wabulk_common::{Media, Result};
    use wabulk_core::delivery::{CampaignRegistry, Dispatcher, RateLimiter};
    use wabulk_core::gateway::{ConnectionTestResult, MessageGateway, SendOutcome};
    use wabulk_core::{
        CampaignService, SettingsAwareGateway, SettingsService, SpreadsheetPhoneParser,
    };
    use wabulk_storage::Repositories;

    struct AcceptingGateway;

    #[async_trait]
    impl MessageGateway for AcceptingGateway {
        async fn send_text(&self, phone: &str, _body: &str, _async_send: bool) -> Result<SendOutcome> {
            Ok(SendOutcome::sent(phone, Some("m-1".to_string())))
        }

        async fn send_media(
            &self,
            phone: &str,
            _body: &str,
            _media: &Media,
            _async_send: bool,
        ) -> Result<SendOutcome> {
            Ok(SendOutcome::sent(phone, Some("m-1".to_string())))
        }

        async fn test_connection(&self) -> Result<ConnectionTestResult> {
            Ok(ConnectionTestResult::ok())
        }
    }

    fn test_server() -> TestServer {
        let repos = Repositories::memory();
        let limiter = Arc::new(RateLimiter::with_timings(
            Duration::from_millis(1),
            Duration::from_millis(50),
            20,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(AcceptingGateway),
            limiter.clone(),
            &DispatcherConfig {
                tick_interval_ms: 5,
                ..DispatcherConfig::default()
            },
        ));
        dispatcher.start().unwrap();

        let campaigns = Arc::new(CampaignService::new(
            repos.clone(),
            dispatcher.clone(),
            Arc::new(CampaignRegistry::new()),
            limiter,
            Arc::new(SpreadsheetPhoneParser::new()),
        ));
        let gateway = Arc::new(SettingsAwareGateway::new(
            repos.settings.clone(),
            GatewayConfig::default(),
        ));
        let settings = Arc::new(SettingsService::new(repos.settings.clone(), gateway));

        let state = Arc::new(AppState {
            campaigns,
            settings,
            dispatcher,
            repos,
        });
        TestServer::new(create_router(state, &HttpConfig::default())).unwrap()
    }

    fn campaign_form(name: &str, numbers: &str) -> MultipartForm {
        MultipartForm::new()
            .add_text("name", name)
            .add_text("message", "Hello from WaBulk")
            .add_text("messages_per_hour", "3600")
            .add_text("additional_numbers", numbers)
            .add_text("initiator", "ops@example.com")
    }

    async fn create(server: &TestServer, name: &str, numbers: &str) -> CreateCampaignResponse {
        let response = server
            .post("/api/v1/campaigns")
            .multipart(campaign_form(name, numbers))
            .await;
        response.assert_status_ok();
        response.json()
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let server = test_server();

        let health: HealthResponse = server.get("/health").await.json();
        assert_eq!(health.status, "healthy");
        server.get("/health/live").await.assert_status_ok();
        server.get("/health/ready").await.assert_status_ok();

        let detailed: DetailedHealthResponse = server.get("/health/detailed").await.json();
        assert_eq!(detailed.status, "healthy");
        assert_eq!(detailed.checks.dispatcher.status, "healthy");
        assert!(detailed.checks.dispatcher.campaigns.is_empty());
    }

    #[tokio::test]
    async fn test_create_get_and_list() {
        let server = test_server();
        let created = create(&server, "Spring sale", "79990000001, 79990000002, bad").await;

        assert_eq!(created.total_numbers, 2);
        assert_eq!(created.invalid_phones, 1);
        assert_eq!(created.campaign.status, "pending");
        assert_eq!(created.campaign.messages_per_hour, 3600);
        assert_eq!(created.campaign.initiator.as_deref(), Some("ops@example.com"));

        let detail: CampaignDetailResponse = server
            .get(&format!("/api/v1/campaigns/{}", created.campaign.id))
            .await
            .json();
        assert_eq!(detail.campaign.name, "Spring sale");
        assert_eq!(detail.campaign.message, "Hello from WaBulk");
        assert!(detail.sent_numbers.is_empty());

        let page: CampaignListResponse = server.get("/api/v1/campaigns").await.json();
        assert_eq!(page.total, 1);
        assert_eq!(page.limit, 500);
        assert_eq!(page.campaigns[0].id, created.campaign.id);

        let filtered: CampaignListResponse = server
            .get("/api/v1/campaigns")
            .add_query_param("status", "finished")
            .await
            .json();
        assert_eq!(filtered.total, 0);
    }

    #[tokio::test]
    async fn test_create_rejections() {
        let server = test_server();

        let response = server
            .post("/api/v1/campaigns")
            .multipart(campaign_form("ab", "79990000001"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.error_code, "VALIDATION_ERROR");
        assert_eq!(body.http_status, 400);

        let response = server
            .post("/api/v1/campaigns")
            .multipart(campaign_form("Bad rate", "79990000001").add_text("messages_per_hour", "fast"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        create(&server, "First", "79990000001").await;
        let response = server
            .post("/api/v1/campaigns")
            .multipart(campaign_form("Second", "79990000002"))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let body: ErrorResponse = response.json();
        assert_eq!(body.error_code, "CAMPAIGN_ALREADY_RUNNING");
    }

    #[tokio::test]
    async fn test_unknown_campaign_and_bad_query() {
        let server = test_server();

        let response = server
            .get(&format!("/api/v1/campaigns/{}", Uuid::now_v7()))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: ErrorResponse = response.json();
        assert_eq!(body.error_code, "NOT_FOUND");

        server
            .post(&format!("/api/v1/campaigns/{}/start", Uuid::now_v7()))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        server
            .get("/api/v1/campaigns")
            .add_query_param("status", "paused")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_runs_to_completion() {
        let server = test_server();
        let created = create(&server, "Run it", "79990000001\n79990000002").await;
        let id = created.campaign.id;

        let started: StartCampaignResponse = server
            .post(&format!("/api/v1/campaigns/{}/start", id))
            .await
            .json();
        assert_eq!(started.status, "started");
        assert_eq!(started.total_numbers, 2);

        server
            .post(&format!("/api/v1/campaigns/{}/start", id))
            .await
            .assert_status(StatusCode::CONFLICT);

        let mut detail: CampaignDetailResponse = server
            .get(&format!("/api/v1/campaigns/{}", id))
            .await
            .json();
        for _ in 0..500 {
            if detail.campaign.status == "finished" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            detail = server.get(&format!("/api/v1/campaigns/{}", id)).await.json();
        }

        assert_eq!(detail.campaign.status, "finished");
        assert_eq!(detail.campaign.processed, 2);
        assert_eq!(detail.sent_numbers, vec!["79990000001", "79990000002"]);

        server
            .post(&format!("/api/v1/campaigns/{}/cancel", id))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_pending_campaign() {
        let server = test_server();
        let created = create(&server, "Call off", "79990000001,79990000002").await;
        let path = format!("/api/v1/campaigns/{}/cancel", created.campaign.id);

        server
            .post(&path)
            .json(&json!({ "reason": "x".repeat(501) }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let cancelled: CancelCampaignResponse = server
            .post(&path)
            .json(&json!({ "reason": "wrong audience" }))
            .await
            .json();
        assert_eq!(cancelled.status, "cancelled");
        assert_eq!(cancelled.cancelled_numbers, 2);
        assert_eq!(cancelled.already_sent_numbers, 0);
        assert_eq!(cancelled.reason.as_deref(), Some("wrong audience"));
        assert!(!cancelled.worker_stopped);
    }

    #[tokio::test]
    async fn test_settings_lifecycle() {
        let server = test_server();

        server
            .get("/api/v1/settings")
            .await
            .assert_status(StatusCode::NOT_FOUND);

        server
            .put("/api/v1/settings")
            .json(&json!({ "whatsapp_id": "wa-1", "api_key": "", "base_url": "https://whatsgate.ru/api/v1" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let updated: SettingsResponse = server
            .put("/api/v1/settings")
            .json(&json!({
                "whatsapp_id": "wa-1",
                "api_key": "secret-key-1234",
                "base_url": "https://whatsgate.ru/api/v1/"
            }))
            .await
            .json();
        assert_eq!(updated.api_key, "***********1234");
        assert_eq!(updated.base_url, "https://whatsgate.ru/api/v1");

        let stored: SettingsResponse = server.get("/api/v1/settings").await.json();
        assert_eq!(stored.whatsapp_id, "wa-1");

        server
            .delete("/api/v1/settings/reset")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get("/api/v1/settings")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_openapi_document_served() {
        let server = test_server();
        let doc: serde_json::Value = server.get("/api-docs/openapi.json").await.json();
        assert_eq!(doc["info"]["title"], "WaBulk API");
        server.get("/docs").await.assert_status_ok();
    }
}

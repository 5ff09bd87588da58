//! WaBulk - campaign server entry point

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wabulk_api::{create_router, AppState};
use wabulk_common::config::{Config, LoggingConfig};
use wabulk_core::campaigns::RESULT_DRAIN_TIMEOUT;
use wabulk_core::{
    CampaignRegistry, CampaignService, Dispatcher, RateLimiter, SettingsAwareGateway,
    SettingsService, SpreadsheetPhoneParser,
};
use wabulk_storage::Repositories;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration comes first so logging can honour it
    let config = Config::load()?;
    init_logging(&config.logging);

    info!("Starting WaBulk campaign server...");

    let repos = Repositories::connect(&config.database).await?;
    info!(backend = repos.backend(), "Storage ready");

    let gateway = Arc::new(SettingsAwareGateway::new(
        repos.settings.clone(),
        config.gateway.clone(),
    ));
    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let registry = Arc::new(CampaignRegistry::new());

    let dispatcher = Arc::new(Dispatcher::new(
        gateway.clone(),
        limiter.clone(),
        &config.dispatcher,
    ));
    dispatcher.start()?;

    let campaigns = Arc::new(CampaignService::new(
        repos.clone(),
        dispatcher.clone(),
        registry.clone(),
        limiter.clone(),
        Arc::new(SpreadsheetPhoneParser::new()),
    ));
    let settings = Arc::new(SettingsService::new(repos.settings.clone(), gateway));

    let state = Arc::new(AppState {
        campaigns: campaigns.clone(),
        settings,
        dispatcher: dispatcher.clone(),
        repos: repos.clone(),
    });
    let app = create_router(state, &config.http);

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;
    info!(addr = %addr, "WaBulk server started successfully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shutdown signal received");

    // Running campaigns finalize as cancelled
    let cancelled = registry.cancel_all();
    if !cancelled.is_empty() {
        info!(campaigns = cancelled.len(), "Cancelled running campaigns");
    }

    let stop_timeout = config.dispatcher.stop_timeout();
    if let Err(e) = dispatcher.stop(stop_timeout).await {
        error!(error = %e, "Dispatcher did not stop cleanly");
    }

    if let Err(e) = campaigns.shutdown(stop_timeout + RESULT_DRAIN_TIMEOUT).await {
        warn!(error = %e, "Campaign workers did not finish");
    }

    limiter.reset().await;
    repos.close().await;

    info!("WaBulk server shutdown complete");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

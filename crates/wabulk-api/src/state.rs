//! Shared handler state

use std::sync::Arc;
use wabulk_core::{CampaignService, Dispatcher, SettingsService};
use wabulk_storage::Repositories;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub campaigns: Arc<CampaignService>,
    pub settings: Arc<SettingsService>,
    pub dispatcher: Arc<Dispatcher>,
    pub repos: Repositories,
}

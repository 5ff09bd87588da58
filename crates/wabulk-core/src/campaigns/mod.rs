//! Campaign Service - Create, start, cancel and inspect bulk campaigns
//!
//! Starting a campaign hands its pending recipients to the [`Dispatcher`] and
//! spawns a result loop that persists every delivery outcome. The result loop
//! writes `finished` when the stream drains and `cancelled` when the
//! campaign's token fired. Terminal writes only apply to an active campaign,
//! so a status stored by [`CampaignService::cancel`] is never overwritten.

mod cancel;
mod create;
mod dto;
mod query;
mod start;
mod worker;


pub use dto::{
    CampaignDetail, CampaignPage, CampaignSummary, CancelledCampaign, CreateCampaign,
    CreatedCampaign, FailedNumber, ListCampaigns, MediaInfo, StartedCampaign, UploadedFile,
};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use wabulk_common::{Campaign, CampaignId, Error, Result};
use wabulk_storage::Repositories;

use crate::delivery::{CampaignRegistry, Dispatcher, RateLimiter};
use crate::parser::PhoneFileParser;

/// How long a cancelled campaign keeps draining results already in flight
pub const RESULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Campaign use cases
pub struct CampaignService {
    repos: Repositories,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<CampaignRegistry>,
    limiter: Arc<RateLimiter>,
    parser: Arc<dyn PhoneFileParser>,
    /// Serialises the single-active-campaign check with the insert
    create_lock: Mutex<()>,
    workers: TaskTracker,
    drain_timeout: Duration,
}

impl CampaignService {
    pub fn new(
        repos: Repositories,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<CampaignRegistry>,
        limiter: Arc<RateLimiter>,
        parser: Arc<dyn PhoneFileParser>,
    ) -> Self {
        Self {
            repos,
            dispatcher,
            registry,
            limiter,
            parser,
            create_lock: Mutex::new(()),
            workers: TaskTracker::new(),
            drain_timeout: RESULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<CampaignRegistry> {
        &self.registry
    }

    /// Number of result loops still running
    pub fn running_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting result loops and wait up to `timeout` for running ones
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.workers.close();
        let running = self.workers.len();

        match tokio::time::timeout(timeout, self.workers.wait()).await {
            Ok(()) => {
                info!(workers = running, "Campaign workers finished");
                Ok(())
            }
            Err(_) => {
                warn!(
                    workers = self.workers.len(),
                    "Timed out waiting for campaign workers"
                );
                Err(Error::Timeout(format!(
                    "{} campaign workers still running",
                    self.workers.len()
                )))
            }
        }
    }

    async fn load(&self, id: CampaignId) -> Result<Campaign> {
        self.repos
            .campaigns
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {} not found", id)))
    }
}

//! Per-campaign result loop

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wabulk_common::{CampaignId, CampaignStatus, Error, RecipientStatus, Result};
use wabulk_storage::Repositories;

use crate::delivery::{CampaignRegistry, MessageSendResult, RateLimiter};

pub(super) struct ResultWorker {
    pub campaign_id: CampaignId,
    pub repos: Repositories,
    pub registry: Arc<CampaignRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub cancel: CancellationToken,
    pub drain_timeout: Duration,
}

/// Unregisters the campaign however the loop ends
struct Registration {
    registry: Arc<CampaignRegistry>,
    campaign_id: CampaignId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.campaign_id);
    }
}

impl ResultWorker {
    pub async fn run(self, mut stream: mpsc::Receiver<MessageSendResult>) {
        let _registration = Registration {
            registry: self.registry.clone(),
            campaign_id: self.campaign_id,
        };
        info!(campaign_id = %self.campaign_id, "Result processing started");

        let cancelled = loop {
            tokio::select! {
                biased;
                next = stream.recv() => match next {
                    Some(result) => self.record(result).await,
                    None => break self.cancel.is_cancelled(),
                },
                _ = self.cancel.cancelled() => break true,
            }
        };

        if cancelled {
            self.drain(&mut stream).await;
        }

        self.finalize(cancelled).await;
        self.limiter.clear_campaign(self.campaign_id).await;
    }

    /// Record results the dispatcher still emits for messages already dequeued
    async fn drain(&self, stream: &mut mpsc::Receiver<MessageSendResult>) {
        let deadline = tokio::time::sleep(self.drain_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                next = stream.recv() => match next {
                    Some(result) => self.record(result).await,
                    None => return,
                },
                _ = &mut deadline => {
                    warn!(campaign_id = %self.campaign_id, "Gave up draining results of cancelled campaign");
                    return;
                }
            }
        }
    }

    async fn record(&self, result: MessageSendResult) {
        let status = if result.success {
            RecipientStatus::Sent
        } else if result.cancelled {
            RecipientStatus::Cancelled
        } else {
            RecipientStatus::Failed
        };

        if let Err(e) = self
            .repos
            .phone_statuses
            .update_by_phone_number(
                self.campaign_id,
                &result.phone_number,
                status,
                result.error.as_deref(),
            )
            .await
        {
            error!(
                campaign_id = %self.campaign_id,
                phone = %result.phone_number,
                error = %e,
                "Failed to update phone status"
            );
            return;
        }

        if status == RecipientStatus::Cancelled {
            return;
        }

        if let Err(e) = self
            .repos
            .campaigns
            .increment_processed_count(self.campaign_id)
            .await
        {
            error!(campaign_id = %self.campaign_id, error = %e, "Failed to increment processed count");
        }

        if status == RecipientStatus::Failed {
            if let Err(e) = self
                .repos
                .campaigns
                .increment_error_count(self.campaign_id)
                .await
            {
                error!(campaign_id = %self.campaign_id, error = %e, "Failed to increment error count");
            }
        }

        debug!(
            campaign_id = %self.campaign_id,
            phone = %result.phone_number,
            status = %status,
            "Delivery result recorded"
        );
    }

    async fn finalize(&self, cancelled: bool) {
        if let Err(e) = self.try_finalize(cancelled).await {
            error!(
                campaign_id = %self.campaign_id,
                cancelled,
                error = %e,
                "Failed to finalize campaign"
            );
        }
    }

    async fn try_finalize(&self, cancelled: bool) -> Result<()> {
        let statuses = &self.repos.phone_statuses;

        if cancelled {
            let rows = statuses
                .update_statuses_by_campaign_id(
                    self.campaign_id,
                    RecipientStatus::Pending,
                    RecipientStatus::Cancelled,
                )
                .await?;
            debug!(campaign_id = %self.campaign_id, rows, "Pending recipients cancelled");
        }

        // Persisted rows are authoritative over the running counters
        let sent = statuses
            .count_statuses_by_campaign_id(self.campaign_id, RecipientStatus::Sent)
            .await?;
        let failed = statuses
            .count_statuses_by_campaign_id(self.campaign_id, RecipientStatus::Failed)
            .await?;

        let processed = i32::try_from(sent + failed).unwrap_or(i32::MAX);
        let errors = i32::try_from(failed).unwrap_or(i32::MAX);
        let target = if cancelled {
            CampaignStatus::Cancelled
        } else {
            CampaignStatus::Finished
        };

        // A concurrent cancel may already have stored a terminal status
        let stored = match self
            .repos
            .campaigns
            .finalize_if_active(self.campaign_id, target, Some((processed, errors)))
            .await
        {
            Ok(stored) => stored,
            Err(Error::NotFound(_)) => {
                warn!(campaign_id = %self.campaign_id, "Campaign disappeared before finalization");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if stored != target {
            debug!(campaign_id = %self.campaign_id, status = %stored, "Campaign was already terminal");
        }

        info!(
            campaign_id = %self.campaign_id,
            status = %stored,
            processed,
            errors,
            "Campaign finalized"
        );
        Ok(())
    }
}

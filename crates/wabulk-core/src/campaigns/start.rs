use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wabulk_common::{CampaignId, CampaignStatus, Error, RecipientStatus, Result};

use super::dto::StartedCampaign;
use super::worker::ResultWorker;
use super::CampaignService;
use crate::delivery::{DispatchError, DispatchJob, OutboundMessage, RegistryError};

impl CampaignService {
    /// Move a pending campaign to `started` and hand its recipients to the dispatcher
    pub async fn start(&self, id: CampaignId) -> Result<StartedCampaign> {
        let mut campaign = self.load(id).await?;

        if campaign.status() != CampaignStatus::Pending {
            warn!(campaign_id = %id, status = %campaign.status(), "Campaign cannot be started");
            return Err(Error::non_startable(campaign.status()));
        }

        let statuses = self
            .repos
            .phone_statuses
            .list_by_campaign_and_status(id, RecipientStatus::Pending)
            .await?;
        if statuses.is_empty() || !campaign.can_be_started() {
            return Err(Error::Validation(format!(
                "campaign cannot be started: no phone numbers found for campaign {}",
                id
            )));
        }

        let cancel = CancellationToken::new();
        self.registry
            .register(id, cancel.clone())
            .map_err(|e| match e {
                RegistryError::AlreadyRegistered(_) => Error::campaign_already_running(),
                other => Error::Internal(other.to_string()),
            })?;

        campaign.start()?;
        if let Err(e) = self
            .repos
            .campaigns
            .update_status(id, CampaignStatus::Started)
            .await
        {
            self.registry.unregister(id);
            error!(campaign_id = %id, error = %e, "Failed to mark campaign started");
            return Err(e);
        }

        let media = campaign.media().cloned().map(Arc::new);
        let messages: Vec<OutboundMessage> = statuses
            .iter()
            .map(|status| OutboundMessage {
                phone_number: status.phone_number().clone(),
                text: campaign.message().to_string(),
                media: media.clone(),
            })
            .collect();
        let total_numbers = messages.len();

        let job = DispatchJob {
            campaign_id: id,
            messages_per_hour: campaign.messages_per_hour(),
            messages,
            cancel: cancel.clone(),
        };

        let stream = match self.dispatcher.submit(job).await {
            Ok(stream) => stream,
            Err(e) => {
                self.registry.unregister(id);
                cancel.cancel();
                if let Err(db_err) = self
                    .repos
                    .campaigns
                    .finalize_if_active(id, CampaignStatus::Failed, None)
                    .await
                {
                    error!(campaign_id = %id, error = %db_err, "Failed to mark campaign failed");
                }
                error!(campaign_id = %id, error = %e, "Failed to submit job to dispatcher");
                return Err(match e {
                    DispatchError::Closed | DispatchError::NotRunning => Error::BusinessLogic {
                        message: format!("failed to submit job to dispatcher: {}", e),
                        retryable: true,
                    },
                    other => Error::Internal(format!(
                        "failed to submit job to dispatcher: {}",
                        other
                    )),
                });
            }
        };

        let worker = ResultWorker {
            campaign_id: id,
            repos: self.repos.clone(),
            registry: self.registry.clone(),
            limiter: self.limiter.clone(),
            cancel,
            drain_timeout: self.drain_timeout,
        };
        self.workers.spawn(worker.run(stream));

        let estimated_completion = format!(
            "{:.1} hours",
            total_numbers as f64 / f64::from(campaign.messages_per_hour().max(1))
        );

        info!(
            campaign_id = %id,
            total = total_numbers,
            messages_per_hour = campaign.messages_per_hour(),
            "Campaign started"
        );

        Ok(StartedCampaign {
            campaign_id: id,
            status: campaign.status(),
            total_numbers,
            estimated_completion,
            worker_started: true,
        })
    }
}

use tracing::{info, warn};
use wabulk_common::{CampaignId, CampaignStatus, Error, RecipientStatus, Result};

use super::dto::CancelledCampaign;
use super::CampaignService;

impl CampaignService {
    /// Cancel a pending or running campaign. Once this returns no recipient
    /// of the campaign is left pending.
    pub async fn cancel(&self, id: CampaignId, reason: Option<String>) -> Result<CancelledCampaign> {
        let campaign = self.load(id).await?;
        if !campaign.can_be_cancelled() {
            warn!(campaign_id = %id, status = %campaign.status(), "Campaign cannot be cancelled");
            return Err(Error::non_cancellable(campaign.status()));
        }

        // A campaign that is not registered has no worker, or its worker already finished
        let worker_stopped = match self.registry.cancel(id) {
            Ok(()) => true,
            Err(e) => {
                warn!(campaign_id = %id, error = %e, "Campaign not running, updating status only");
                false
            }
        };

        // The worker may have finalized the campaign in the meantime
        let status = self
            .repos
            .campaigns
            .finalize_if_active(id, CampaignStatus::Cancelled, None)
            .await?;
        if status != CampaignStatus::Cancelled {
            info!(campaign_id = %id, status = %status, "Campaign already completed");
        }

        let cancelled_rows = self
            .repos
            .phone_statuses
            .update_statuses_by_campaign_id(id, RecipientStatus::Pending, RecipientStatus::Cancelled)
            .await?;

        let statuses = &self.repos.phone_statuses;
        let cancelled_numbers = statuses
            .count_statuses_by_campaign_id(id, RecipientStatus::Cancelled)
            .await?;
        let already_sent_numbers = statuses
            .count_statuses_by_campaign_id(id, RecipientStatus::Sent)
            .await?;

        info!(
            campaign_id = %id,
            status = %status,
            cancelled_rows,
            reason = reason.as_deref().unwrap_or(""),
            "Campaign cancelled"
        );

        Ok(CancelledCampaign {
            campaign_id: id,
            status,
            cancelled_numbers,
            already_sent_numbers,
            total_numbers: campaign.total(),
            worker_stopped,
            reason,
        })
    }
}

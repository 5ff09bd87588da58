use wabulk_common::{CampaignId, RecipientStatus, Result};

use super::dto::{CampaignDetail, CampaignPage, CampaignSummary, FailedNumber, ListCampaigns};
use super::CampaignService;

pub const DEFAULT_LIST_LIMIT: i64 = 500;
pub const MAX_LIST_LIMIT: i64 = 1000;

impl CampaignService {
    pub async fn get(&self, id: CampaignId) -> Result<CampaignDetail> {
        let campaign = self.load(id).await?;
        let statuses = self.repos.phone_statuses.list_by_campaign_id(id).await?;

        let mut sent_numbers = Vec::new();
        let mut failed_numbers = Vec::new();
        for status in statuses {
            match status.status() {
                RecipientStatus::Sent => sent_numbers.push(status.phone_number().clone()),
                RecipientStatus::Failed => failed_numbers.push(FailedNumber {
                    phone_number: status.phone_number().clone(),
                    error: status.error().map(str::to_string),
                }),
                RecipientStatus::Pending | RecipientStatus::Cancelled => {}
            }
        }

        Ok(CampaignDetail {
            campaign: CampaignSummary::from(&campaign),
            sent_numbers,
            failed_numbers,
        })
    }

    pub async fn list(&self, query: ListCampaigns) -> Result<CampaignPage> {
        let limit = if query.limit <= 0 {
            DEFAULT_LIST_LIMIT
        } else {
            query.limit.min(MAX_LIST_LIMIT)
        };
        let offset = query.offset.max(0);
        let campaigns = &self.repos.campaigns;

        let (rows, total) = match query.status {
            Some(status) => (
                campaigns.list_by_status(status, limit, offset).await?,
                campaigns.count_by_status(status).await?,
            ),
            None => (
                campaigns.list(limit, offset).await?,
                campaigns.count().await?,
            ),
        };

        Ok(CampaignPage {
            campaigns: rows.iter().map(CampaignSummary::from).collect(),
            total,
            limit,
            offset,
        })
    }
}

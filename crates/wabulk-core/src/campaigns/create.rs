use tracing::{info, warn};
use wabulk_common::campaign::{MAX_MESSAGES_PER_HOUR, MIN_MESSAGES_PER_HOUR};
use wabulk_common::config::MAX_MEDIA_BYTES;
use wabulk_common::{Campaign, CampaignPhoneStatus, Error, PhoneNumber, Result};

use super::dto::{CampaignSummary, CreateCampaign, CreatedCampaign};
use super::CampaignService;

pub const MIN_NAME_LENGTH: usize = 3;
pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_MESSAGE_LENGTH: usize = 4096;
/// Ceiling for the additional and excluded number lists
pub const MAX_EXTRA_NUMBERS: usize = 1000;

impl CampaignService {
    /// Create a pending campaign with one pending status row per recipient
    pub async fn create(&self, request: CreateCampaign) -> Result<CreatedCampaign> {
        self.validate_create(&request)?;

        let _guard = self.create_lock.lock().await;

        if !self.repos.campaigns.get_active().await?.is_empty() {
            warn!(name = %request.name, "Rejected campaign create while another is active");
            return Err(Error::campaign_already_running());
        }

        let mut campaign = Campaign::new(
            request.name.trim(),
            request.message.as_str(),
            request.messages_per_hour,
        )?;
        if let Some(initiator) = &request.initiator {
            campaign.set_initiator(initiator.trim());
        }

        let mut warnings = Vec::new();
        let mut invalid_phones = 0;

        if let Some(file) = &request.file {
            let parsed =
                self.parser
                    .parse(&file.filename, &file.data, request.phone_column.as_deref())?;
            invalid_phones += parsed.statistics.invalid;
            warnings.extend(parsed.warnings);
            campaign.add_primary(parsed.phones)?;
        }

        let mut additional = Vec::with_capacity(request.additional_numbers.len());
        let mut invalid_additional = 0;
        for raw in request.additional_numbers.iter().filter(|n| !n.trim().is_empty()) {
            match PhoneNumber::parse(raw) {
                Ok(phone) => additional.push(phone),
                Err(_) => invalid_additional += 1,
            }
        }
        invalid_phones += invalid_additional;
        campaign.add_additional(additional)?;

        // Invalid exclusions cannot match anything
        let excluded: Vec<PhoneNumber> = request
            .exclude_numbers
            .iter()
            .filter_map(|raw| PhoneNumber::parse(raw).ok())
            .collect();
        campaign.add_excluded(excluded)?;

        let targets = campaign.audience().effective_targets();
        if targets.is_empty() {
            return Err(Error::Validation("no phone numbers provided".to_string()));
        }

        if let Some(media) = request.media {
            campaign.set_media(media)?;
        }

        self.repos.campaigns.save(&campaign).await?;

        let mut failed_rows = 0usize;
        for phone in &targets {
            let status = CampaignPhoneStatus::new(campaign.id(), phone.clone());
            if let Err(e) = self.repos.phone_statuses.save(&status).await {
                warn!(
                    campaign_id = %campaign.id(),
                    phone = %phone,
                    error = %e,
                    "Failed to save phone status"
                );
                failed_rows += 1;
            }
        }

        if failed_rows == targets.len() {
            if let Err(e) = self.repos.campaigns.delete(campaign.id()).await {
                warn!(campaign_id = %campaign.id(), error = %e, "Failed to remove campaign without recipients");
            }
            return Err(Error::Database(
                "failed to save phone statuses for campaign".to_string(),
            ));
        }

        if failed_rows > 0 {
            let saved = targets.len() - failed_rows;
            warnings.push(format!(
                "Failed to save {} of {} phone numbers",
                failed_rows,
                targets.len()
            ));
            campaign
                .metrics_mut()
                .set_total(i32::try_from(saved).unwrap_or(i32::MAX));
            self.repos.campaigns.update(&campaign).await?;
        }

        let excluded_count = campaign.audience().excluded_count();
        if excluded_count > 0 {
            warnings.push(format!("Excluded {} numbers", excluded_count));
        }
        if invalid_additional > 0 {
            warnings.push(format!("Skipped {} invalid numbers", invalid_additional));
        }

        info!(
            campaign_id = %campaign.id(),
            name = %campaign.name(),
            total = campaign.total(),
            invalid = invalid_phones,
            "Campaign created"
        );

        Ok(CreatedCampaign {
            campaign: CampaignSummary::from(&campaign),
            valid_phones: targets.len() - failed_rows,
            invalid_phones,
            total_numbers: campaign.total(),
            warnings,
        })
    }

    fn validate_create(&self, request: &CreateCampaign) -> Result<()> {
        let name_len = request.name.trim().chars().count();
        if name_len == 0 {
            return Err(Error::Validation("campaign name is required".to_string()));
        }
        if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&name_len) {
            return Err(Error::Validation(format!(
                "campaign name must be between {} and {} characters",
                MIN_NAME_LENGTH, MAX_NAME_LENGTH
            )));
        }

        if request.message.trim().is_empty() {
            return Err(Error::Validation("campaign message is required".to_string()));
        }
        if request.message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(Error::Validation(format!(
                "campaign message is too long (max {} characters)",
                MAX_MESSAGE_LENGTH
            )));
        }

        if !(MIN_MESSAGES_PER_HOUR..=MAX_MESSAGES_PER_HOUR).contains(&request.messages_per_hour) {
            return Err(Error::Validation(format!(
                "invalid messages per hour rate: {} (allowed {}..={})",
                request.messages_per_hour, MIN_MESSAGES_PER_HOUR, MAX_MESSAGES_PER_HOUR
            )));
        }

        if request.additional_numbers.len() > MAX_EXTRA_NUMBERS {
            return Err(Error::Validation(format!(
                "too many additional numbers: {} (max {})",
                request.additional_numbers.len(),
                MAX_EXTRA_NUMBERS
            )));
        }
        if request.exclude_numbers.len() > MAX_EXTRA_NUMBERS {
            return Err(Error::Validation(format!(
                "too many excluded numbers: {} (max {})",
                request.exclude_numbers.len(),
                MAX_EXTRA_NUMBERS
            )));
        }

        let has_additional = request
            .additional_numbers
            .iter()
            .any(|n| !n.trim().is_empty());
        if request.file.is_none() && !has_additional {
            return Err(Error::Validation("no phone numbers provided".to_string()));
        }

        if let Some(file) = &request.file {
            if !self.parser.is_supported(&file.filename) {
                return Err(Error::Validation(format!(
                    "unsupported file type: {}",
                    file.filename
                )));
            }
        }

        if let Some(media) = &request.media {
            if media.size() > MAX_MEDIA_BYTES {
                return Err(Error::Validation(format!(
                    "media file too large: {} bytes (max {})",
                    media.size(),
                    MAX_MEDIA_BYTES
                )));
            }
            if !media.is_valid() {
                return Err(Error::Validation(
                    "invalid media file: unsupported format".to_string(),
                ));
            }
        }

        Ok(())
    }
}

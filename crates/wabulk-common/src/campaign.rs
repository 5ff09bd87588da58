//! Campaign aggregate and per-recipient delivery records
//!
//! A [`Campaign`] owns its audience, metrics and delivery records. Every
//! state change goes through its methods so the lifecycle rules hold:
//!
//! ```text
//! pending ──start──▶ started ──finish──▶ finished
//!    │                  │ └────fail────▶ failed
//!    └──────cancel──────┴─────cancel───▶ cancelled
//! ```
//!
//! Terminal states never transition again.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::types::{
    CampaignId, CampaignStatus, Media, PhoneNumber, PhoneStatusId, RecipientStatus,
};
use crate::{Error, Result};

/// Lowest accepted sending rate
pub const MIN_MESSAGES_PER_HOUR: i32 = 1;
/// Highest accepted sending rate
pub const MAX_MESSAGES_PER_HOUR: i32 = 3600;

/// Recipients of a campaign
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetAudience {
    primary: Vec<PhoneNumber>,
    additional: Vec<PhoneNumber>,
    excluded: Vec<PhoneNumber>,
}

impl TargetAudience {
    pub fn new(
        primary: Vec<PhoneNumber>,
        additional: Vec<PhoneNumber>,
        excluded: Vec<PhoneNumber>,
    ) -> Self {
        Self {
            primary,
            additional,
            excluded,
        }
    }

    pub fn primary(&self) -> &[PhoneNumber] {
        &self.primary
    }

    pub fn additional(&self) -> &[PhoneNumber] {
        &self.additional
    }

    pub fn excluded(&self) -> &[PhoneNumber] {
        &self.excluded
    }

    /// dedup(primary ++ additional) minus excluded, first-seen order
    pub fn effective_targets(&self) -> Vec<PhoneNumber> {
        let excluded: HashSet<&PhoneNumber> = self.excluded.iter().collect();
        let mut seen = HashSet::new();
        self.primary
            .iter()
            .chain(self.additional.iter())
            .filter(|phone| !excluded.contains(phone))
            .filter(|phone| seen.insert(*phone))
            .cloned()
            .collect()
    }

    /// Number of primary/additional entries removed by the exclusion list
    pub fn excluded_count(&self) -> usize {
        let candidates: HashSet<&PhoneNumber> =
            self.primary.iter().chain(self.additional.iter()).collect();
        let excluded: HashSet<&PhoneNumber> = self.excluded.iter().collect();
        candidates.intersection(&excluded).count()
    }
}

/// Progress counters of a campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignMetrics {
    total: i32,
    processed: i32,
    errors: i32,
}

impl CampaignMetrics {
    /// Counters are clamped so that `errors <= processed <= total`
    pub fn new(total: i32, processed: i32, errors: i32) -> Self {
        let total = total.max(0);
        let processed = processed.clamp(0, total);
        let errors = errors.clamp(0, processed);
        Self {
            total,
            processed,
            errors,
        }
    }

    pub fn total(&self) -> i32 {
        self.total
    }

    pub fn processed(&self) -> i32 {
        self.processed
    }

    pub fn errors(&self) -> i32 {
        self.errors
    }

    pub fn set_total(&mut self, total: i32) {
        *self = Self::new(total, self.processed, self.errors);
    }

    pub fn mark_processed(&mut self) {
        if self.processed < self.total {
            self.processed += 1;
        }
    }

    pub fn mark_error(&mut self) {
        if self.errors < self.processed {
            self.errors += 1;
        }
    }

    /// Fraction of processed recipients in `0.0..=1.0`
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.processed) / f64::from(self.total)
    }

    pub fn is_completed(&self) -> bool {
        self.total > 0 && self.processed >= self.total
    }
}

/// Delivery record for one recipient of a campaign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignPhoneStatus {
    id: PhoneStatusId,
    campaign_id: CampaignId,
    phone_number: PhoneNumber,
    status: RecipientStatus,
    error: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl CampaignPhoneStatus {
    pub fn new(campaign_id: CampaignId, phone_number: PhoneNumber) -> Self {
        Self {
            id: Uuid::now_v7(),
            campaign_id,
            phone_number,
            status: RecipientStatus::Pending,
            error: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    /// Rebuild a record loaded from storage
    pub fn restore(
        id: PhoneStatusId,
        campaign_id: CampaignId,
        phone_number: PhoneNumber,
        status: RecipientStatus,
        error: Option<String>,
        sent_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            campaign_id,
            phone_number,
            status,
            error,
            sent_at,
            created_at,
        }
    }

    pub fn id(&self) -> PhoneStatusId {
        self.id
    }

    pub fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    pub fn phone_number(&self) -> &PhoneNumber {
        &self.phone_number
    }

    pub fn status(&self) -> RecipientStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == RecipientStatus::Pending
    }

    pub fn mark_sent(&mut self) -> Result<()> {
        self.require_pending("sent")?;
        self.status = RecipientStatus::Sent;
        self.sent_at = Some(Utc::now());
        self.error = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.require_pending("failed")?;
        let error = error.into();
        self.status = RecipientStatus::Failed;
        self.error = Some(if error.is_empty() {
            "unknown error".to_string()
        } else {
            error
        });
        self.sent_at = None;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.require_pending("cancelled")?;
        self.status = RecipientStatus::Cancelled;
        Ok(())
    }

    /// Return a failed recipient to the queue
    pub fn retry(&mut self) -> Result<()> {
        if self.status != RecipientStatus::Failed {
            return Err(Error::Validation(format!(
                "only failed recipients can be retried, {} is {}",
                self.phone_number, self.status
            )));
        }
        self.status = RecipientStatus::Pending;
        self.error = None;
        Ok(())
    }

    fn require_pending(&self, target: &str) -> Result<()> {
        if self.status == RecipientStatus::Pending {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "recipient {} cannot move from {} to {}",
                self.phone_number, self.status, target
            )))
        }
    }
}

/// Delivery records held by a campaign
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStatus {
    records: Vec<CampaignPhoneStatus>,
}

impl DeliveryStatus {
    pub fn add(&mut self, record: CampaignPhoneStatus) {
        self.records.push(record);
    }

    /// Flip every pending record to cancelled, returning how many changed
    pub fn cancel_pending(&mut self) -> usize {
        self.records
            .iter_mut()
            .filter_map(|record| record.cancel().ok())
            .count()
    }

    pub fn for_phone(&self, phone: &PhoneNumber) -> Option<&CampaignPhoneStatus> {
        self.records.iter().find(|r| r.phone_number() == phone)
    }

    pub fn sent(&self) -> impl Iterator<Item = &CampaignPhoneStatus> {
        self.with_status(RecipientStatus::Sent)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CampaignPhoneStatus> {
        self.with_status(RecipientStatus::Failed)
    }

    pub fn pending(&self) -> impl Iterator<Item = &CampaignPhoneStatus> {
        self.with_status(RecipientStatus::Pending)
    }

    pub fn all(&self) -> &[CampaignPhoneStatus] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn with_status(&self, status: RecipientStatus) -> impl Iterator<Item = &CampaignPhoneStatus> {
        self.records.iter().filter(move |r| r.status() == status)
    }
}

/// Persisted state of a campaign, used to rebuild the aggregate
#[derive(Debug, Clone)]
pub struct CampaignSnapshot {
    pub id: CampaignId,
    pub name: String,
    pub message: String,
    pub media: Option<Media>,
    pub messages_per_hour: i32,
    pub initiator: Option<String>,
    pub status: CampaignStatus,
    pub total: i32,
    pub processed: i32,
    pub errors: i32,
    pub created_at: DateTime<Utc>,
}

/// Bulk messaging campaign
#[derive(Debug, Clone)]
pub struct Campaign {
    id: CampaignId,
    name: String,
    message: String,
    media: Option<Media>,
    messages_per_hour: i32,
    initiator: Option<String>,
    status: CampaignStatus,
    audience: TargetAudience,
    metrics: CampaignMetrics,
    delivery: DeliveryStatus,
    created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        messages_per_hour: i32,
    ) -> Result<Self> {
        let name = name.into();
        let message = message.into();

        if name.trim().is_empty() {
            return Err(Error::Validation("campaign name is required".to_string()));
        }
        if message.trim().is_empty() {
            return Err(Error::Validation("campaign message is required".to_string()));
        }
        if !(MIN_MESSAGES_PER_HOUR..=MAX_MESSAGES_PER_HOUR).contains(&messages_per_hour) {
            return Err(Error::Validation(format!(
                "invalid messages per hour rate: {} (allowed {}..={})",
                messages_per_hour, MIN_MESSAGES_PER_HOUR, MAX_MESSAGES_PER_HOUR
            )));
        }

        Ok(Self {
            id: Uuid::now_v7(),
            name,
            message,
            media: None,
            messages_per_hour,
            initiator: None,
            status: CampaignStatus::Pending,
            audience: TargetAudience::default(),
            metrics: CampaignMetrics::default(),
            delivery: DeliveryStatus::default(),
            created_at: Utc::now(),
        })
    }

    /// Rebuild a campaign loaded from storage. The audience is not persisted
    /// separately; delivery records live in their own table.
    pub fn from_snapshot(snapshot: CampaignSnapshot) -> Self {
        Self {
            id: snapshot.id,
            name: snapshot.name,
            message: snapshot.message,
            media: snapshot.media,
            messages_per_hour: snapshot.messages_per_hour,
            initiator: snapshot.initiator,
            status: snapshot.status,
            audience: TargetAudience::default(),
            metrics: CampaignMetrics::new(snapshot.total, snapshot.processed, snapshot.errors),
            delivery: DeliveryStatus::default(),
            created_at: snapshot.created_at,
        }
    }

    pub fn id(&self) -> CampaignId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn media(&self) -> Option<&Media> {
        self.media.as_ref()
    }

    pub fn messages_per_hour(&self) -> i32 {
        self.messages_per_hour
    }

    pub fn initiator(&self) -> Option<&str> {
        self.initiator.as_deref()
    }

    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn audience(&self) -> &TargetAudience {
        &self.audience
    }

    pub fn metrics(&self) -> &CampaignMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut CampaignMetrics {
        &mut self.metrics
    }

    pub fn delivery(&self) -> &DeliveryStatus {
        &self.delivery
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn total(&self) -> i32 {
        self.metrics.total()
    }

    /// Add numbers from the uploaded spreadsheet
    pub fn add_primary(&mut self, phones: Vec<PhoneNumber>) -> Result<()> {
        if phones.is_empty() {
            return Err(Error::Validation("no phone numbers provided".to_string()));
        }
        self.require_modifiable()?;
        self.audience.primary.extend(phones);
        self.recount_total();
        Ok(())
    }

    pub fn add_additional(&mut self, phones: Vec<PhoneNumber>) -> Result<()> {
        self.require_modifiable()?;
        self.audience.additional.extend(phones);
        self.recount_total();
        Ok(())
    }

    pub fn add_excluded(&mut self, phones: Vec<PhoneNumber>) -> Result<()> {
        self.require_modifiable()?;
        self.audience.excluded.extend(phones);
        self.recount_total();
        Ok(())
    }

    pub fn set_media(&mut self, media: Media) -> Result<()> {
        if !media.is_valid() {
            return Err(Error::Validation(
                "invalid media file: unsupported format".to_string(),
            ));
        }
        self.require_modifiable()?;
        self.media = Some(media);
        Ok(())
    }

    pub fn set_initiator(&mut self, initiator: impl Into<String>) {
        let initiator = initiator.into();
        self.initiator = if initiator.trim().is_empty() {
            None
        } else {
            Some(initiator)
        };
    }

    /// Set `total` from the effective send set
    pub fn recount_total(&mut self) -> i32 {
        let total = i32::try_from(self.audience.effective_targets().len()).unwrap_or(i32::MAX);
        self.metrics.set_total(total);
        total
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn can_be_started(&self) -> bool {
        self.status == CampaignStatus::Pending && self.metrics.total() > 0
    }

    pub fn can_be_cancelled(&self) -> bool {
        matches!(self.status, CampaignStatus::Pending | CampaignStatus::Started)
    }

    pub fn can_be_modified(&self) -> bool {
        self.status == CampaignStatus::Pending
    }

    pub fn progress(&self) -> f64 {
        self.metrics.progress()
    }

    /// pending -> started; creates one pending delivery record per target
    pub fn start(&mut self) -> Result<()> {
        if self.status != CampaignStatus::Pending {
            return Err(Error::non_startable(self.status));
        }
        if self.metrics.total() == 0 {
            return Err(Error::Validation("no phone numbers provided".to_string()));
        }

        self.status = CampaignStatus::Started;
        self.delivery = DeliveryStatus::default();
        for phone in self.audience.effective_targets() {
            self.delivery.add(CampaignPhoneStatus::new(self.id, phone));
        }
        Ok(())
    }

    /// Move to cancelled and cancel pending delivery records
    pub fn cancel(&mut self) -> Result<usize> {
        if self.status.is_terminal() {
            return Err(Error::non_cancellable(self.status));
        }
        self.status = CampaignStatus::Cancelled;
        Ok(self.delivery.cancel_pending())
    }

    /// Natural completion, only from started
    pub fn finish(&mut self) {
        if self.status == CampaignStatus::Started {
            self.status = CampaignStatus::Finished;
        }
    }

    /// Mark an unrecoverable run. Terminal campaigns are left untouched.
    pub fn fail(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = CampaignStatus::Failed;
        true
    }

    fn require_modifiable(&self) -> Result<()> {
        if self.can_be_modified() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "campaign in status {} cannot be modified",
                self.status
            )))
        }
    }
}

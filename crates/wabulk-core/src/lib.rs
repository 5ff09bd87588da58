//! WaBulk Core - campaign execution engine
//!
//! This crate provides the campaign lifecycle (create, start, cancel), the
//! fair round-robin dispatcher with per-campaign rate limiting, the WhatsGate
//! gateway and the spreadsheet phone importer.

pub mod campaigns;
pub mod delivery;
pub mod gateway;
pub mod parser;
pub mod settings;

pub use campaigns::{
    CampaignDetail, CampaignPage, CampaignService, CampaignSummary, CancelledCampaign,
    CreateCampaign, CreatedCampaign, ListCampaigns, StartedCampaign, UploadedFile,
};
pub use delivery::{CampaignRegistry, Dispatcher, DispatcherSnapshot, RateLimiter};
pub use gateway::{MessageGateway, SettingsAwareGateway, WhatsgateClient};
pub use parser::{PhoneFileParser, SpreadsheetPhoneParser};
pub use settings::SettingsService;

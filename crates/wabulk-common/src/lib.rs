//! WaBulk Common - Shared types and utilities
//!
//! This crate provides configuration, the error taxonomy, value types and
//! the campaign aggregate shared across all WaBulk components.

pub mod campaign;
pub mod config;
pub mod error;
pub mod settings;
pub mod types;

pub use campaign::{
    Campaign, CampaignMetrics, CampaignPhoneStatus, CampaignSnapshot, DeliveryStatus,
    TargetAudience,
};
pub use config::Config;
pub use error::{Error, ErrorSeverity, Result};
pub use settings::WhatsgateSettings;
pub use types::{CampaignId, CampaignStatus, Media, MessageType, PhoneNumber, RecipientStatus};

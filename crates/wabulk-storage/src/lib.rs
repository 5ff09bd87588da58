//! WaBulk Storage - Campaign and settings persistence
//!
//! Repository traits with PostgreSQL implementations backed by sqlx and
//! in-memory implementations for tests and single-node trials.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::{MemoryCampaignRepository, MemoryPhoneStatusRepository, MemorySettingsRepository};
pub use repository::*;

//! Campaign Registry - Running campaigns and their cancellation tokens

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use wabulk_common::CampaignId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("campaign {0} is already registered")]
    AlreadyRegistered(CampaignId),

    #[error("campaign {0} not found in registry")]
    NotFound(CampaignId),
}

/// In-process directory of running campaign workers.
///
/// Lookups never await, so the registry can be used from `Drop` guards.
#[derive(Default)]
pub struct CampaignRegistry {
    campaigns: RwLock<HashMap<CampaignId, CancellationToken>>,
}

impl CampaignRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        campaign_id: CampaignId,
        token: CancellationToken,
    ) -> Result<(), RegistryError> {
        let mut campaigns = self
            .campaigns
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if campaigns.contains_key(&campaign_id) {
            return Err(RegistryError::AlreadyRegistered(campaign_id));
        }
        campaigns.insert(campaign_id, token);
        debug!(campaign_id = %campaign_id, "Campaign registered");
        Ok(())
    }

    /// Remove a campaign without cancelling it; unknown ids are ignored
    pub fn unregister(&self, campaign_id: CampaignId) {
        let removed = self
            .campaigns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&campaign_id);
        if removed.is_some() {
            debug!(campaign_id = %campaign_id, "Campaign unregistered");
        }
    }

    /// Cancel the campaign's token and remove it
    pub fn cancel(&self, campaign_id: CampaignId) -> Result<(), RegistryError> {
        let token = self
            .campaigns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&campaign_id)
            .ok_or(RegistryError::NotFound(campaign_id))?;
        token.cancel();
        info!(campaign_id = %campaign_id, "Campaign cancellation requested");
        Ok(())
    }

    pub fn is_active(&self, campaign_id: CampaignId) -> bool {
        self.campaigns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&campaign_id)
    }

    pub fn get_active(&self) -> Vec<CampaignId> {
        self.campaigns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Cancel every registered campaign, returning their ids
    pub fn cancel_all(&self) -> Vec<CampaignId> {
        let drained: Vec<(CampaignId, CancellationToken)> = self
            .campaigns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (_, token) in &drained {
            token.cancel();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Cancelled all running campaigns");
        }
        drained.into_iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = CampaignRegistry::new();
        let id = Uuid::now_v7();

        registry.register(id, CancellationToken::new()).unwrap();
        assert_eq!(
            registry.register(id, CancellationToken::new()),
            Err(RegistryError::AlreadyRegistered(id))
        );
        assert!(registry.is_active(id));
    }

    #[test]
    fn test_cancel_fires_token_and_removes() {
        let registry = CampaignRegistry::new();
        let id = Uuid::now_v7();
        let token = CancellationToken::new();
        registry.register(id, token.clone()).unwrap();

        registry.cancel(id).unwrap();
        assert!(token.is_cancelled());
        assert!(!registry.is_active(id));
        assert_eq!(registry.cancel(id), Err(RegistryError::NotFound(id)));
    }

    #[test]
    fn test_unregister_is_idempotent_and_does_not_cancel() {
        let registry = CampaignRegistry::new();
        let id = Uuid::now_v7();
        let token = CancellationToken::new();
        registry.register(id, token.clone()).unwrap();

        registry.unregister(id);
        registry.unregister(id);
        assert!(!token.is_cancelled());
        assert!(registry.get_active().is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let registry = CampaignRegistry::new();
        let tokens: Vec<(CampaignId, CancellationToken)> = (0..3)
            .map(|_| (Uuid::now_v7(), CancellationToken::new()))
            .collect();
        for (id, token) in &tokens {
            registry.register(*id, token.clone()).unwrap();
        }

        let mut cancelled = registry.cancel_all();
        cancelled.sort();
        let mut expected: Vec<CampaignId> = tokens.iter().map(|(id, _)| *id).collect();
        expected.sort();

        assert_eq!(cancelled, expected);
        assert!(tokens.iter().all(|(_, t)| t.is_cancelled()));
        assert!(registry.get_active().is_empty());
    }

    #[test]
    fn test_parallel_registration() {
        let registry = Arc::new(CampaignRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry
                        .register(Uuid::now_v7(), CancellationToken::new())
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.get_active().len(), 8);
    }
}

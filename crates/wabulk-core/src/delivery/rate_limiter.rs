//! Rate Limiter - Per-campaign send pacing
//!
//! Each campaign sends in batches of `messages_per_hour` messages spaced by
//! `send_interval`. After a full batch the campaign cools down until `pause`
//! has elapsed since the batch began.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wabulk_common::config::RateLimitConfig;
use wabulk_common::CampaignId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("campaign cancelled")]
    Cancelled,
}

#[derive(Debug)]
struct Window {
    batch_size: u32,
    sent_in_batch: u32,
    batch_start: Instant,
}

#[derive(Clone, Copy)]
enum Wait {
    None,
    Interval(Duration),
    NextBatch(Duration),
}

/// Rate limiter keyed by campaign
pub struct RateLimiter {
    send_interval: Duration,
    pause: Duration,
    default_batch_size: u32,
    windows: RwLock<HashMap<CampaignId, Arc<Mutex<Window>>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_timings(
            config.send_interval(),
            config.pause(),
            config.default_batch_size,
        )
    }

    pub fn with_timings(send_interval: Duration, pause: Duration, default_batch_size: u32) -> Self {
        Self {
            send_interval,
            pause,
            default_batch_size: default_batch_size.max(1),
            windows: RwLock::new(HashMap::new()),
        }
    }

    fn batch_size_for(&self, messages_per_hour: i32) -> u32 {
        u32::try_from(messages_per_hour)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(self.default_batch_size)
    }

    /// Install the batch size for a campaign; counters already in place are kept
    pub async fn set_rate_for_campaign(&self, campaign_id: CampaignId, messages_per_hour: i32) {
        let batch_size = self.batch_size_for(messages_per_hour);
        let existing = self.windows.read().await.get(&campaign_id).cloned();

        match existing {
            Some(window) => window.lock().await.batch_size = batch_size,
            None => {
                self.windows
                    .write()
                    .await
                    .entry(campaign_id)
                    .or_insert_with(|| Arc::new(Mutex::new(Self::fresh_window(batch_size))));
            }
        }

        debug!(campaign_id = %campaign_id, batch_size, "Rate installed");
    }

    /// Block until the next send of the campaign is admitted
    pub async fn wait_for_campaign(
        &self,
        campaign_id: CampaignId,
        cancel: &CancellationToken,
    ) -> Result<(), RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }

        let window = self.window(campaign_id).await;

        let wait = {
            let w = window.lock().await;
            if w.sent_in_batch >= w.batch_size {
                Wait::NextBatch(self.pause.saturating_sub(w.batch_start.elapsed()))
            } else if w.sent_in_batch > 0 {
                Wait::Interval(self.send_interval)
            } else {
                Wait::None
            }
        };

        let delay = match wait {
            Wait::None => Duration::ZERO,
            Wait::Interval(delay) => delay,
            Wait::NextBatch(delay) => {
                debug!(
                    campaign_id = %campaign_id,
                    pause_ms = delay.as_millis() as u64,
                    "Batch complete, pausing campaign"
                );
                delay
            }
        };

        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let mut w = window.lock().await;
        if matches!(wait, Wait::NextBatch(_)) {
            w.sent_in_batch = 0;
        }
        if w.sent_in_batch == 0 {
            w.batch_start = Instant::now();
        }
        w.sent_in_batch += 1;
        Ok(())
    }

    /// Forget a campaign's counters
    pub async fn clear_campaign(&self, campaign_id: CampaignId) {
        self.windows.write().await.remove(&campaign_id);
    }

    /// Clear all counters
    pub async fn reset(&self) {
        self.windows.write().await.clear();
    }

    async fn window(&self, campaign_id: CampaignId) -> Arc<Mutex<Window>> {
        if let Some(window) = self.windows.read().await.get(&campaign_id) {
            return window.clone();
        }

        self.windows
            .write()
            .await
            .entry(campaign_id)
            .or_insert_with(|| Arc::new(Mutex::new(Self::fresh_window(self.default_batch_size))))
            .clone()
    }

    fn fresh_window(batch_size: u32) -> Window {
        Window {
            batch_size,
            sent_in_batch: 0,
            batch_start: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const INTERVAL: Duration = Duration::from_millis(10);
    const PAUSE: Duration = Duration::from_millis(100);

    fn limiter() -> RateLimiter {
        RateLimiter::with_timings(INTERVAL, PAUSE, 20)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_send_is_immediate_then_spaced() {
        let limiter = limiter();
        let id = Uuid::now_v7();
        let cancel = CancellationToken::new();
        limiter.set_rate_for_campaign(id, 10).await;

        let start = Instant::now();
        limiter.wait_for_campaign(id, &cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.wait_for_campaign(id, &cancel).await.unwrap();
        assert!(start.elapsed() >= INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_message_rate_pauses_after_one_send() {
        let limiter = limiter();
        let id = Uuid::now_v7();
        let cancel = CancellationToken::new();
        limiter.set_rate_for_campaign(id, 1).await;

        let start = Instant::now();
        limiter.wait_for_campaign(id, &cancel).await.unwrap();
        limiter.wait_for_campaign(id, &cancel).await.unwrap();
        assert!(start.elapsed() >= PAUSE);

        // New batch began at the second send
        let second_batch = Instant::now();
        limiter.wait_for_campaign(id, &cancel).await.unwrap();
        assert!(second_batch.elapsed() >= PAUSE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pause() {
        let limiter = Arc::new(limiter());
        let id = Uuid::now_v7();
        let cancel = CancellationToken::new();
        limiter.set_rate_for_campaign(id, 1).await;
        limiter.wait_for_campaign(id, &cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.wait_for_campaign(id, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(RateLimitError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_token() {
        let limiter = limiter();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            limiter.wait_for_campaign(Uuid::now_v7(), &cancel).await,
            Err(RateLimitError::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_rate_uses_default_batch() {
        let limiter = RateLimiter::with_timings(INTERVAL, PAUSE, 2);
        let id = Uuid::now_v7();
        let cancel = CancellationToken::new();
        limiter.set_rate_for_campaign(id, 0).await;

        let start = Instant::now();
        limiter.wait_for_campaign(id, &cancel).await.unwrap();
        limiter.wait_for_campaign(id, &cancel).await.unwrap();
        assert!(start.elapsed() < PAUSE);

        limiter.wait_for_campaign(id, &cancel).await.unwrap();
        assert!(start.elapsed() >= PAUSE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_campaigns_are_independent() {
        let limiter = limiter();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let cancel = CancellationToken::new();
        limiter.set_rate_for_campaign(a, 1).await;
        limiter.set_rate_for_campaign(b, 1).await;

        let start = Instant::now();
        limiter.wait_for_campaign(a, &cancel).await.unwrap();
        limiter.wait_for_campaign(b, &cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_counters() {
        let limiter = limiter();
        let id = Uuid::now_v7();
        let cancel = CancellationToken::new();
        limiter.set_rate_for_campaign(id, 1).await;
        limiter.wait_for_campaign(id, &cancel).await.unwrap();

        limiter.reset().await;

        let start = Instant::now();
        limiter.wait_for_campaign(id, &cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

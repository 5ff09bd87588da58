//! Dispatcher - Fair round-robin delivery across running campaigns
//!
//! A single scheduler task owns the per-campaign queues. On every tick it
//! picks the next campaign in ring order that has no send in flight, pops one
//! message and hands it to a send task. Each campaign therefore has at most
//! one message on the wire, and campaigns take turns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wabulk_common::config::DispatcherConfig;
use wabulk_common::{CampaignId, Media, PhoneNumber};

use super::RateLimiter;
use crate::gateway::{MessageGateway, SendOutcome};

pub const CANCELLED_ERROR: &str = "campaign cancelled";
pub const STOPPED_ERROR: &str = "dispatcher stopped";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatcher is closed")]
    Closed,

    #[error("dispatcher is not running")]
    NotRunning,

    #[error("dispatcher stop timed out")]
    StopTimeout,

    #[error("campaign {0} is already queued")]
    AlreadyQueued(CampaignId),
}

/// One message bound for one recipient
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub phone_number: PhoneNumber,
    pub text: String,
    pub media: Option<Arc<Media>>,
}

/// A campaign's full delivery workload
#[derive(Debug)]
pub struct DispatchJob {
    pub campaign_id: CampaignId,
    pub messages_per_hour: i32,
    pub messages: Vec<OutboundMessage>,
    pub cancel: CancellationToken,
}

/// Per-recipient delivery result streamed back to the submitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSendResult {
    pub phone_number: PhoneNumber,
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// The campaign was cancelled before this message went out.
    ///
    /// Such a result still has `success == false` and carries the cancellation
    /// error, but consumers store the recipient as `cancelled` rather than
    /// `failed`, and it counts neither as processed nor as an error. This keeps
    /// `sent + failed + cancelled + pending == total` for a cancelled campaign.
    pub cancelled: bool,
}

impl MessageSendResult {
    fn from_outcome(phone_number: PhoneNumber, outcome: SendOutcome) -> Self {
        Self {
            phone_number,
            success: outcome.success,
            message_id: outcome.message_id,
            error: outcome.error,
            timestamp: outcome.timestamp,
            cancelled: false,
        }
    }

    fn failed(phone_number: PhoneNumber, error: impl Into<String>) -> Self {
        Self {
            phone_number,
            success: false,
            message_id: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
            cancelled: false,
        }
    }

    fn cancelled(phone_number: PhoneNumber) -> Self {
        Self {
            cancelled: true,
            ..Self::failed(phone_number, CANCELLED_ERROR)
        }
    }
}

/// Queue state of one campaign, for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub campaign_id: CampaignId,
    pub queued: usize,
    pub in_flight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherSnapshot {
    pub running: bool,
    pub campaigns: Vec<QueueSnapshot>,
}

type SubmitReply = oneshot::Sender<Result<mpsc::Receiver<MessageSendResult>, DispatchError>>;

struct SubmitRequest {
    job: DispatchJob,
    reply: SubmitReply,
}

struct CampaignQueue {
    messages: VecDeque<OutboundMessage>,
    results: mpsc::Sender<MessageSendResult>,
    cancel: CancellationToken,
    in_flight: bool,
}

#[derive(Default)]
struct SchedulerState {
    ring: VecDeque<CampaignId>,
    queues: HashMap<CampaignId, CampaignQueue>,
}

struct SendTask {
    campaign_id: CampaignId,
    message: OutboundMessage,
    results: mpsc::Sender<MessageSendResult>,
    cancel: CancellationToken,
}

struct Inner {
    gateway: Arc<dyn MessageGateway>,
    limiter: Arc<RateLimiter>,
    tick: Duration,
    state: Mutex<SchedulerState>,
    running: AtomicBool,
    stopping: AtomicBool,
    shutdown: watch::Sender<bool>,
    submit_tx: mpsc::Sender<SubmitRequest>,
    submit_rx: Mutex<Option<mpsc::Receiver<SubmitRequest>>>,
}

/// Campaign message dispatcher
pub struct Dispatcher {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<dyn MessageGateway>,
        limiter: Arc<RateLimiter>,
        config: &DispatcherConfig,
    ) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(config.submit_queue.max(1));
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                gateway,
                limiter,
                tick: config.tick_interval(),
                state: Mutex::new(SchedulerState::default()),
                running: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                shutdown,
                submit_tx,
                submit_rx: Mutex::new(Some(submit_rx)),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the scheduler task. Calling it again while running is a no-op.
    pub fn start(&self) -> Result<(), DispatchError> {
        if self.inner.stopping.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed);
        }

        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            return Ok(());
        }

        let submissions = self
            .inner
            .submit_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DispatchError::Closed)?;

        self.inner.running.store(true, Ordering::SeqCst);
        let inner = self.inner.clone();
        *handle = Some(tokio::spawn(inner.run(submissions)));

        info!(tick_ms = self.inner.tick.as_millis() as u64, "Dispatcher started");
        Ok(())
    }

    /// Queue a campaign's messages and return its result stream.
    ///
    /// The stream yields one result per message that reaches the send step
    /// and closes once the queue is drained, cancelled or the dispatcher stops.
    pub async fn submit(
        &self,
        job: DispatchJob,
    ) -> Result<mpsc::Receiver<MessageSendResult>, DispatchError> {
        if self.inner.stopping.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed);
        }
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(DispatchError::NotRunning);
        }

        let (reply, response) = oneshot::channel();
        self.inner
            .submit_tx
            .send(SubmitRequest { job, reply })
            .await
            .map_err(|_| DispatchError::Closed)?;

        response.await.map_err(|_| DispatchError::Closed)?
    }

    /// Signal the scheduler to stop and wait up to `timeout` for it to exit.
    /// On timeout the scheduler keeps shutting down in the background.
    pub async fn stop(&self, timeout: Duration) -> Result<(), DispatchError> {
        self.inner.stopping.store(true, Ordering::SeqCst);
        let _ = self.inner.shutdown.send(true);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {
                info!("Dispatcher stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Dispatcher task ended abnormally");
                Ok(())
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Dispatcher stop timed out");
                Err(DispatchError::StopTimeout)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        let state = self.inner.state();
        DispatcherSnapshot {
            running: self.is_running(),
            campaigns: state
                .ring
                .iter()
                .filter_map(|id| {
                    state.queues.get(id).map(|queue| QueueSnapshot {
                        campaign_id: *id,
                        queued: queue.messages.len(),
                        in_flight: queue.in_flight,
                    })
                })
                .collect(),
        }
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, mut submissions: mpsc::Receiver<SubmitRequest>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = interval(self.tick.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sends: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = stopped(&mut shutdown) => break,

                Some(request) = submissions.recv() => self.accept(request).await,

                Some(joined) = sends.join_next(), if !sends.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Send task failed");
                    }
                }

                _ = ticker.tick() => {
                    if let Some(task) = self.next_send() {
                        sends.spawn(self.clone().send(task, self.shutdown.subscribe()));
                    }
                }
            }
        }

        submissions.close();
        while submissions.try_recv().is_ok() {}

        // Dropping the queues closes every result stream once its send drains
        let dropped = {
            let mut state = self.state();
            state.ring.clear();
            let queues = std::mem::take(&mut state.queues);
            queues.len()
        };
        while sends.join_next().await.is_some() {}

        self.running.store(false, Ordering::SeqCst);
        debug!(dropped_queues = dropped, "Dispatcher loop exited");
    }

    async fn accept(&self, request: SubmitRequest) {
        let SubmitRequest { job, reply } = request;
        let campaign_id = job.campaign_id;

        let (results, stream) = mpsc::channel(job.messages.len().max(1));
        if job.messages.is_empty() {
            let _ = reply.send(Ok(stream));
            return;
        }

        self.limiter
            .set_rate_for_campaign(campaign_id, job.messages_per_hour)
            .await;

        let queued = job.messages.len();
        {
            let mut state = self.state();
            if state.queues.contains_key(&campaign_id) {
                let _ = reply.send(Err(DispatchError::AlreadyQueued(campaign_id)));
                return;
            }
            state.queues.insert(
                campaign_id,
                CampaignQueue {
                    messages: job.messages.into(),
                    results,
                    cancel: job.cancel,
                    in_flight: false,
                },
            );
            state.ring.push_back(campaign_id);
        }

        if reply.send(Ok(stream)).is_err() {
            warn!(campaign_id = %campaign_id, "Submitter went away, dropping queue");
            let mut state = self.state();
            state.queues.remove(&campaign_id);
            state.ring.retain(|id| *id != campaign_id);
            return;
        }

        info!(campaign_id = %campaign_id, queued, "Campaign queued for delivery");
    }

    /// Pick the next campaign in ring order and take one message from it
    fn next_send(&self) -> Option<SendTask> {
        let mut state = self.state();

        for _ in 0..state.ring.len() {
            let campaign_id = state.ring.pop_front()?;
            let Some(queue) = state.queues.get_mut(&campaign_id) else {
                continue;
            };

            if queue.cancel.is_cancelled() {
                let remaining = queue.messages.len();
                state.queues.remove(&campaign_id);
                debug!(campaign_id = %campaign_id, remaining, "Dropped cancelled campaign queue");
                continue;
            }

            if queue.in_flight {
                state.ring.push_back(campaign_id);
                continue;
            }

            let Some(message) = queue.messages.pop_front() else {
                state.queues.remove(&campaign_id);
                debug!(campaign_id = %campaign_id, "Campaign queue drained");
                continue;
            };

            queue.in_flight = true;
            let task = SendTask {
                campaign_id,
                message,
                results: queue.results.clone(),
                cancel: queue.cancel.clone(),
            };
            state.ring.push_back(campaign_id);
            return Some(task);
        }

        None
    }

    async fn send(self: Arc<Self>, task: SendTask, mut shutdown: watch::Receiver<bool>) {
        let _in_flight = InFlightGuard {
            inner: self.clone(),
            campaign_id: task.campaign_id,
        };
        let phone = task.message.phone_number.clone();

        let result = tokio::select! {
            biased;
            _ = task.cancel.cancelled() => MessageSendResult::cancelled(phone),
            _ = stopped(&mut shutdown) => MessageSendResult::failed(phone, STOPPED_ERROR),
            result = self.deliver(&task) => result,
        };

        debug!(
            campaign_id = %task.campaign_id,
            phone = %result.phone_number,
            success = result.success,
            "Message processed"
        );

        if task.results.send(result).await.is_err() {
            debug!(campaign_id = %task.campaign_id, "Result stream closed, result discarded");
        }
    }

    async fn deliver(&self, task: &SendTask) -> MessageSendResult {
        let phone = task.message.phone_number.clone();

        if self
            .limiter
            .wait_for_campaign(task.campaign_id, &task.cancel)
            .await
            .is_err()
        {
            return MessageSendResult::cancelled(phone);
        }

        let sent = match &task.message.media {
            Some(media) => {
                self.gateway
                    .send_media(phone.as_str(), &task.message.text, media, false)
                    .await
            }
            None => {
                self.gateway
                    .send_text(phone.as_str(), &task.message.text, false)
                    .await
            }
        };

        match sent {
            Ok(outcome) => MessageSendResult::from_outcome(phone, outcome),
            Err(e) => {
                warn!(campaign_id = %task.campaign_id, phone = %phone, error = %e, "Gateway send failed");
                MessageSendResult::failed(phone, e.to_string())
            }
        }
    }
}

/// Resolves once the stop flag is raised or its sender is gone
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

/// Clears the campaign's in-flight flag when the send task ends, panics included
struct InFlightGuard {
    inner: Arc<Inner>,
    campaign_id: CampaignId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(queue) = self.inner.state().queues.get_mut(&self.campaign_id) {
            queue.in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ConnectionTestResult;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;
    use wabulk_common::{Error, Result};

    /// Gateway that records every send and fails numbers listed in `failing`
    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<String>>,
        failing: Vec<String>,
        erroring: Vec<String>,
    }

    impl RecordingGateway {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageGateway for RecordingGateway {
        async fn send_text(&self, phone: &str, body: &str, _async_send: bool) -> Result<SendOutcome> {
            self.calls.lock().unwrap().push(format!("{phone}:{body}"));
            if self.erroring.iter().any(|p| p == phone) {
                return Err(Error::ExternalService("network error: reset".into()));
            }
            if self.failing.iter().any(|p| p == phone) {
                return Ok(SendOutcome::failed(phone, "rejected"));
            }
            Ok(SendOutcome::sent(phone, Some(format!("id-{phone}"))))
        }

        async fn send_media(
            &self,
            phone: &str,
            body: &str,
            media: &Media,
            async_send: bool,
        ) -> Result<SendOutcome> {
            let body = format!("{body}+{}", media.filename());
            self.send_text(phone, &body, async_send).await
        }

        async fn test_connection(&self) -> Result<ConnectionTestResult> {
            Ok(ConnectionTestResult::ok())
        }
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            tick_interval_ms: 10,
            ..DispatcherConfig::default()
        }
    }

    fn fast_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::with_timings(
            Duration::from_millis(1),
            Duration::from_secs(3600),
            100,
        ))
    }

    fn dispatcher(gateway: Arc<RecordingGateway>, limiter: Arc<RateLimiter>) -> Dispatcher {
        let dispatcher = Dispatcher::new(gateway, limiter, &config());
        dispatcher.start().unwrap();
        dispatcher
    }

    fn phone(n: u32) -> PhoneNumber {
        PhoneNumber::parse(&format!("7999000{n:04}")).unwrap()
    }

    fn job(campaign_id: CampaignId, count: u32, text: &str, cancel: CancellationToken) -> DispatchJob {
        DispatchJob {
            campaign_id,
            messages_per_hour: 100,
            messages: (0..count)
                .map(|n| OutboundMessage {
                    phone_number: phone(n),
                    text: text.to_string(),
                    media: None,
                })
                .collect(),
            cancel,
        }
    }

    async fn collect(mut stream: mpsc::Receiver<MessageSendResult>) -> Vec<MessageSendResult> {
        let mut results = Vec::new();
        while let Some(result) = stream.recv().await {
            results.push(result);
        }
        results
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_queue_order() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = dispatcher(gateway.clone(), fast_limiter());

        let stream = dispatcher
            .submit(job(Uuid::now_v7(), 3, "hello", CancellationToken::new()))
            .await
            .unwrap();
        let results = collect(stream).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success && !r.cancelled));
        assert_eq!(
            results.iter().map(|r| r.phone_number.clone()).collect::<Vec<_>>(),
            vec![phone(0), phone(1), phone(2)]
        );
        assert_eq!(results[0].message_id.as_deref(), Some("id-79990000000"));
        assert_eq!(gateway.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_queue() {
        let gateway = Arc::new(RecordingGateway {
            failing: vec![phone(0).to_string()],
            erroring: vec![phone(1).to_string()],
            ..RecordingGateway::default()
        });
        let dispatcher = dispatcher(gateway, fast_limiter());

        let stream = dispatcher
            .submit(job(Uuid::now_v7(), 3, "hello", CancellationToken::new()))
            .await
            .unwrap();
        let results = collect(stream).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].error.as_deref(), Some("rejected"));
        assert!(results[1]
            .error
            .as_deref()
            .unwrap()
            .contains("network error"));
        assert!(results[2].success);
        assert!(results.iter().all(|r| !r.cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_messages_use_media_send() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = dispatcher(gateway.clone(), fast_limiter());
        let media = Arc::new(Media::new("pic.png", "image/png", vec![1, 2, 3]));

        let mut job = job(Uuid::now_v7(), 1, "caption", CancellationToken::new());
        job.messages[0].media = Some(media);
        collect(dispatcher.submit(job).await.unwrap()).await;

        assert_eq!(gateway.calls(), vec!["79990000000:caption+pic.png".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_campaigns_take_turns() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = dispatcher(gateway.clone(), fast_limiter());

        let x = dispatcher
            .submit(job(Uuid::now_v7(), 3, "x", CancellationToken::new()))
            .await
            .unwrap();
        let y = dispatcher
            .submit(job(Uuid::now_v7(), 3, "y", CancellationToken::new()))
            .await
            .unwrap();
        let (x, y) = tokio::join!(collect(x), collect(y));
        assert_eq!((x.len(), y.len()), (3, 3));

        let order: Vec<String> = gateway
            .calls()
            .iter()
            .map(|call| call.rsplit(':').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(order, vec!["x", "y", "x", "y", "x", "y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_closes_stream_early() {
        let gateway = Arc::new(RecordingGateway::default());
        // One message per hour: the second send waits out the pause
        let limiter = Arc::new(RateLimiter::with_timings(
            Duration::from_millis(1),
            Duration::from_secs(3600),
            1,
        ));
        let dispatcher = dispatcher(gateway.clone(), limiter);
        let cancel = CancellationToken::new();

        let mut job = job(Uuid::now_v7(), 5, "hi", cancel.clone());
        job.messages_per_hour = 1;
        let mut stream = dispatcher.submit(job).await.unwrap();

        let first = stream.recv().await.unwrap();
        assert!(first.success);

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let rest = collect(stream).await;
        assert_eq!(rest.len(), 1);
        assert!(!rest[0].success);
        assert!(rest[0].cancelled);
        assert_eq!(rest[0].error.as_deref(), Some(CANCELLED_ERROR));
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_job_returns_closed_stream() {
        let dispatcher = dispatcher(Arc::new(RecordingGateway::default()), fast_limiter());
        let stream = dispatcher
            .submit(job(Uuid::now_v7(), 0, "x", CancellationToken::new()))
            .await
            .unwrap();
        assert!(collect(stream).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submission_rejected() {
        let limiter = Arc::new(RateLimiter::with_timings(
            Duration::from_millis(1),
            Duration::from_secs(3600),
            1,
        ));
        let dispatcher = dispatcher(Arc::new(RecordingGateway::default()), limiter);
        let id = Uuid::now_v7();

        let _stream = dispatcher
            .submit(job(id, 3, "x", CancellationToken::new()))
            .await
            .unwrap();
        let err = dispatcher
            .submit(job(id, 3, "x", CancellationToken::new()))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::AlreadyQueued(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_streams_and_rejects_submissions() {
        let limiter = Arc::new(RateLimiter::with_timings(
            Duration::from_millis(1),
            Duration::from_secs(3600),
            1,
        ));
        let dispatcher = dispatcher(Arc::new(RecordingGateway::default()), limiter);

        let mut job = job(Uuid::now_v7(), 4, "x", CancellationToken::new());
        job.messages_per_hour = 1;
        let mut stream = dispatcher.submit(job).await.unwrap();
        assert!(stream.recv().await.unwrap().success);

        dispatcher.stop(Duration::from_secs(5)).await.unwrap();

        let rest = collect(stream).await;
        assert!(rest.len() <= 1);
        assert!(rest
            .iter()
            .all(|r| r.error.as_deref() == Some(STOPPED_ERROR)));
        assert!(!dispatcher.is_running());

        let err = dispatcher
            .submit(job_for_stopped())
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Closed);
        assert_eq!(dispatcher.start(), Err(DispatchError::Closed));
    }

    fn job_for_stopped() -> DispatchJob {
        job(Uuid::now_v7(), 1, "late", CancellationToken::new())
    }

    #[tokio::test]
    async fn test_submit_before_start() {
        let dispatcher = Dispatcher::new(
            Arc::new(RecordingGateway::default()),
            fast_limiter(),
            &config(),
        );
        let err = dispatcher.submit(job_for_stopped()).await.unwrap_err();
        assert_eq!(err, DispatchError::NotRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_snapshot_reports_queues() {
        let limiter = Arc::new(RateLimiter::with_timings(
            Duration::from_millis(1),
            Duration::from_secs(3600),
            1,
        ));
        let dispatcher = dispatcher(Arc::new(RecordingGateway::default()), limiter);
        dispatcher.start().unwrap();

        let id = Uuid::now_v7();
        let mut job = job(id, 3, "x", CancellationToken::new());
        job.messages_per_hour = 1;
        let mut stream = dispatcher.submit(job).await.unwrap();
        stream.recv().await.unwrap();

        let snapshot = dispatcher.snapshot();
        assert!(snapshot.running);
        assert_eq!(snapshot.campaigns.len(), 1);
        assert_eq!(snapshot.campaigns[0].campaign_id, id);
        assert!(snapshot.campaigns[0].queued <= 2);
    }
}

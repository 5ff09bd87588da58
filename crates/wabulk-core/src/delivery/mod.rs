//! Message delivery: pacing, scheduling and worker bookkeeping

mod dispatcher;
mod rate_limiter;
mod registry;

pub use dispatcher::{
    DispatchError, DispatchJob, Dispatcher, DispatcherSnapshot, MessageSendResult,
    OutboundMessage, QueueSnapshot, CANCELLED_ERROR, STOPPED_ERROR,
};
pub use rate_limiter::{RateLimitError, RateLimiter};
pub use registry::{CampaignRegistry, RegistryError};

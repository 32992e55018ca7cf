//! Request rate limiting.
//!
//! Requests are handed to a [`RestRateLimiter`] via [`RestRateLimiter::enqueue`]
//! and run with [`Work::execute`] once their bucket allows it. Requests that
//! should be answered with `429` instead of waiting go through
//! [`SequentialRateLimiter::check`].

pub mod bucket;
pub mod config;
pub mod global;
pub mod response;
pub mod sequential;

use async_trait::async_trait;

pub use bucket::{Bucket, BucketKind, RateLimitInfo, RouteKey};
pub use config::RateLimitConfig;
pub use global::{AtomicGlobalRateLimit, GlobalRateLimit};
pub use response::{ErrorResponse, RateLimitedError};
pub use sequential::{PendingWork, RateLimited, SequentialRateLimiter};

/// The number of seconds to wait before submitting another request
pub const RETRY_AFTER_HEADER: &str = "Retry-After";
/// The number of requests that can be made
pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
/// The number of remaining requests that can be made
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
/// Epoch time (seconds since 00:00:00 UTC on January 1, 1970) at which the rate limit resets
pub const RESET_HEADER: &str = "X-RateLimit-Reset";
/// Total time (in seconds) until the current bucket resets, with millisecond decimals
pub const RESET_AFTER_HEADER: &str = "X-RateLimit-Reset-After";
/// A unique string denoting the bucket being limited
pub const HASH_HEADER: &str = "X-RateLimit-Bucket";
/// Sent on 429 responses when the global limit was hit
pub const GLOBAL_HEADER: &str = "X-RateLimit-Global";
/// Sent on 429 responses: `user`, `global` or `shared`
pub const SCOPE_HEADER: &str = "X-RateLimit-Scope";

/// A pending request.
#[async_trait]
pub trait Work: Send + Sync {
    /// Used to pick the bucket.
    fn route(&self) -> &RouteKey;

    /// Skipped work is discarded without further action.
    fn is_skipped(&self) -> bool {
        self.is_cancelled()
    }

    /// Done work is never executed again.
    fn is_done(&self) -> bool;

    /// Priority work survives [`RestRateLimiter::cancel_requests`].
    fn is_priority(&self) -> bool;

    fn is_cancelled(&self) -> bool;

    /// Runs the request. Called once the bucket granted a token; if the work is
    /// not done afterwards it is retried ahead of the rest of its queue.
    async fn execute(&self, info: RateLimitInfo);

    fn cancel(&self);
}

pub trait RestRateLimiter: Send + Sync {
    /// Enqueue a new request. Must be called from within a tokio runtime.
    fn enqueue(&self, work: Box<dyn Work>);

    /// Stop accepting new requests. With `shutdown`, queued requests are
    /// cancelled too. `callback` runs once every queue is empty.
    fn stop(&self, shutdown: bool, callback: Box<dyn FnOnce() + Send>);

    fn is_stopped(&self) -> bool;

    /// Cancel queued requests that are not priority. Returns how many were cancelled.
    fn cancel_requests(&self) -> usize;
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

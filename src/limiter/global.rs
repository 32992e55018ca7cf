use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Global rate-limit store.
///
/// Holds the unix timestamps (milliseconds) until which the global limits are
/// in force, `-1` when unset. Implementations can share this state between
/// several server instances.
pub trait GlobalRateLimit: Send + Sync {
    /// Server-wide limit applied to classic routes.
    fn classic(&self) -> i64;
    fn set_classic(&self, timestamp: i64);

    /// Edge limit applied to every route, interaction routes included.
    fn cloudflare(&self) -> i64;
    fn set_cloudflare(&self, timestamp: i64);
}

/// In-process store backed by atomics.
pub struct AtomicGlobalRateLimit {
    classic: AtomicI64,
    cloudflare: AtomicI64,
}

impl AtomicGlobalRateLimit {
    pub fn new() -> Self {
        Self {
            classic: AtomicI64::new(-1),
            cloudflare: AtomicI64::new(-1),
        }
    }
}

impl Default for AtomicGlobalRateLimit {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AtomicGlobalRateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicGlobalRateLimit")
            .field("classic", &self.classic())
            .field("cloudflare", &self.cloudflare())
            .finish()
    }
}

impl GlobalRateLimit for AtomicGlobalRateLimit {
    fn classic(&self) -> i64 {
        self.classic.load(Ordering::Acquire)
    }

    fn set_classic(&self, timestamp: i64) {
        self.classic.store(timestamp, Ordering::Release);
    }

    fn cloudflare(&self) -> i64 {
        self.cloudflare.load(Ordering::Acquire)
    }

    fn set_cloudflare(&self, timestamp: i64) {
        self.cloudflare.store(timestamp, Ordering::Release);
    }
}

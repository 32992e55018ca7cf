use crate::limiter::config::RateLimitConfig;
use crate::limiter::global::GlobalRateLimit;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// Subject to both global limits.
    Classic,
    /// Only subject to the cloudflare limit.
    Interaction,
}

/// Identifies the bucket a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: String,
    /// The matched route template, e.g. `/users/{id}`.
    pub route: String,
    pub client: String,
}

impl RouteKey {
    pub fn new(method: impl Into<String>, route: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            route: route.into(),
            client: client.into(),
        }
    }

    pub fn bucket_id(&self, config: &RateLimitConfig) -> String {
        if config.is_shared(&self.route) {
            format!("{} {}", self.method, self.route)
        } else {
            format!("{} {}@{}", self.method, self.route, self.client)
        }
    }

    pub fn global_bucket_id(&self) -> String {
        format!("global@{}", self.client)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.route)
    }
}

/// Snapshot of a bucket, rendered into `X-RateLimit-*` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub bucket: String,
    pub limit: u32,
    pub remaining: u32,
    /// Unix milliseconds.
    pub reset_at: i64,
    pub reset_after: i64,
}

impl RateLimitInfo {
    /// Epoch seconds with millisecond precision.
    pub fn reset_header(&self) -> String {
        format_seconds(self.reset_at)
    }

    pub fn reset_after_header(&self) -> String {
        format_seconds(self.reset_after)
    }
}

pub fn format_seconds(millis: i64) -> String {
    format!("{}.{:03}", millis.div_euclid(1000), millis.rem_euclid(1000))
}

/// Fixed-window bucket.
#[derive(Debug, Clone)]
pub struct Bucket {
    id: String,
    hash: String,
    kind: BucketKind,
    limit: u32,
    window_ms: i64,
    remaining: u32,
    reset_at: i64,
}

impl Bucket {
    pub fn new(id: impl Into<String>, kind: BucketKind, limit: u32, window: Duration) -> Self {
        let id = id.into();
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        Self {
            hash: format!("{:016x}", hasher.finish()),
            id,
            kind,
            limit,
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            remaining: limit,
            reset_at: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> BucketKind {
        self.kind
    }

    fn refresh(&mut self, now: i64) {
        if now >= self.reset_at {
            self.remaining = self.limit;
            self.reset_at = now.saturating_add(self.window_ms);
        }
    }

    /// Milliseconds until a token is available, `None` if one is available now.
    pub fn retry_after(&mut self, now: i64) -> Option<i64> {
        self.refresh(now);
        if self.remaining == 0 {
            Some((self.reset_at - now).max(1))
        } else {
            None
        }
    }

    pub fn try_acquire(&mut self, now: i64) -> Result<RateLimitInfo, i64> {
        if let Some(delay) = self.retry_after(now) {
            return Err(delay);
        }
        self.remaining -= 1;
        Ok(self.info(now))
    }

    pub fn info(&self, now: i64) -> RateLimitInfo {
        RateLimitInfo {
            bucket: self.hash.clone(),
            limit: self.limit,
            remaining: self.remaining,
            reset_at: self.reset_at,
            reset_after: (self.reset_at - now).max(0),
        }
    }

    /// Positive when a global limit currently blocks this bucket.
    pub fn global_delay(&self, global: &dyn GlobalRateLimit, now: i64) -> i64 {
        match self.kind {
            BucketKind::Classic => global.classic().max(global.cloudflare()) - now,
            BucketKind::Interaction => global.cloudflare() - now,
        }
    }

    /// Expired buckets can be dropped and recreated without changing behavior.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.reset_at
    }
}

impl PartialEq for Bucket {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Bucket {}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::global::AtomicGlobalRateLimit;

    #[test]
    fn test_fixed_window() {
        let mut bucket = Bucket::new("GET /ping@a", BucketKind::Classic, 2, Duration::from_millis(1000));

        let first = bucket.try_acquire(10_000).unwrap();
        assert_eq!(first.remaining, 1);
        assert_eq!(first.reset_at, 11_000);
        assert_eq!(first.reset_after, 1000);

        let second = bucket.try_acquire(10_400).unwrap();
        assert_eq!(second.remaining, 0);
        assert_eq!(second.reset_after, 600);

        assert_eq!(bucket.try_acquire(10_500), Err(500));

        // window rolls over
        let third = bucket.try_acquire(11_000).unwrap();
        assert_eq!(third.remaining, 1);
        assert_eq!(third.reset_at, 12_000);
    }

    #[test]
    fn test_global_delay_by_kind() {
        let store = AtomicGlobalRateLimit::new();
        store.set_classic(5_000);
        store.set_cloudflare(3_000);

        let classic = Bucket::new("a", BucketKind::Classic, 1, Duration::from_secs(1));
        let interaction = Bucket::new("b", BucketKind::Interaction, 1, Duration::from_secs(1));

        assert_eq!(classic.global_delay(&store, 1_000), 4_000);
        assert_eq!(interaction.global_delay(&store, 1_000), 2_000);
        assert!(interaction.global_delay(&store, 4_000) <= 0);
    }

    #[test]
    fn test_headers_and_hash() {
        let info = RateLimitInfo {
            bucket: "x".to_string(),
            limit: 1,
            remaining: 0,
            reset_at: 1_700_000_000_123,
            reset_after: 1_500,
        };
        assert_eq!(info.reset_header(), "1700000000.123");
        assert_eq!(info.reset_after_header(), "1.500");

        let a = Bucket::new("GET /ping@a", BucketKind::Classic, 1, Duration::from_secs(1));
        let b = Bucket::new("GET /ping@a", BucketKind::Classic, 1, Duration::from_secs(1));
        assert_eq!(a.info(0).bucket, b.info(0).bucket);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_routes_drop_client() {
        let config = RateLimitConfig::new(1, Duration::from_secs(1))
            .with_shared_routes(vec!["/files".to_string()]);
        let a = RouteKey::new("GET", "/files", "1.1.1.1");
        let b = RouteKey::new("GET", "/files", "2.2.2.2");
        assert_eq!(a.bucket_id(&config), b.bucket_id(&config));

        let c = RouteKey::new("GET", "/ping", "1.1.1.1");
        let d = RouteKey::new("GET", "/ping", "2.2.2.2");
        assert_ne!(c.bucket_id(&config), d.bucket_id(&config));
    }
}

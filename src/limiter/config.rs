use crate::limiter::bucket::BucketKind;
use crate::limiter::global::{AtomicGlobalRateLimit, GlobalRateLimit};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the rate-limiter.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Requests per bucket and window.
    pub limit: u32,
    pub window: Duration,
    /// Requests per client and window, across all classic routes.
    pub global_limit: u32,
    pub global_window: Duration,
    relative: bool,
    shared_routes: Vec<String>,
    interaction_routes: Vec<String>,
    global: Arc<dyn GlobalRateLimit>,
}

impl RateLimitConfig {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            global_limit: 50,
            global_window: Duration::from_secs(1),
            relative: true,
            shared_routes: Vec::new(),
            interaction_routes: Vec::new(),
            global: Arc::new(AtomicGlobalRateLimit::new()),
        }
    }

    pub fn with_global_limit(mut self, limit: u32, window: Duration) -> Self {
        self.global_limit = limit;
        self.global_window = window;
        self
    }

    /// Whether to send `X-RateLimit-Reset-After` instead of `X-RateLimit-Reset`.
    /// Relative values are immune to clock skew between server and client.
    pub fn relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    pub fn with_shared_routes(mut self, prefixes: Vec<String>) -> Self {
        self.shared_routes = prefixes;
        self
    }

    pub fn with_interaction_routes(mut self, prefixes: Vec<String>) -> Self {
        self.interaction_routes = prefixes;
        self
    }

    pub fn with_global_store(mut self, store: Arc<dyn GlobalRateLimit>) -> Self {
        self.global = store;
        self
    }

    pub fn global_rate_limit(&self) -> &Arc<dyn GlobalRateLimit> {
        &self.global
    }

    /// Shared routes use one bucket for all clients.
    pub fn is_shared(&self, route: &str) -> bool {
        matches_prefix(&self.shared_routes, route)
    }

    pub fn bucket_kind(&self, route: &str) -> BucketKind {
        if matches_prefix(&self.interaction_routes, route) {
            BucketKind::Interaction
        } else {
            BucketKind::Classic
        }
    }
}

fn matches_prefix(prefixes: &[String], route: &str) -> bool {
    prefixes.iter().any(|prefix| {
        route == prefix
            || (route.starts_with(prefix.as_str())
                && (prefix.ends_with('/') || route[prefix.len()..].starts_with('/')))
    })
}

impl fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("global_limit", &self.global_limit)
            .field("global_window", &self.global_window)
            .field("relative", &self.relative)
            .field("shared_routes", &self.shared_routes)
            .field("interaction_routes", &self.interaction_routes)
            .finish_non_exhaustive()
    }
}

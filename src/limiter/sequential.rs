use crate::limiter::bucket::{Bucket, BucketKind, RateLimitInfo, RouteKey};
use crate::limiter::config::RateLimitConfig;
use crate::limiter::response::{ErrorResponse, RateLimitedError};
use crate::limiter::{now_millis, RestRateLimiter, Work};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// Bucket count above which expired buckets are evicted.
const BUCKET_CLEANUP_THRESHOLD: usize = 10_000;
/// Acquisitions between two eviction scans once above the threshold.
const BUCKET_CLEANUP_INTERVAL: u32 = 1_000;

/// Why a request was not allowed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimited {
    pub response: ErrorResponse,
    pub route: String,
    /// Milliseconds.
    pub retry_after: i64,
    /// State of the route bucket. Absent when a global limit was hit.
    pub info: Option<RateLimitInfo>,
}

impl RateLimited {
    pub fn retry_after_secs(&self) -> f64 {
        self.retry_after as f64 / 1000.0
    }

    /// Whole seconds, rounded up, for the `Retry-After` header.
    pub fn retry_after_header(&self) -> i64 {
        (self.retry_after + 999).div_euclid(1000)
    }
}

impl From<RateLimited> for RateLimitedError {
    fn from(limited: RateLimited) -> Self {
        RateLimitedError {
            route: limited.route,
            retry_after: limited.retry_after,
        }
    }
}

/// Runs queued work one bucket at a time, in order, respecting bucket and
/// global limits. Cheap to clone.
#[derive(Clone)]
pub struct SequentialRateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    config: RateLimitConfig,
    state: Mutex<State>,
    wake: Notify,
}

#[derive(Default)]
struct State {
    buckets: HashMap<String, Bucket>,
    queues: HashMap<String, VecDeque<Box<dyn Work>>>,
    running: HashSet<String>,
    stopped: bool,
    on_drained: Option<Box<dyn FnOnce() + Send>>,
    acquires_since_cleanup: u32,
}

enum Step {
    Run(Box<dyn Work>, RateLimitInfo),
    Wait(i64),
}

impl SequentialRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                wake: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.inner.config
    }

    /// Takes a token for `route` right away, or reports why it cannot.
    pub fn check(&self, route: &RouteKey) -> Result<RateLimitInfo, RateLimited> {
        let now = now_millis();
        let result = self.inner.lock().acquire(&self.inner.config, route, now);
        if let Err(limited) = &result {
            tracing::debug!(
                "Rate limited {} for {} ({}ms, scope {})",
                route,
                route.client,
                limited.retry_after,
                limited.response.scope()
            );
        }
        result
    }

    /// Queues a request for `route` and waits for its turn. `None` means the
    /// request was cancelled before it got a token.
    pub async fn acquire(&self, route: RouteKey, priority: bool) -> Option<RateLimitInfo> {
        let (work, permit) = PendingWork::new(route, priority);
        self.enqueue(Box::new(work));
        permit.await.ok().flatten()
    }

    /// Number of requests waiting in any queue.
    pub fn queued(&self) -> usize {
        self.inner.lock().queues.values().map(VecDeque::len).sum()
    }
}

impl RestRateLimiter for SequentialRateLimiter {
    fn enqueue(&self, work: Box<dyn Work>) {
        let mut state = self.inner.lock();
        if state.stopped {
            drop(state);
            tracing::debug!("Rejecting {} on a stopped rate limiter", work.route());
            work.cancel();
            return;
        }

        let bucket_id = work.route().bucket_id(&self.inner.config);
        state
            .queues
            .entry(bucket_id.clone())
            .or_default()
            .push_back(work);
        let start_worker = state.running.insert(bucket_id.clone());
        drop(state);

        if start_worker {
            tokio::spawn(drain(Arc::clone(&self.inner), bucket_id));
        }
    }

    fn stop(&self, shutdown: bool, callback: Box<dyn FnOnce() + Send>) {
        let (cancelled, callback) = {
            let mut state = self.inner.lock();
            state.stopped = true;
            let mut cancelled = Vec::new();
            if shutdown {
                for queue in state.queues.values_mut() {
                    cancelled.extend(queue.drain(..));
                }
            }
            state.on_drained = Some(callback);
            (cancelled, state.take_drained_callback())
        };

        tracing::info!(
            "Rate limiter stopped (shutdown: {}, cancelled: {})",
            shutdown,
            cancelled.len()
        );
        for work in cancelled {
            work.cancel();
        }
        self.inner.wake.notify_waiters();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    fn cancel_requests(&self) -> usize {
        let cancelled: Vec<Box<dyn Work>> = {
            let mut state = self.inner.lock();
            let mut cancelled = Vec::new();
            for queue in state.queues.values_mut() {
                let (keep, cancel): (VecDeque<_>, VecDeque<_>) =
                    queue.drain(..).partition(|work| work.is_priority());
                *queue = keep;
                cancelled.extend(cancel);
            }
            cancelled
        };

        for work in &cancelled {
            work.cancel();
        }
        self.inner.wake.notify_waiters();
        if !cancelled.is_empty() {
            tracing::debug!("Cancelled {} queued requests", cancelled.len());
        }
        cancelled.len()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn acquire(
        &mut self,
        config: &RateLimitConfig,
        route: &RouteKey,
        now: i64,
    ) -> Result<RateLimitInfo, RateLimited> {
        self.evict_expired(now);

        let kind = config.bucket_kind(&route.route);
        let bucket_id = route.bucket_id(config);
        let route_name = route.to_string();
        let new_bucket = || Bucket::new(bucket_id.clone(), kind, config.limit, config.window);

        let bucket = self.buckets.entry(bucket_id.clone()).or_insert_with(new_bucket);
        let global_delay = bucket.global_delay(config.global_rate_limit().as_ref(), now);
        if global_delay > 0 {
            return Err(RateLimited {
                response: ErrorResponse::GlobalRateLimit,
                route: route_name,
                retry_after: global_delay,
                info: None,
            });
        }
        if let Some(delay) = bucket.retry_after(now) {
            let response = if config.is_shared(&route.route) {
                ErrorResponse::ResourcesRateLimit
            } else {
                ErrorResponse::UserRateLimit
            };
            return Err(RateLimited {
                response,
                route: route_name,
                retry_after: delay,
                info: Some(bucket.info(now)),
            });
        }

        if kind == BucketKind::Classic {
            let global_id = route.global_bucket_id();
            let global = self.buckets.entry(global_id.clone()).or_insert_with(|| {
                Bucket::new(global_id, BucketKind::Classic, config.global_limit, config.global_window)
            });
            if let Err(delay) = global.try_acquire(now) {
                return Err(RateLimited {
                    response: ErrorResponse::GlobalRateLimit,
                    route: route_name,
                    retry_after: delay,
                    info: None,
                });
            }
        }

        self.buckets
            .entry(bucket_id.clone())
            .or_insert_with(new_bucket)
            .try_acquire(now)
            .map_err(|delay| RateLimited {
                response: ErrorResponse::UserRateLimit,
                route: route.to_string(),
                retry_after: delay,
                info: None,
            })
    }

    fn evict_expired(&mut self, now: i64) {
        if self.buckets.len() <= BUCKET_CLEANUP_THRESHOLD {
            self.acquires_since_cleanup = 0;
            return;
        }
        self.acquires_since_cleanup += 1;
        if self.acquires_since_cleanup < BUCKET_CLEANUP_INTERVAL {
            return;
        }
        self.acquires_since_cleanup = 0;

        let queues = &self.queues;
        self.buckets
            .retain(|id, bucket| !bucket.is_expired(now) || queues.contains_key(id));
    }

    fn take_drained_callback(&mut self) -> Option<Box<dyn FnOnce() + Send>> {
        if self.stopped && self.running.is_empty() && self.queues.values().all(VecDeque::is_empty)
        {
            self.on_drained.take()
        } else {
            None
        }
    }
}

/// Worker for one bucket. Exits once the bucket's queue is empty.
async fn drain(inner: Arc<Inner>, bucket_id: String) {
    loop {
        let step = {
            let mut state = inner.lock();
            let next = state.queues.get_mut(&bucket_id).and_then(VecDeque::pop_front);
            let Some(work) = next else {
                state.queues.remove(&bucket_id);
                state.running.remove(&bucket_id);
                let callback = state.take_drained_callback();
                drop(state);
                if let Some(callback) = callback {
                    callback();
                }
                return;
            };

            if work.is_skipped() {
                tracing::debug!("Discarding skipped request for {}", work.route());
                continue;
            }

            match state.acquire(&inner.config, work.route(), now_millis()) {
                Ok(info) => Step::Run(work, info),
                Err(limited) => {
                    state
                        .queues
                        .entry(bucket_id.clone())
                        .or_default()
                        .push_front(work);
                    Step::Wait(limited.retry_after)
                }
            }
        };

        match step {
            Step::Run(work, info) => {
                work.execute(info).await;
                if !work.is_done() && !work.is_skipped() {
                    inner
                        .lock()
                        .queues
                        .entry(bucket_id.clone())
                        .or_default()
                        .push_front(work);
                }
            }
            Step::Wait(delay) => {
                let delay = Duration::from_millis(u64::try_from(delay.max(1)).unwrap_or(1));
                let notified = inner.wake.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                // a stop or cancel may have emptied the queue before the waiter was registered
                if inner.lock().queues.get(&bucket_id).map_or(true, VecDeque::is_empty) {
                    continue;
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = notified => {}
                }
            }
        }
    }
}

/// A request parked in a bucket queue until it is allowed through.
pub struct PendingWork {
    route: RouteKey,
    priority: bool,
    permit: Mutex<Option<oneshot::Sender<Option<RateLimitInfo>>>>,
    cancelled: AtomicBool,
}

impl PendingWork {
    /// The receiver yields `Some(info)` when the request may run and `None`
    /// when it was cancelled.
    pub fn new(
        route: RouteKey,
        priority: bool,
    ) -> (Self, oneshot::Receiver<Option<RateLimitInfo>>) {
        let (sender, receiver) = oneshot::channel();
        let work = Self {
            route,
            priority,
            permit: Mutex::new(Some(sender)),
            cancelled: AtomicBool::new(false),
        };
        (work, receiver)
    }

    fn take_permit(&self) -> Option<oneshot::Sender<Option<RateLimitInfo>>> {
        self.permit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl Work for PendingWork {
    fn route(&self) -> &RouteKey {
        &self.route
    }

    fn is_done(&self) -> bool {
        self.permit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn is_priority(&self) -> bool {
        self.priority
    }

    /// Also true once the waiting side has gone away.
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self
                .permit
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|sender| sender.is_closed())
    }

    async fn execute(&self, info: RateLimitInfo) {
        if let Some(sender) = self.take_permit() {
            let _ = sender.send(Some(info));
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(sender) = self.take_permit() {
            let _ = sender.send(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::global::GlobalRateLimit;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn limiter(limit: u32, window_ms: u64) -> SequentialRateLimiter {
        SequentialRateLimiter::new(
            RateLimitConfig::new(limit, Duration::from_millis(window_ms))
                .with_global_limit(1_000, Duration::from_secs(1))
                .with_shared_routes(vec!["/files".to_string()])
                .with_interaction_routes(vec!["/interactions".to_string()]),
        )
    }

    fn key(route: &str, client: &str) -> RouteKey {
        RouteKey::new("GET", route, client)
    }

    #[test]
    fn test_check_allows_limit_then_limits_user() {
        let limiter = limiter(2, 60_000);
        let route = key("/ping", "10.0.0.1");

        assert_eq!(limiter.check(&route).unwrap().remaining, 1);
        assert_eq!(limiter.check(&route).unwrap().remaining, 0);

        let limited = limiter.check(&route).unwrap_err();
        assert_eq!(limited.response, ErrorResponse::UserRateLimit);
        assert!(limited.retry_after > 0 && limited.retry_after <= 60_000);
        assert_eq!(limited.info.as_ref().map(|i| i.remaining), Some(0));

        // another client has its own bucket
        assert!(limiter.check(&key("/ping", "10.0.0.2")).is_ok());
    }

    #[test]
    fn test_shared_route_limits_resource() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.check(&key("/files", "a")).is_ok());

        let limited = limiter.check(&key("/files", "b")).unwrap_err();
        assert_eq!(limited.response, ErrorResponse::ResourcesRateLimit);
        assert_eq!(limited.response.scope(), "shared");
    }

    #[test]
    fn test_global_store_blocks_by_bucket_kind() {
        let limiter = limiter(10, 60_000);
        let store = limiter.config().global_rate_limit().clone();

        store.set_classic(now_millis() + 30_000);
        let limited = limiter.check(&key("/ping", "a")).unwrap_err();
        assert_eq!(limited.response, ErrorResponse::GlobalRateLimit);
        assert!(limited.info.is_none());
        assert!(limiter.check(&key("/interactions", "a")).is_ok());

        store.set_classic(-1);
        store.set_cloudflare(now_millis() + 30_000);
        assert!(limiter.check(&key("/interactions", "a")).is_err());
        assert!(limiter.check(&key("/ping", "a")).is_err());
    }

    #[test]
    fn test_per_client_global_limit_spans_routes() {
        let limiter = SequentialRateLimiter::new(
            RateLimitConfig::new(10, Duration::from_secs(60))
                .with_global_limit(2, Duration::from_secs(60)),
        );

        assert!(limiter.check(&key("/a", "client")).is_ok());
        assert!(limiter.check(&key("/b", "client")).is_ok());
        let limited = limiter.check(&key("/c", "client")).unwrap_err();
        assert_eq!(limited.response, ErrorResponse::GlobalRateLimit);

        let error: RateLimitedError = limited.into();
        assert_eq!(error.route, "GET /c");
    }

    #[test]
    fn test_retry_after_header_rounds_up() {
        let limited = RateLimited {
            response: ErrorResponse::UserRateLimit,
            route: "GET /ping".to_string(),
            retry_after: 1_001,
            info: None,
        };
        assert_eq!(limited.retry_after_header(), 2);
        assert_eq!(limited.retry_after_secs(), 1.001);
    }

    #[tokio::test]
    async fn test_queue_serializes_requests_within_bucket() {
        let limiter = limiter(1, 100);
        let started = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(key("/ping", "a"), false).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        // three tokens at one per 100ms window need at least two resets
        assert!(started.elapsed() >= Duration::from_millis(190));
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test]
    async fn test_cancel_requests_spares_priority_work() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.check(&key("/ping", "a")).is_ok());

        let (normal_a, rx_a) = PendingWork::new(key("/ping", "a"), false);
        let (normal_b, rx_b) = PendingWork::new(key("/ping", "a"), false);
        let (priority, rx_priority) = PendingWork::new(key("/ping", "a"), true);
        limiter.enqueue(Box::new(normal_a));
        limiter.enqueue(Box::new(normal_b));
        limiter.enqueue(Box::new(priority));

        tokio::task::yield_now().await;
        assert_eq!(limiter.cancel_requests(), 2);
        assert_eq!(rx_a.await.unwrap(), None);
        assert_eq!(rx_b.await.unwrap(), None);
        assert_eq!(limiter.queued(), 1);

        let drained = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&drained);
        limiter.stop(true, Box::new(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(rx_priority.await.unwrap(), None);
        assert!(limiter.is_stopped());

        // the waiting worker is woken up and exits, firing the callback
        tokio::time::timeout(Duration::from_secs(2), async {
            while drained.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_limiter_cancels_new_work() {
        let limiter = limiter(5, 1_000);
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        limiter.stop(false, Box::new(move || flag.store(true, Ordering::SeqCst)));

        // nothing was queued, so the callback runs right away
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(limiter.acquire(key("/ping", "a"), true).await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_wakes_worker_waiting_on_window() {
        for yields in 0..20 {
            let limiter = limiter(1, 60_000);
            assert!(limiter.check(&key("/ping", "a")).is_ok());

            let (work, rx) = PendingWork::new(key("/ping", "a"), false);
            limiter.enqueue(Box::new(work));
            for _ in 0..yields {
                tokio::task::yield_now().await;
            }

            let (done_tx, done_rx) = oneshot::channel();
            limiter.stop(true, Box::new(move || {
                let _ = done_tx.send(());
            }));

            assert_eq!(rx.await.unwrap(), None);
            tokio::time::timeout(Duration::from_secs(1), done_rx)
                .await
                .unwrap_or_else(|_| panic!("worker kept sleeping after stop ({} yields)", yields))
                .unwrap();
        }
    }

    #[test]
    fn test_eviction_scan_runs_every_interval() {
        let config = RateLimitConfig::new(1, Duration::from_millis(1));
        let mut state = State::default();
        for i in 0..=BUCKET_CLEANUP_THRESHOLD {
            let id = format!("bucket-{}", i);
            state
                .buckets
                .insert(id.clone(), Bucket::new(id, BucketKind::Classic, 1, config.window));
        }

        let now = now_millis();
        for _ in 1..BUCKET_CLEANUP_INTERVAL {
            state.evict_expired(now);
        }
        assert_eq!(state.buckets.len(), BUCKET_CLEANUP_THRESHOLD + 1);

        state.evict_expired(now);
        assert!(state.buckets.is_empty());
    }

    #[tokio::test]
    async fn test_graceful_stop_drains_queue() {
        let limiter = limiter(1, 50);
        let (first, rx_first) = PendingWork::new(key("/ping", "a"), false);
        let (second, rx_second) = PendingWork::new(key("/ping", "a"), false);
        limiter.enqueue(Box::new(first));
        limiter.enqueue(Box::new(second));

        let (done_tx, done_rx) = oneshot::channel();
        limiter.stop(false, Box::new(move || {
            let _ = done_tx.send(());
        }));

        assert!(rx_first.await.unwrap().is_some());
        assert!(rx_second.await.unwrap().is_some());
        tokio::time::timeout(Duration::from_secs(2), done_rx)
            .await
            .unwrap()
            .unwrap();
    }
}

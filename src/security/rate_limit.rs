//! Per-client admission control (token bucket).
//!
//! # Responsibilities
//! - Keep one bucket per client identity, created full on first sight
//! - Refill continuously from elapsed time, spend one token per request
//! - Evict buckets that have been idle past the retention threshold
//!
//! # Locking
//! The client map is a sharded `DashMap`; each bucket sits behind its own
//! `Mutex`. `allow` holds a shard read guard while it locks the bucket, and
//! the sweep holds the shard write guard while it inspects and removes
//! buckets, so eviction can never interleave with a refill/decrement on the
//! same client. Different clients never share a bucket lock.
//!
//! # Memory
//! Bounded by (distinct clients seen within the retention window) × (one
//! bucket entry), plus the static override table.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimiterConfig;
use crate::lifecycle::PeriodicTask;
use crate::observability::metrics;

/// Capacity and refill rate of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientLimit {
    pub capacity: u64,
    pub rate_per_sec: u64,
}

impl ClientLimit {
    pub fn new(capacity: u64, rate_per_sec: u64) -> Self {
        Self {
            capacity,
            rate_per_sec,
        }
    }
}

#[derive(Debug)]
struct ClientBucket {
    tokens: u64,
    limit: ClientLimit,
    last_refill: Instant,
}

impl ClientBucket {
    fn full(limit: ClientLimit, now: Instant) -> Self {
        Self {
            tokens: limit.capacity,
            limit,
            last_refill: now,
        }
    }

    /// Add whole tokens earned since `last_refill`. The timestamp only moves
    /// when at least one token is added.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        // float-to-int casts saturate
        let earned = (elapsed * self.limit.rate_per_sec as f64).floor() as u64;
        if earned > 0 {
            self.tokens = self.tokens.saturating_add(earned).min(self.limit.capacity);
            self.last_refill = now;
        }
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn apply_limit(&mut self, limit: ClientLimit) {
        self.limit = limit;
        self.tokens = self.tokens.min(limit.capacity);
    }
}

fn lock(bucket: &Mutex<ClientBucket>) -> MutexGuard<'_, ClientBucket> {
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Token-bucket admission controller keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<ClientBucket>>,
    /// Limits set through `set_client_limit`; they outlive bucket eviction.
    overrides: DashMap<String, ClientLimit>,
    default_limit: ClientLimit,
    idle_retention: Duration,
}

impl RateLimiter {
    pub fn new(default_limit: ClientLimit, idle_retention: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            overrides: DashMap::new(),
            default_limit,
            idle_retention,
        }
    }

    /// Build a limiter from the `[rate_limiter]` section, overrides included.
    pub fn from_config(config: &RateLimiterConfig) -> Self {
        let limiter = Self::new(
            ClientLimit::new(
                config.default_limit.capacity,
                config.default_limit.rate_per_sec,
            ),
            Duration::from_secs(config.idle_retention_secs),
        );
        for o in &config.overrides {
            limiter.set_client_limit(&o.client, ClientLimit::new(o.capacity, o.rate_per_sec));
        }
        tracing::info!(
            capacity = config.default_limit.capacity,
            rate_per_sec = config.default_limit.rate_per_sec,
            overrides = config.overrides.len(),
            "Rate limiter ready"
        );
        limiter
    }

    /// Spend one token for `client`. Returns false when the bucket is empty.
    pub fn allow(&self, client: &str) -> bool {
        let now = Instant::now();

        if let Some(bucket) = self.buckets.get(client) {
            return lock(&bucket).try_acquire(now);
        }

        let limit = self.limit_for(client);
        let bucket = self
            .buckets
            .entry(client.to_string())
            .or_insert_with(|| Mutex::new(ClientBucket::full(limit, now)));
        let allowed = lock(&bucket).try_acquire(now);
        allowed
    }

    /// Override `client`'s capacity and rate.
    ///
    /// A live bucket keeps its tokens, clamped to the new capacity. A client
    /// with no bucket gets one, full at the new capacity.
    pub fn set_client_limit(&self, client: &str, limit: ClientLimit) {
        self.overrides.insert(client.to_string(), limit);

        let now = Instant::now();
        let bucket = self
            .buckets
            .entry(client.to_string())
            .or_insert_with(|| Mutex::new(ClientBucket::full(limit, now)));
        lock(&bucket).apply_limit(limit);

        tracing::debug!(
            client = %client,
            capacity = limit.capacity,
            rate_per_sec = limit.rate_per_sec,
            "Client limit set"
        );
    }

    fn limit_for(&self, client: &str) -> ClientLimit {
        self.overrides
            .get(client)
            .map(|l| *l)
            .unwrap_or(self.default_limit)
    }

    /// Evict every bucket whose last refill is older than the retention
    /// threshold. Returns the number of buckets removed.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;

        self.buckets.retain(|_, bucket| {
            // retain holds the shard write guard: no allow() can be inside
            // this bucket, so no lock is needed
            let bucket = bucket.get_mut().unwrap_or_else(PoisonError::into_inner);
            let idle = now.saturating_duration_since(bucket.last_refill) > self.idle_retention;
            if idle {
                evicted += 1;
            }
            !idle
        });

        let remaining = self.buckets.len();
        metrics::record_tracked_clients(remaining);
        tracing::debug!(evicted, remaining, "Idle client buckets swept");
        evicted
    }

    /// Number of clients currently holding a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Tokens left in `client`'s bucket, without refilling.
    pub fn tokens(&self, client: &str) -> Option<u64> {
        self.buckets.get(client).map(|b| lock(&b).tokens)
    }

    /// Start the idle sweep on its own periodic task.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) -> PeriodicTask {
        let limiter = Arc::clone(self);
        PeriodicTask::spawn("rate-limit-sweeper", every, move || {
            let limiter = limiter.clone();
            async move {
                limiter.sweep_idle();
            }
        })
    }
}

//! Token bucket admission for tollgate.
//!
//! Each protected route owns one [`RateLimiter`]: a [`BucketConfig`] plus the
//! per-client state observed against it. Admission is a five-step
//! transaction per client:
//!
//! 1. reject while a lockout is active, pardoning violations once it expires
//! 2. start a lockout once the violation threshold is reached
//! 3. count rapid retries against an empty bucket as violations
//! 4. refill tokens for the time elapsed since the last refill
//! 5. spend one token, or reject
//!
//! State lives in a [`DashMap`](dashmap::DashMap)-backed [`AdmissionStore`],
//! so checks for different clients never wait on each other.

pub mod bucket;
pub mod store;
pub mod token_bucket;

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

pub use bucket::BucketConfig;
pub use store::{AdmissionStore, ClientState};
pub use token_bucket::{Decision, TokenBucket};

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A shareable token bucket limiter.
///
/// Cheaply cloneable (backed by `Arc`); clones share client state.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: BucketConfig) -> Self {
        tracing::info!(
            capacity = config.capacity(),
            refill_rate = config.refill_rate(),
            refill_period_ms = saturating_millis(config.refill_period()),
            block_threshold = config.block_threshold(),
            block_duration_ms = saturating_millis(config.block_duration()),
            "creating token bucket rate limiter"
        );
        Self {
            inner: Arc::new(TokenBucket::new(config)),
        }
    }

    /// Check whether a request identified by `key` is admitted at `now`.
    pub fn allow(&self, key: &str, now: Instant) -> Decision {
        self.inner.allow(key, now)
    }

    /// Approximate wait before `key` can be admitted. Zero for unknown keys.
    pub fn remaining_time(&self, key: &str, now: Instant) -> Duration {
        self.inner.remaining_time(key, now)
    }

    pub fn config(&self) -> &BucketConfig {
        self.inner.config()
    }

    pub fn state(&self, key: &str) -> Option<ClientState> {
        self.inner.state(key)
    }

    pub fn tracked_clients(&self) -> usize {
        self.inner.tracked_clients()
    }

    /// Evict clients idle for longer than `max_idle`.
    pub fn evict_idle(&self, now: Instant, max_idle: Duration) -> usize {
        self.inner.evict_idle(now, max_idle)
    }

    /// Spawn a background thread that evicts idle clients every `interval`.
    ///
    /// The thread only holds a weak reference and exits once every clone of
    /// this limiter has been dropped.
    pub fn start_cleanup_task(
        &self,
        interval: Duration,
        max_idle: Duration,
    ) -> std::io::Result<()> {
        let inner: Weak<TokenBucket> = Arc::downgrade(&self.inner);

        std::thread::Builder::new()
            .name("rate-limit-cleanup".into())
            .spawn(move || loop {
                std::thread::sleep(interval);

                let Some(limiter) = inner.upgrade() else {
                    tracing::debug!("rate limiter dropped, stopping cleanup");
                    break;
                };
                limiter.evict_idle(Instant::now(), max_idle);

                tracing::trace!("rate limiter cleanup tick completed");
            })?;

        Ok(())
    }
}

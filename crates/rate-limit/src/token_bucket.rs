use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::bucket::BucketConfig;
use crate::store::{AdmissionStore, ClientState};

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A token was available and consumed.
    Admitted,
    /// No token was available, or the client retried too quickly while starved.
    RateLimited,
    /// The client is serving a lockout for repeated violations.
    Blocked,
}

impl Decision {
    pub fn is_admitted(self) -> bool {
        matches!(self, Decision::Admitted)
    }
}

/// Token bucket with violation tracking and temporary lockouts.
///
/// Every client key gets its own bucket, created full on first observation,
/// that refills at `refill_rate` tokens per `refill_period` up to `capacity`.
/// Rejected retries that arrive within the minimum request spacing while the
/// bucket is empty are counted as violations; once `block_threshold`
/// violations accumulate the client is locked out for `block_duration`.
///
/// All instants passed in must come from the same clock.
#[derive(Debug)]
pub struct TokenBucket {
    config: BucketConfig,
    store: AdmissionStore,
}

impl TokenBucket {
    pub fn new(config: BucketConfig) -> Self {
        Self {
            config,
            store: AdmissionStore::new(),
        }
    }

    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    /// Check whether a request from `key` at `now` is admitted.
    ///
    /// The whole check runs as one transaction on the client's entry.
    pub fn allow(&self, key: &str, now: Instant) -> Decision {
        let config = &self.config;

        self.store.update(
            key,
            || ClientState::new(config, now),
            |state| {
                if let Some(until) = state.blocked_until {
                    if now < until {
                        debug!(client_id = key, "request rejected during lockout");
                        return Decision::Blocked;
                    }
                    // An expired lockout pardons every earlier violation.
                    state.blocked_until = None;
                    state.violation_count = 0;
                    debug!(client_id = key, "lockout expired");
                }

                if state.violation_count >= config.block_threshold() {
                    state.blocked_until = Some(deadline(now, config.block_duration()));
                    warn!(
                        client_id = key,
                        violations = state.violation_count,
                        block_secs = config.block_duration().as_secs(),
                        "client locked out after repeated violations"
                    );
                    return Decision::Blocked;
                }

                if let Some(last) = state.last_request_at {
                    let since = now.saturating_duration_since(last);
                    let starved = state.available(config, now) < 1.0;
                    if starved && since < config.min_request_spacing() {
                        state.violation_count = state.violation_count.saturating_add(1);
                        debug!(
                            client_id = key,
                            violations = state.violation_count,
                            "rapid retry while starved of tokens"
                        );
                        return Decision::RateLimited;
                    }
                }
                state.last_request_at = Some(now);

                state.refill(config, now);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    Decision::Admitted
                } else {
                    debug!(client_id = key, tokens = state.tokens, "bucket empty");
                    Decision::RateLimited
                }
            },
        )
    }

    /// Approximate time until `key` may be admitted again.
    ///
    /// A client that has never been observed has nothing to wait for and gets
    /// zero. A client under lockout gets the time left on the lockout. Anyone
    /// else gets the time remaining in the current refill period, measured
    /// from the later of their last request or their last lockout expiry.
    /// This is an estimate of time-to-next-token, not a guarantee.
    pub fn remaining_time(&self, key: &str, now: Instant) -> Duration {
        let Some(state) = self.store.snapshot(key) else {
            return Duration::ZERO;
        };

        if let Some(until) = state.blocked_until {
            if now < until {
                return until - now;
            }
        }

        let reference = match (state.blocked_until, state.last_request_at) {
            (Some(blocked), Some(request)) => blocked.max(request),
            (Some(blocked), None) => blocked,
            (None, Some(request)) => request,
            (None, None) => return Duration::ZERO,
        };

        let period = self.config.refill_period();
        let elapsed = now.saturating_duration_since(reference);
        let into_period = elapsed.as_nanos() % period.as_nanos();
        period.saturating_sub(Duration::from_nanos(
            u64::try_from(into_period).unwrap_or(u64::MAX),
        ))
    }

    /// Copy of the stored state for `key`.
    pub fn state(&self, key: &str) -> Option<ClientState> {
        self.store.snapshot(key)
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.store.len()
    }

    /// Evict clients idle for longer than `max_idle`.
    pub fn evict_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let evicted = self.store.evict_idle(now, max_idle);
        debug!(
            evicted,
            remaining = self.store.len(),
            "token bucket cleanup complete"
        );
        evicted
    }
}

/// `now + duration`, saturating far in the future instead of overflowing.
fn deadline(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .or_else(|| now.checked_add(Duration::from_secs(u64::from(u32::MAX))))
        .unwrap_or(now)
}

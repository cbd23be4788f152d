use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::bucket::BucketConfig;

/// Mutable admission state for one client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientState {
    pub tokens: f64,
    pub last_refill_at: Instant,
    pub last_request_at: Option<Instant>,
    pub violation_count: u32,
    pub blocked_until: Option<Instant>,
}

impl ClientState {
    /// A brand-new client starts with a full bucket.
    pub fn new(config: &BucketConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity(),
            last_refill_at: now,
            last_request_at: None,
            violation_count: 0,
            blocked_until: None,
        }
    }

    /// Tokens the bucket would hold at `now`, without refilling it.
    pub fn available(&self, config: &BucketConfig, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill_at);
        let tokens = self.tokens + config.tokens_for(elapsed);
        tokens.min(config.capacity()).max(0.0)
    }

    /// Add the tokens accrued since the last refill, clamped to `0..=capacity`.
    pub fn refill(&mut self, config: &BucketConfig, now: Instant) {
        self.tokens = self.available(config, now);
        self.last_refill_at = now;
    }

    /// Most recent instant at which this client did anything.
    fn last_activity(&self) -> Instant {
        [self.last_request_at, self.blocked_until]
            .into_iter()
            .flatten()
            .fold(self.last_refill_at, Instant::max)
    }
}

/// Concurrent per-client state, keyed by client identity.
///
/// Backed by a sharded [`DashMap`]. [`update`](Self::update) holds the shard
/// write guard for the whole closure, so a read-modify-write on one key is
/// never interleaved with another on the same key, while keys in other shards
/// proceed in parallel. Closures must not call back into the store.
#[derive(Debug, Default)]
pub struct AdmissionStore {
    clients: DashMap<String, ClientState>,
}

impl AdmissionStore {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Run `f` against the state for `key`, creating it with `init` on first
    /// observation.
    pub fn update<R>(
        &self,
        key: &str,
        init: impl FnOnce() -> ClientState,
        f: impl FnOnce(&mut ClientState) -> R,
    ) -> R {
        let mut entry = self.clients.entry(key.to_string()).or_insert_with(init);
        f(entry.value_mut())
    }

    /// Copy of the state for `key`, if the client has been observed.
    pub fn snapshot(&self, key: &str) -> Option<ClientState> {
        self.clients.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drop clients with no activity for longer than `max_idle`. Clients whose
    /// lockout has not yet expired are always kept.
    ///
    /// Returns the number of evicted entries.
    pub fn evict_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_key, state| {
            state.blocked_until.is_some_and(|until| until > now)
                || now.saturating_duration_since(state.last_activity()) < max_idle
        });
        before.saturating_sub(self.clients.len())
    }
}

//! # Keyed Client Rate Limiter
//!
//! Holds one token bucket per key (typically a session identifier) and answers
//! "may this request proceed?" with enough detail for a caller to tell the
//! user when to try again.
//!
//! ```text
//!     Client Rate Limiting Architecture:
//!
//!     check_limit("session-a") ──┐
//!     check_limit("session-b") ──┼──► ClientRateLimiter ──► Token Buckets
//!     check_limit(None) ─────────┘         │                 (lazily created)
//!                    │                     ▼
//!              key generator        ┌──────────────┐
//!                                   │  DashMap     │
//!                                   │  key → 🪣    │
//!                                   └──────┬───────┘
//!                                          │ best effort
//!                                          ▼
//!                                   KeyValueStore
//!                                   rate_limit_<key>
//! ```
//!
//! ## Key Behaviors
//!
//! 1. **Lazy Buckets**: A key's bucket is created full on first use
//! 2. **Advisory Persistence**: Each decision is written to the store; write
//!    failures are ignored and stored snapshots are never read back
//! 3. **Fail Open**: A broken bucket never blocks the feature it guards
//!
//! ## Failing Open
//!
//! A bucket built from a validated [`RateLimitConfig`] keeps its token count
//! within `0..=capacity`, so the fail-open branch is not reachable through
//! the public API. It exists for a bucket whose count stops being a usable
//! number (non-finite, negative or above capacity). Such a bucket is
//! discarded, the request is allowed as if it had hit a fresh bucket
//! (`max_requests - 1` remaining) and [`LimiterStats::total_failed_open`] is
//! incremented. The next call for that key starts from a new full bucket.

use super::{
    config::RateLimitConfig,
    core::TokenBucket,
    store::{storage_key, KeyValueStore, StoredBucket},
};
use crate::clock::{SharedClock, SystemClock};
use crate::error::{ConfigError, StoreError};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key used when neither the caller nor a key generator supplies one.
pub const DEFAULT_KEY: &str = "default";

/// Produces the key for calls that do not pass one.
pub type KeyGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Outcome of a single [`ClientRateLimiter::check_limit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Whole tokens left after this decision.
    pub remaining: u64,
    /// When the full window will have elapsed from now (ms, limiter clock).
    pub reset_at_ms: u64,
    /// Estimated wait before a token is available. Only set when denied.
    pub retry_after_ms: Option<u64>,
}

/// Per-key token-bucket limiter.
///
/// ## Example
///
/// ```rust
/// use adrefresh::{ClientRateLimiter, RateLimitConfig};
///
/// let limiter = ClientRateLimiter::new(RateLimitConfig::new(2, 60_000));
///
/// assert!(limiter.check_limit(Some("session-1")).allowed);
/// assert!(limiter.check_limit(Some("session-1")).allowed);
///
/// let denied = limiter.check_limit(Some("session-1"));
/// assert!(!denied.allowed);
/// assert_eq!(denied.remaining, 0);
/// assert!(denied.retry_after_ms.is_some());
///
/// // Other keys have their own budget.
/// assert!(limiter.check_limit(Some("session-2")).allowed);
/// ```
pub struct ClientRateLimiter {
    /// Buckets by key. Shard locks serialize access to a single bucket.
    buckets: DashMap<String, TokenBucket, ahash::RandomState>,

    /// Template for new buckets.
    config: RateLimitConfig,

    clock: SharedClock,

    /// Where decisions are mirrored. `None` disables persistence.
    store: Option<Arc<dyn KeyValueStore>>,

    key_generator: KeyGenerator,

    total_created: AtomicU64,
    total_allowed: AtomicU64,
    total_denied: AtomicU64,
    total_failed_open: AtomicU64,
}

impl ClientRateLimiter {
    /// Creates a limiter on the system clock without persistence.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid (see [`RateLimitConfig::validate`]).
    /// Use [`ClientRateLimiter::try_new`] to handle the error instead.
    pub fn new(config: RateLimitConfig) -> Self {
        match Self::try_new(config) {
            Ok(limiter) => limiter,
            Err(err) => panic!("Invalid rate limiter configuration: {err}"),
        }
    }

    /// Creates a limiter, validating the configuration first.
    pub fn try_new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            buckets: DashMap::with_hasher(ahash::RandomState::new()),
            config,
            clock: Arc::new(SystemClock),
            store: None,
            key_generator: Arc::new(|| DEFAULT_KEY.to_string()),
            total_created: AtomicU64::new(0),
            total_allowed: AtomicU64::new(0),
            total_denied: AtomicU64::new(0),
            total_failed_open: AtomicU64::new(0),
        })
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Mirrors every decision into `store`.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets how keys are derived when callers pass `None`.
    ///
    /// ```rust
    /// use adrefresh::{ClientRateLimiter, RateLimitConfig};
    ///
    /// let limiter = ClientRateLimiter::new(RateLimitConfig::picker())
    ///     .with_key_generator(|| "picker_localhost".to_string());
    ///
    /// limiter.check_limit(None);
    /// assert_eq!(limiter.active_keys(), 1);
    /// ```
    pub fn with_key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.key_generator = Arc::new(generator);
        self
    }

    /// Decides whether one more request under `key` may proceed.
    ///
    /// Refills the key's bucket for the elapsed time, consumes a token if one
    /// is available, then writes a snapshot to the store.
    pub fn check_limit(&self, key: Option<&str>) -> RateLimitDecision {
        let key = match key {
            Some(key) => key.to_string(),
            None => (self.key_generator)(),
        };
        let now = self.clock.now_ms();
        let reset_at_ms = now.saturating_add(self.config.window_ms);

        let evaluated = {
            let mut bucket = self.buckets.entry(key.clone()).or_insert_with(|| {
                self.total_created.fetch_add(1, Ordering::Relaxed);
                debug!("Created rate limit bucket for key: {}", key);
                TokenBucket::from_config(&self.config, now)
            });

            if bucket.is_corrupted() {
                None
            } else {
                let allowed = bucket.try_consume(now);
                let tokens = bucket.tokens(now);
                tokens.is_finite().then_some((allowed, tokens))
            }
        };

        let Some((allowed, tokens)) = evaluated else {
            return self.fail_open(&key, reset_at_ms);
        };

        let retry_after_ms = (!allowed).then(|| {
            let deficit = (1.0 - tokens).max(0.0);
            (deficit * self.config.ms_per_token()).ceil() as u64
        });

        let decision = RateLimitDecision {
            allowed,
            remaining: tokens.floor().max(0.0) as u64,
            reset_at_ms,
            retry_after_ms,
        };

        if allowed {
            self.total_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_denied.fetch_add(1, Ordering::Relaxed);
        }

        self.persist(&key, &decision, now);
        decision
    }

    /// Allows the request after a component failure and discards the bucket.
    fn fail_open(&self, key: &str, reset_at_ms: u64) -> RateLimitDecision {
        warn!(
            "Rate limit bucket for key {} is unusable, allowing request",
            key
        );
        self.buckets.remove(key);
        self.total_failed_open.fetch_add(1, Ordering::Relaxed);

        RateLimitDecision {
            allowed: true,
            remaining: (self.config.max_requests as u64).saturating_sub(1),
            reset_at_ms,
            retry_after_ms: None,
        }
    }

    /// Best-effort snapshot write. Never affects the decision.
    fn persist(&self, key: &str, decision: &RateLimitDecision, now: u64) {
        let Some(store) = &self.store else {
            return;
        };

        let snapshot = StoredBucket {
            tokens: decision.remaining,
            last_refill: now,
            reset_time: decision.reset_at_ms,
        };

        let result = serde_json::to_string(&snapshot)
            .map_err(StoreError::from)
            .and_then(|json| store.set(&storage_key(key), json));

        if let Err(err) = result {
            debug!("Rate limit persistence failed for key {}: {}", key, err);
        }
    }

    /// Forgets a key's bucket and its stored snapshot.
    pub fn reset(&self, key: Option<&str>) {
        let key = match key {
            Some(key) => key.to_string(),
            None => (self.key_generator)(),
        };

        self.buckets.remove(&key);
        if let Some(store) = &self.store {
            if let Err(err) = store.remove(&storage_key(&key)) {
                debug!("Failed to remove stored bucket for key {}: {}", key, err);
            }
        }
    }

    /// Drops every bucket. Stored snapshots are left alone.
    pub fn clear(&self) {
        self.buckets.clear();
    }

    /// Whole tokens currently available for `key`, without consuming any.
    ///
    /// Unknown keys report full capacity, which is what their first check
    /// will see.
    pub fn available(&self, key: &str) -> u64 {
        let now = self.clock.now_ms();
        match self.buckets.get_mut(key) {
            Some(mut bucket) => bucket.remaining(now),
            None => self.config.max_requests as u64,
        }
    }

    /// Number of keys with a live bucket.
    #[inline]
    pub fn active_keys(&self) -> usize {
        self.buckets.len()
    }

    /// The configuration new buckets are built from.
    #[inline]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counters since construction.
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            active_keys: self.active_keys(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_allowed: self.total_allowed.load(Ordering::Relaxed),
            total_denied: self.total_denied.load(Ordering::Relaxed),
            total_failed_open: self.total_failed_open.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_bucket_for_test(&self, key: &str) {
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            bucket.set_tokens_for_test(f64::NAN);
        }
    }
}

impl fmt::Debug for ClientRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRateLimiter")
            .field("config", &self.config)
            .field("active_keys", &self.active_keys())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

/// Statistics for a [`ClientRateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterStats {
    /// Keys with a live bucket.
    pub active_keys: usize,
    /// Buckets created since startup.
    pub total_created: u64,
    /// Allowed decisions.
    pub total_allowed: u64,
    /// Denied decisions.
    pub total_denied: u64,
    /// Decisions that failed open.
    pub total_failed_open: u64,
}

impl LimiterStats {
    /// Fraction of decisions that were denials. 0.0 with no decisions.
    pub fn denial_rate(&self) -> f64 {
        let total = self.total_allowed + self.total_denied;
        if total == 0 {
            0.0
        } else {
            self.total_denied as f64 / total as f64
        }
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Client Rate Limiter Stats:\n\
             ├─ Buckets:\n\
             │  ├─ Active Keys: {}\n\
             │  └─ Total Created: {}\n\
             └─ Decisions:\n\
                ├─ Allowed: {}\n\
                ├─ Denied: {}\n\
                ├─ Failed Open: {}\n\
                └─ Denial Rate: {:.2}%",
            self.active_keys,
            self.total_created,
            self.total_allowed,
            self.total_denied,
            self.total_failed_open,
            self.denial_rate() * 100.0
        )
    }
}

impl fmt::Display for LimiterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

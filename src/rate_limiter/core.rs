//! # Core Token Bucket
//!
//! The bucket tracks a fractional token count so that refill is smooth: with a
//! limit of 10 requests per minute, one token trickles back every 6 seconds
//! rather than all ten at the top of the minute.
//!
//! ```text
//!     How Token Bucket Works (capacity 10, 10 per 60s):
//!
//!     t=0s   ┌──────────────────┐
//!            │ 🪙🪙🪙🪙🪙🪙🪙🪙🪙🪙 │ 10.0 tokens
//!            └──────────────────┘
//!     10 requests at t=0s
//!            ┌──────────────────┐
//!            │                  │  0.0 tokens ─► 11th request denied
//!            └──────────────────┘
//!     t=30s  ┌──────────────────┐
//!            │ 🪙🪙🪙🪙🪙          │  5.0 tokens (30s × 1/6 per s)
//!            └──────────────────┘
//! ```
//!
//! A bucket is plain data: it is mutated through `&mut self` while its owner
//! (the keyed limiter) holds the map shard lock, so there is no atomic dance
//! here.

use super::config::RateLimitConfig;

/// A single token bucket.
///
/// Invariant: `0.0 <= tokens <= capacity` after every public call.
///
/// ```rust
/// use adrefresh::TokenBucket;
///
/// let mut bucket = TokenBucket::new(3, 1.0, 0);
/// assert!(bucket.try_consume(0));
/// assert!(bucket.try_consume(0));
/// assert!(bucket.try_consume(0));
/// assert!(!bucket.try_consume(0));
///
/// // One second later, one token is back.
/// assert!(bucket.try_consume(1_000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate_per_sec: f64,
    last_refill_ms: u64,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum tokens (burst size)
    /// * `refill_rate_per_sec` - Tokens added per elapsed second
    /// * `now_ms` - Creation time on the caller's clock
    pub fn new(capacity: u32, refill_rate_per_sec: f64, now_ms: u64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_rate_per_sec: refill_rate_per_sec.max(0.0),
            last_refill_ms: now_ms,
        }
    }

    /// Creates a full bucket sized from a limiter config.
    pub fn from_config(config: &RateLimitConfig, now_ms: u64) -> Self {
        Self::new(config.max_requests, config.refill_rate_per_sec(), now_ms)
    }

    /// Adds `elapsed_secs × refill_rate` tokens, capped at capacity.
    ///
    /// A clock that steps backwards adds nothing; the refill mark never moves
    /// back either.
    #[inline]
    pub fn refill(&mut self, now_ms: u64) {
        let elapsed_ms = now_ms.saturating_sub(self.last_refill_ms);
        if elapsed_ms == 0 {
            return;
        }

        let added = (elapsed_ms as f64 / 1000.0) * self.refill_rate_per_sec;
        self.tokens = (self.tokens + added).min(self.capacity);
        self.last_refill_ms = now_ms;
    }

    /// Refills, then takes one token if one is available.
    #[inline]
    pub fn try_consume(&mut self, now_ms: u64) -> bool {
        self.try_consume_n(1, now_ms)
    }

    /// Refills, then takes `n` tokens if all are available. Takes none otherwise.
    pub fn try_consume_n(&mut self, n: u32, now_ms: u64) -> bool {
        self.refill(now_ms);

        let n = n as f64;
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Current fractional token count after refilling.
    pub fn tokens(&mut self, now_ms: u64) -> f64 {
        self.refill(now_ms);
        self.tokens
    }

    /// Whole tokens available after refilling.
    pub fn remaining(&mut self, now_ms: u64) -> u64 {
        self.tokens(now_ms).floor().max(0.0) as u64
    }

    /// Milliseconds until one token is available, based on the current deficit.
    ///
    /// Returns 0 when a token is already available.
    pub fn time_until_token_ms(&self) -> u64 {
        let deficit = 1.0 - self.tokens;
        if deficit <= 0.0 {
            return 0;
        }
        if self.refill_rate_per_sec <= 0.0 {
            return u64::MAX;
        }
        ((deficit / self.refill_rate_per_sec) * 1000.0).ceil() as u64
    }

    /// Time of the last refill on the caller's clock.
    #[inline]
    pub fn last_refill_ms(&self) -> u64 {
        self.last_refill_ms
    }

    /// Returns `true` if the token count is no longer a usable number.
    ///
    /// The keyed limiter treats such a bucket as a component failure and fails
    /// open.
    #[inline]
    pub fn is_corrupted(&self) -> bool {
        !self.tokens.is_finite() || self.tokens < 0.0 || self.tokens > self.capacity
    }

    #[cfg(test)]
    pub(crate) fn set_tokens_for_test(&mut self, tokens: f64) {
        self.tokens = tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_consumption() {
        let mut bucket = TokenBucket::new(10, 1.0, 0);

        for _ in 0..10 {
            assert!(bucket.try_consume(0));
        }

        assert!(!bucket.try_consume(0));
    }

    #[test]
    fn test_capacity_drain_for_many_shapes() {
        for capacity in [1u32, 2, 7, 30, 100, 1_000] {
            for rate in [0.1, 1.0, 16.5, 250.0] {
                let mut bucket = TokenBucket::new(capacity, rate, 5_000);
                for _ in 0..capacity {
                    assert!(bucket.try_consume(5_000));
                }
                assert!(!bucket.try_consume(5_000), "capacity {capacity} rate {rate}");
            }
        }
    }

    #[test]
    fn test_full_window_restores_capacity() {
        let config = RateLimitConfig::new(10, 60_000);
        let mut bucket = TokenBucket::from_config(&config, 0);

        for _ in 0..10 {
            assert!(bucket.try_consume(0));
        }
        assert_eq!(bucket.remaining(0), 0);

        let tokens = bucket.tokens(60_000);
        assert!((tokens - 10.0).abs() < 1e-9, "tokens = {tokens}");
    }

    #[test]
    fn test_refill_is_monotonic_and_capped() {
        let mut bucket = TokenBucket::new(5, 2.0, 0);
        assert!(bucket.try_consume_n(5, 0));

        let mut last = 0.0;
        for t in (0..=5_000).step_by(250) {
            let tokens = bucket.tokens(t);
            assert!(tokens >= last);
            assert!(tokens <= 5.0);
            last = tokens;
        }
        assert_eq!(last, 5.0);
    }

    #[test]
    fn test_bulk_consumption_is_all_or_nothing() {
        let mut bucket = TokenBucket::new(10, 1.0, 0);

        assert!(bucket.try_consume_n(5, 0));
        assert!(bucket.try_consume_n(3, 0));
        assert!(!bucket.try_consume_n(5, 0));
        assert!(bucket.try_consume_n(2, 0));
        assert!(bucket.try_consume_n(0, 0));
    }

    #[test]
    fn test_clock_going_backwards_adds_nothing() {
        let mut bucket = TokenBucket::new(4, 1.0, 10_000);
        assert!(bucket.try_consume_n(4, 10_000));

        assert_eq!(bucket.tokens(9_000), 0.0);
        assert_eq!(bucket.last_refill_ms(), 10_000);
    }

    #[test]
    fn test_time_until_token() {
        let mut bucket = TokenBucket::new(10, 2.0, 0);
        assert_eq!(bucket.time_until_token_ms(), 0);

        assert!(bucket.try_consume_n(10, 0));
        assert_eq!(bucket.time_until_token_ms(), 500);

        // Half a token back: half the wait remains.
        bucket.refill(250);
        assert_eq!(bucket.time_until_token_ms(), 250);
    }

    #[test]
    fn test_zero_rate_never_refills() {
        let mut bucket = TokenBucket::new(1, 0.0, 0);
        assert!(bucket.try_consume(0));
        assert!(!bucket.try_consume(1_000_000));
        assert_eq!(bucket.time_until_token_ms(), u64::MAX);
    }

    #[test]
    fn test_corruption_detection() {
        let mut bucket = TokenBucket::new(3, 1.0, 0);
        assert!(!bucket.is_corrupted());

        bucket.set_tokens_for_test(f64::NAN);
        assert!(bucket.is_corrupted());

        bucket.set_tokens_for_test(-1.0);
        assert!(bucket.is_corrupted());
    }
}

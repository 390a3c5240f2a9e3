//! # Rate Limiter Configuration
//!
//! A limiter is described by two numbers: how many requests are allowed, and
//! over how long a window. Everything else (bucket capacity, refill speed,
//! retry hints) is derived from them.
//!
//! ```text
//!     Token Bucket Configuration:
//!
//!     ┌──────────────────────────────┐
//!     │   Capacity = max_requests    │ ← Burst limit
//!     │   ┌─────────────────────┐    │
//!     │   │ 🪙 🪙 🪙 🪙 🪙     │    │
//!     │   │ 🪙 🪙 🪙 🪙 🪙     │    │ ← Current tokens
//!     │   └─────────────────────┘    │
//!     │                              │
//!     │   Refill: max_requests       │ ← spread continuously
//!     │           per window_ms      │   over the window
//!     └──────────────────────────────┘
//! ```

use crate::error::ConfigError;

/// Configuration shared by the token-bucket and fixed-window limiters.
///
/// ## Examples
///
/// ```rust
/// use adrefresh::RateLimitConfig;
///
/// // 10 requests per minute
/// let config = RateLimitConfig::new(10, 60_000);
/// assert_eq!(config.refill_rate_per_sec(), 10.0 / 60.0);
///
/// // The limiter used in front of the picking endpoint
/// let picker = RateLimitConfig::picker();
/// assert_eq!(picker.max_requests, 30);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window, which is also the bucket capacity.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    /// Same as [`RateLimitConfig::api`]: 10 requests per minute.
    fn default() -> Self {
        Self::api()
    }
}

impl RateLimitConfig {
    /// Creates a configuration allowing `max_requests` per `window_ms`.
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// General API calls: 10 requests per minute.
    pub const fn api() -> Self {
        Self::new(10, 60_000)
    }

    /// Picks: 30 per minute.
    pub const fn picker() -> Self {
        Self::new(30, 60_000)
    }

    /// Convenience for per-second limits.
    pub const fn per_second(requests: u32) -> Self {
        Self::new(requests, 1_000)
    }

    /// Convenience for per-minute limits.
    pub const fn per_minute(requests: u32) -> Self {
        Self::new(requests, 60_000)
    }

    /// Window length in seconds.
    #[inline]
    pub fn window_secs(&self) -> f64 {
        self.window_ms as f64 / 1000.0
    }

    /// Tokens added back per second: `max_requests / window_secs`.
    #[inline]
    pub fn refill_rate_per_sec(&self) -> f64 {
        if self.window_ms == 0 {
            0.0
        } else {
            self.max_requests as f64 / self.window_secs()
        }
    }

    /// Milliseconds it takes to earn back one token.
    #[inline]
    pub fn ms_per_token(&self) -> f64 {
        if self.max_requests == 0 {
            0.0
        } else {
            self.window_ms as f64 / self.max_requests as f64
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_requests` or `window_ms` is zero.
    ///
    /// ```rust
    /// use adrefresh::RateLimitConfig;
    ///
    /// assert!(RateLimitConfig::new(0, 1_000).validate().is_err());
    /// assert!(RateLimitConfig::new(5, 0).validate().is_err());
    /// assert!(RateLimitConfig::new(5, 1_000).validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::invalid(
                "max_requests",
                "must be greater than 0",
            ));
        }
        if self.window_ms == 0 {
            return Err(ConfigError::invalid("window_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(RateLimitConfig::api(), RateLimitConfig::new(10, 60_000));
        assert_eq!(RateLimitConfig::picker(), RateLimitConfig::new(30, 60_000));
        assert_eq!(RateLimitConfig::default(), RateLimitConfig::api());
        assert_eq!(RateLimitConfig::per_second(4).window_ms, 1_000);
        assert_eq!(RateLimitConfig::per_minute(4).window_ms, 60_000);
    }

    #[test]
    fn test_derived_rates() {
        let config = RateLimitConfig::new(10, 2_000);
        assert_eq!(config.window_secs(), 2.0);
        assert_eq!(config.refill_rate_per_sec(), 5.0);
        assert_eq!(config.ms_per_token(), 200.0);
    }

    #[test]
    fn test_config_validation_edge_cases() {
        let zero_window = RateLimitConfig::new(10, 0);
        assert!(zero_window.validate().is_err());
        assert_eq!(zero_window.refill_rate_per_sec(), 0.0);

        let zero_requests = RateLimitConfig::new(0, 1_000);
        assert!(zero_requests.validate().is_err());
        assert_eq!(zero_requests.ms_per_token(), 0.0);
    }
}

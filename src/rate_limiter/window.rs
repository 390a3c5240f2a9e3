//! # Fixed-Window Limiter
//!
//! The simpler, server-side counterpart to the token bucket: each key gets a
//! counter that resets when its window expires.
//!
//! ```text
//!     Fixed Window (3 per 10s):
//!
//!     t=0s   ┌─────────────── window ───────────────┐ reset_at = 10s
//!            │ ✅ ✅ ✅ ⛔ ⛔                          │
//!            └───────────────────────────────────────┘
//!     t=10s  ┌─────────────── window ───────────────┐ reset_at = 20s
//!            │ ✅ ...                                 │
//! ```
//!
//! Unlike the token bucket, a denied caller is told to wait for the whole
//! remainder of the window. Expired windows are dropped by [`cleanup`], which
//! can run on a background thread.
//!
//! [`cleanup`]: FixedWindowLimiter::cleanup

use super::{config::RateLimitConfig, manager::RateLimitDecision};
use crate::clock::{SharedClock, SystemClock};
use crate::error::ConfigError;
use dashmap::DashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Default interval between background cleanups (one minute).
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at_ms: u64,
}

/// Counts requests per key per fixed window.
///
/// ## Example
///
/// ```rust
/// use adrefresh::{FixedWindowLimiter, RateLimitConfig};
///
/// let limiter = FixedWindowLimiter::new(RateLimitConfig::new(2, 60_000)).unwrap();
///
/// assert!(limiter.check_limit("10.0.0.1").allowed);
/// assert!(limiter.check_limit("10.0.0.1").allowed);
/// assert!(!limiter.check_limit("10.0.0.1").allowed);
/// ```
pub struct FixedWindowLimiter {
    windows: DashMap<String, WindowEntry, ahash::RandomState>,
    config: RateLimitConfig,
    clock: SharedClock,
    cleanup_interval_ms: u64,
    total_cleaned: AtomicU64,
}

impl FixedWindowLimiter {
    /// Creates a limiter on the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            windows: DashMap::with_hasher(ahash::RandomState::new()),
            config,
            clock: Arc::new(SystemClock),
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
            total_cleaned: AtomicU64::new(0),
        })
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how often the background thread cleans up. Zero is clamped to 1 ms.
    pub fn with_cleanup_interval_ms(mut self, interval_ms: u64) -> Self {
        self.cleanup_interval_ms = interval_ms.max(1);
        self
    }

    /// Counts one request against `key`'s current window.
    ///
    /// Denied requests do not increment the counter.
    pub fn check_limit(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now_ms();
        let max = self.config.max_requests;

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at_ms: now.saturating_add(self.config.window_ms),
            });

        if entry.reset_at_ms <= now {
            *entry = WindowEntry {
                count: 0,
                reset_at_ms: now.saturating_add(self.config.window_ms),
            };
        }

        let allowed = entry.count < max;
        if allowed {
            entry.count += 1;
        }

        RateLimitDecision {
            allowed,
            remaining: max.saturating_sub(entry.count) as u64,
            reset_at_ms: entry.reset_at_ms,
            retry_after_ms: (!allowed).then(|| entry.reset_at_ms.saturating_sub(now)),
        }
    }

    /// Removes windows that have expired. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.windows.len();

        self.windows.retain(|_, entry| entry.reset_at_ms >= now);

        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            self.total_cleaned.fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Fixed-window cleanup removed {} expired windows", removed);
        }
        removed
    }

    /// Number of tracked keys.
    #[inline]
    pub fn active_keys(&self) -> usize {
        self.windows.len()
    }

    /// Windows removed by cleanup since construction.
    #[inline]
    pub fn total_cleaned(&self) -> u64 {
        self.total_cleaned.load(Ordering::Relaxed)
    }

    /// Starts a cleanup thread that stops when the returned sender is used or
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use adrefresh::{FixedWindowLimiter, RateLimitConfig};
    ///
    /// let limiter = Arc::new(FixedWindowLimiter::new(RateLimitConfig::api()).unwrap());
    /// let (handle, stop_tx) = limiter.clone().start_cleanup_thread().unwrap();
    ///
    /// stop_tx.send(()).unwrap();
    /// handle.join().unwrap();
    /// ```
    pub fn start_cleanup_thread(
        self: Arc<Self>,
    ) -> io::Result<(thread::JoinHandle<()>, mpsc::Sender<()>)> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let limiter = self;

        let handle = thread::Builder::new()
            .name("adrefresh-window-cleanup".to_string())
            .spawn(move || {
                info!(
                    "Started fixed-window cleanup thread (interval: {}ms)",
                    limiter.cleanup_interval_ms
                );

                loop {
                    match stop_rx.recv_timeout(Duration::from_millis(limiter.cleanup_interval_ms)) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("Fixed-window cleanup thread stopping");
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            limiter.cleanup();
                        }
                    }
                }
            })?;

        Ok((handle, stop_tx))
    }
}

impl fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("config", &self.config)
            .field("active_keys", &self.active_keys())
            .field("cleanup_interval_ms", &self.cleanup_interval_ms)
            .finish()
    }
}

//! # Rate Limiter Module
//!
//! Token-bucket limiting keyed by session, plus a fixed-window counter for
//! server-side use.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── config.rs       (max_requests per window_ms, presets)
//!     ├── core.rs         (Token bucket with continuous refill)
//!     ├── manager.rs      (Per-key limiter, persistence, fail-open)
//!     ├── window.rs       (Fixed-window counter with cleanup thread)
//!     └── store.rs        (Key-value persistence seam)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     check_limit(key)
//!          │
//!          ▼
//!     ┌─────────┐
//!     │ Manager │ ◄── One bucket per key
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │  Core   │ ◄── Refill, consume, retry hint
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │  Store  │ ◄── Best-effort snapshot
//!     └─────────┘
//! ```

mod config;
mod core;
mod manager;
mod store;
mod window;

/// Limiter settings and presets
pub use config::RateLimitConfig;

/// Single token bucket
pub use self::core::TokenBucket;

/// Keyed limiter and its decisions
pub use manager::{ClientRateLimiter, KeyGenerator, LimiterStats, RateLimitDecision, DEFAULT_KEY};

/// Persistence seam and built-in stores
pub use store::{KeyValueStore, MemoryStore, StoredBucket, UnavailableStore};

/// Fixed-window counter
pub use window::{FixedWindowLimiter, DEFAULT_CLEANUP_INTERVAL_MS};

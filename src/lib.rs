//! # adrefresh - Ad Refresh Orchestration and Client Rate Limiting
//!
//! Keeps on-page ads fresh without hammering ad networks, and rate-limits
//! user-facing work with a token bucket.
//!
//! ## What Does a Refresh Do?
//!
//! A refresh clears stale creatives from the page and asks the active ad
//! network's script to fill them again. Refreshes are triggered by page
//! events (becoming visible, gaining focus, being restored from cache), by
//! components mounting, or by the user.
//!
//! ```text
//!     Refresh lifecycle:
//!
//!     t=0.0s   refresh()          ✅ accepted, guard taken
//!     t=0.5s   refresh()          ⛔ throttled (min interval 5s)
//!     t=0.5s   refresh(force)     ✅ bypasses throttle and guard
//!     t=6.0s   refresh()          ✅ accepted again
//!                 │
//!                 ├─ adapter times out after 10s  ──► retry in 2s
//!                 ├─ adapter times out after 10s  ──► retry in 2s
//!                 └─ adapter succeeds             ──► done
//! ```
//!
//! Every attempt, rejection and retry included, is reported to a
//! [`MetricsAggregator`].
//!
//! ## Quick Start
//!
//! ### Refreshing Ads
//!
//! ```rust
//! use adrefresh::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let surface = Arc::new(
//!     InMemorySurface::new()
//!         .with_library(Provider::Monetag)
//!         .with_container("monetag-footer", None, "<iframe>"),
//! );
//!
//! let orchestrator = OrchestratorBuilder::new()
//!     .settings(AdSettings::new(Some(Provider::Monetag)))
//!     .surface(surface)
//!     .build();
//!
//! let result = orchestrator.refresh(RefreshRequest::new()).await;
//! assert!(result.is_success());
//! assert_eq!(orchestrator.metrics().metrics().total_refreshes, 1);
//! # }
//! ```
//!
//! ### Rate Limiting a Feature
//!
//! ```rust
//! use adrefresh::{ClientRateLimiter, RateLimitConfig};
//!
//! // 30 picks per minute per session
//! let limiter = ClientRateLimiter::new(RateLimitConfig::picker());
//!
//! let decision = limiter.check_limit(Some("session-42"));
//! if decision.allowed {
//!     println!("✅ {} picks left", decision.remaining);
//! } else {
//!     println!("⛔ try again in {:?}ms", decision.retry_after_ms);
//! }
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │    Host page / app      │
//!                    └──────────┬──────────────┘
//!                               │ PageEvent / refresh()
//!                    ┌──────────▼──────────────┐
//!                    │   RefreshOrchestrator   │
//!                    ├─────────────────────────┤
//!                    │ • throttle              │
//!                    │ • in-progress guard     │
//!                    │ • timeout race, retries │
//!                    └──┬─────────┬─────────┬──┘
//!                       │         │         │
//!          ┌────────────▼──┐ ┌────▼─────┐ ┌─▼──────────────┐
//!          │ Provider      │ │ Response │ │ Metrics        │
//!          │ adapters      │ │ cache    │ │ aggregator     │
//!          │ → AdSurface   │ │ purge    │ │ → EventSink    │
//!          └───────────────┘ └──────────┘ └────────────────┘
//!
//!          ┌────────────────────────────────────────────────┐
//!          │ ClientRateLimiter  (independent primitive)     │
//!          │ • token bucket per key  • fail-open            │
//!          │ • snapshot to KeyValueStore                    │
//!          └────────────────────────────────────────────────┘
//! ```
//!
//! ## Time
//!
//! Every component reads time through [`Clock`]. Use [`TokioClock`] with
//! `#[tokio::test(start_paused = true)]` to drive the orchestrator through
//! throttle windows and timeouts without waiting, and [`ManualClock`] for the
//! synchronous limiters.
//!
//! ## Failure Policy
//!
//! Refreshes never return `Err`: failures are values inside a
//! [`RefreshResult`], logged through `tracing` and otherwise silent. The
//! limiter fails open. Only configuration problems surface as
//! [`ConfigError`].
//!
//! ## Examples
//!
//! See the `demos/` directory:
//! - `basic.rs` - Token bucket decisions
//! - `session_limiting.rs` - Per-session limits with persistence and cleanup
//! - `refresh_cycle.rs` - Orchestrated refreshes with retries and metrics

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

mod clock;
mod error;
mod rate_limiter;
mod refresh;

// Public re-exports
pub use clock::{current_time_ms, Clock, ManualClock, SharedClock, SystemClock, TokioClock};
pub use error::{ConfigError, StoreError};
pub use rate_limiter::{
    ClientRateLimiter, FixedWindowLimiter, KeyGenerator, KeyValueStore, LimiterStats,
    MemoryStore, RateLimitConfig, RateLimitDecision, StoredBucket, TokenBucket,
    UnavailableStore, DEFAULT_CLEANUP_INTERVAL_MS, DEFAULT_KEY,
};
pub use refresh::{
    is_ad_related, purge_ad_responses, AdContainer, AdSettings, AdSurface, AnalyticsSettings,
    CacheError, ContainerSelector, EventBatch, EventSink, InMemorySurface, InvokeBehavior,
    MemoryResponseCache, MemorySink, MetricsAggregator, PageEvent, Profile, Provider,
    ProviderInfo, ProviderTimeouts, RefreshConfig, RefreshDelays, RefreshError,
    RefreshErrorKind, RefreshMetrics, RefreshOrchestrator, RefreshRequest, RefreshResult,
    RefreshTrigger, ReinitCall, ResponseCache, SurfaceError, TracingSink, AD_DOMAINS,
    DEFAULT_EZOIC_PLACEMENTS, EZOIC_PLACEMENTS_ENV, MAX_RETRY_ATTEMPTS_LIMIT, NO_PROVIDER,
    PROFILE_ENV, PROVIDER_ENV, SETTLE_DELAY,
};

use std::sync::Arc;

/// An orchestrator wrapped in `Arc`, as required by
/// [`RefreshOrchestrator::setup_auto_refresh`].
pub type SharedOrchestrator = Arc<RefreshOrchestrator>;

/// A client limiter wrapped in `Arc` for sharing across threads or tasks.
pub type SharedClientLimiter = Arc<ClientRateLimiter>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
pub const MSRV: &str = "1.75.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use adrefresh::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for wiring an orchestrator or a limiter.
    //!
    //! # Example
    //! ```rust
    //! use adrefresh::prelude::*;
    //!
    //! let limiter = ClientRateLimiter::new(RateLimitConfig::api());
    //! let request = RefreshRequest::new().with_force(true);
    //! let settings = AdSettings::new(Some(Provider::AdSense));
    //! ```

    pub use crate::{
        AdSettings, AdSurface, ClientRateLimiter, Clock, InMemorySurface, MetricsAggregator,
        OrchestratorBuilder, PageEvent, Provider, RateLimitConfig, RateLimitDecision,
        RefreshConfig, RefreshErrorKind, RefreshOrchestrator, RefreshRequest, RefreshResult,
        SharedClientLimiter, SharedOrchestrator,
    };
}

/// Builder for [`RefreshOrchestrator`].
///
/// Only the [`AdSurface`] is required. Everything else defaults:
///
/// - configuration: the preset for the settings' profile
/// - settings: no provider, production profile
/// - metrics: a fresh aggregator with default batching, on the same clock
/// - clock: [`SystemClock`]
/// - response cache: none (no purge)
///
/// # Example
///
/// ```rust
/// use adrefresh::{InMemorySurface, OrchestratorBuilder, RefreshConfig};
/// use std::sync::Arc;
///
/// let orchestrator = OrchestratorBuilder::new()
///     .config(RefreshConfig::development())
///     .surface(Arc::new(InMemorySurface::new()))
///     .build();
///
/// assert_eq!(orchestrator.config().max_retry_attempts, 2);
///
/// // Or use try_build() for error handling
/// let result = OrchestratorBuilder::new().try_build();
/// assert!(result.is_err());
/// ```
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<RefreshConfig>,
    settings: AdSettings,
    surface: Option<Arc<dyn AdSurface>>,
    cache: Option<Arc<dyn ResponseCache>>,
    metrics: Option<Arc<MetricsAggregator>>,
    clock: Option<SharedClock>,
}

impl OrchestratorBuilder {
    /// Creates a builder with every option unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the orchestrator configuration.
    pub fn config(mut self, config: RefreshConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the ad settings (provider, profile, placements).
    pub fn settings(mut self, settings: AdSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the page collaborator.
    pub fn surface(mut self, surface: Arc<dyn AdSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Enables purging ad responses from this cache.
    pub fn response_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Shares an existing aggregator.
    pub fn metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the orchestrator.
    ///
    /// # Panics
    ///
    /// Panics if no surface was set or the configuration is invalid.
    /// Use `try_build()` if you want to handle errors.
    pub fn build(self) -> RefreshOrchestrator {
        match self.try_build() {
            Ok(orchestrator) => orchestrator,
            Err(err) => panic!("Invalid orchestrator configuration: {err}"),
        }
    }

    /// Attempts to build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface was set or the configuration is invalid.
    pub fn try_build(self) -> Result<RefreshOrchestrator, ConfigError> {
        let surface = self
            .surface
            .ok_or_else(|| ConfigError::invalid("surface", "an ad surface is required"))?;

        let config = self
            .config
            .unwrap_or_else(|| self.settings.refresh_config());
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(MetricsAggregator::default().with_clock(clock.clone())),
        };

        Ok(RefreshOrchestrator::from_parts(
            config,
            self.settings,
            surface,
            self.cache,
            metrics,
            clock,
        ))
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("has_surface", &self.surface.is_some())
            .field("has_cache", &self.cache.is_some())
            .finish()
    }
}

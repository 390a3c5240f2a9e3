//! # Refresh Module
//!
//! ## Module Structure
//!
//! ```text
//!     refresh/
//!     ├── mod.rs            (You are here - Module organization)
//!     ├── config.rs         (Profiles, timeouts, delays, env loading)
//!     ├── error.rs          (Error kinds and retryability)
//!     ├── provider.rs       (Provider enum and adapters)
//!     ├── surface.rs        (Page collaborator seam)
//!     ├── cache.rs          (Ad response purge)
//!     ├── orchestrator.rs   (Throttle, guard, timeout race, retries)
//!     ├── auto.rs           (Page events to refresh requests)
//!     └── metrics.rs        (Outcome aggregation and batching)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     PageEvent ──► auto ──┐
//!                          ▼
//!     manual_refresh ──► Orchestrator ──► Provider adapter ──► AdSurface
//!                          │    │
//!                          │    └──────► ResponseCache (purge)
//!                          ▼
//!                   MetricsAggregator ──► EventSink
//! ```

mod auto;
mod cache;
mod config;
mod error;
mod metrics;
mod orchestrator;
mod provider;
mod surface;

/// Page event wiring
pub use auto::{PageEvent, RefreshTrigger};

/// Response cache seam and purge
pub use cache::{is_ad_related, purge_ad_responses, CacheError, MemoryResponseCache, ResponseCache, AD_DOMAINS};

/// Configuration types
pub use config::{
    AdSettings, AnalyticsSettings, Profile, ProviderTimeouts, RefreshConfig, RefreshDelays,
    DEFAULT_EZOIC_PLACEMENTS, EZOIC_PLACEMENTS_ENV, MAX_RETRY_ATTEMPTS_LIMIT, PROFILE_ENV,
    PROVIDER_ENV,
};

/// Error taxonomy
pub use error::{RefreshError, RefreshErrorKind};

/// Metrics aggregation and export
pub use metrics::{EventBatch, EventSink, MemorySink, MetricsAggregator, RefreshMetrics, TracingSink};

/// The orchestrator and its request/result types
pub use orchestrator::{RefreshOrchestrator, RefreshRequest, RefreshResult};

/// Providers
pub use provider::{Provider, ProviderInfo, NO_PROVIDER, SETTLE_DELAY};

/// Page collaborator seam
pub use surface::{
    AdContainer, AdSurface, ContainerSelector, InMemorySurface, InvokeBehavior, ReinitCall,
    SurfaceError,
};

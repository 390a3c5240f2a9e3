//! # Refresh Orchestrator
//!
//! Coordinates one ad refresh: throttle, mutual exclusion, optional delay,
//! cache purge, timed dispatch to the active provider, and bounded retries.
//!
//! ```text
//!     refresh(request)
//!          │
//!          ├─ too soon since last accepted refresh? ──► Timeout (throttled)
//!          │   (skipped when forced)
//!          │
//!          ├─ another refresh running? ───────────────► Provider (in progress)
//!          │   (skipped when forced)
//!          │
//!          ▼  Idle ──► Refreshing
//!     ┌────────────────────────────────────────────────────────┐
//!     │ sleep(delay)                                           │
//!     │ loop {                                                 │
//!     │     purge ad cache            (best effort)            │
//!     │     provider ← fresh ProviderInfo                      │
//!     │     race adapter vs. budget   ──► record attempt       │
//!     │     success ──────────────────────────────► return     │
//!     │     retryable && retries left ─► sleep(retry_delay)    │
//!     │     otherwise ────────────────────────────► return     │
//!     │ }                                                      │
//!     └────────────────────────────────────────────────────────┘
//!          │
//!          ▼  Refreshing ──► Idle   (drop guard, on every path)
//! ```
//!
//! A timeout only stops waiting: the adapter runs as its own task and may
//! still finish afterwards, unless [`RefreshConfig::abort_on_timeout`] is set.

use super::cache::{purge_ad_responses, ResponseCache};
use super::config::{AdSettings, RefreshConfig};
use super::error::RefreshError;
use super::metrics::MetricsAggregator;
use super::provider::ProviderInfo;
use super::surface::AdSurface;
use crate::clock::SharedClock;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What the caller wants from one refresh.
///
/// ```rust
/// use adrefresh::RefreshRequest;
/// use std::time::Duration;
///
/// let request = RefreshRequest::new()
///     .with_force(true)
///     .with_delay(Duration::from_millis(500));
///
/// assert!(request.is_forced());
/// assert!(request.clear_cache());
/// assert_eq!(request.retry_count(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequest {
    force: bool,
    delay: Duration,
    clear_cache: bool,
    retry_count: u32,
}

impl Default for RefreshRequest {
    fn default() -> Self {
        Self {
            force: false,
            delay: Duration::ZERO,
            clear_cache: true,
            retry_count: 0,
        }
    }
}

impl RefreshRequest {
    /// Non-forced, no delay, purge the cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bypasses the throttle and the in-progress check.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Waits this long after acquiring the guard.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Whether to purge cached ad responses first.
    pub fn with_clear_cache(mut self, clear_cache: bool) -> Self {
        self.clear_cache = clear_cache;
        self
    }

    /// Whether the request is forced.
    #[inline]
    pub fn is_forced(&self) -> bool {
        self.force
    }

    /// Pre-refresh delay.
    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether the cache is purged.
    #[inline]
    pub fn clear_cache(&self) -> bool {
        self.clear_cache
    }

    /// Retries already spent. Always 0 for caller-built requests.
    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}

/// Outcome of one refresh attempt.
///
/// A result holds an error exactly when it is unsuccessful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshResult {
    provider: String,
    duration_ms: u64,
    error: Option<RefreshError>,
    retry_count: u32,
}

impl RefreshResult {
    /// A successful attempt.
    pub fn succeeded(provider: impl Into<String>, duration_ms: u64, retry_count: u32) -> Self {
        Self {
            provider: provider.into(),
            duration_ms,
            error: None,
            retry_count,
        }
    }

    /// A failed attempt.
    pub fn failed(
        provider: impl Into<String>,
        duration_ms: u64,
        error: RefreshError,
        retry_count: u32,
    ) -> Self {
        Self {
            provider: provider.into(),
            duration_ms,
            error: Some(error),
            retry_count,
        }
    }

    /// Whether the attempt succeeded.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Provider name at the time of the attempt (`"none"` if unset).
    #[inline]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Time from the start of the attempt to its outcome.
    #[inline]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// The failure, if any.
    #[inline]
    pub fn error(&self) -> Option<&RefreshError> {
        self.error.as_ref()
    }

    /// Retries spent before this attempt.
    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}

/// Serializes and retries ad refreshes for one page.
///
/// Build one with [`OrchestratorBuilder`](crate::OrchestratorBuilder).
pub struct RefreshOrchestrator {
    config: RefreshConfig,
    settings: RwLock<AdSettings>,
    surface: Arc<dyn AdSurface>,
    cache: Option<Arc<dyn ResponseCache>>,
    metrics: Arc<MetricsAggregator>,
    clock: SharedClock,

    /// `true` while a refresh holds the guard.
    in_progress: AtomicBool,

    /// Start of the last refresh that passed the throttle.
    last_refresh_at: Mutex<Option<u64>>,
}

impl RefreshOrchestrator {
    pub(crate) fn from_parts(
        config: RefreshConfig,
        settings: AdSettings,
        surface: Arc<dyn AdSurface>,
        cache: Option<Arc<dyn ResponseCache>>,
        metrics: Arc<MetricsAggregator>,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            settings: RwLock::new(settings),
            surface,
            cache,
            metrics,
            clock,
            in_progress: AtomicBool::new(false),
            last_refresh_at: Mutex::new(None),
        }
    }

    /// Runs one refresh. Never fails; every outcome is a [`RefreshResult`].
    ///
    /// Each attempt, including rejections and retried failures, is recorded
    /// in the metrics aggregator. The returned result is the last attempt.
    pub async fn refresh(&self, request: RefreshRequest) -> RefreshResult {
        let started = self.clock.now_ms();
        let provider_name = self.provider_info().active_provider_name;

        if !request.force {
            let last = *self.last_refresh_at.lock();
            let throttled = last.is_some_and(|last| {
                started.saturating_sub(last) < self.config.min_refresh_interval_ms()
            });
            if throttled {
                debug!("Ad refresh skipped - too frequent");
                return self.reject(RefreshError::throttled(&provider_name), started, &request);
            }
        }

        let Some(_guard) = RefreshGuard::acquire(&self.in_progress, request.force) else {
            debug!("Ad refresh already in progress");
            return self.reject(RefreshError::in_progress(&provider_name), started, &request);
        };
        *self.last_refresh_at.lock() = Some(started);

        let mut retry_count = request.retry_count;
        let mut attempt_started = started;

        loop {
            // Every attempt, retries included, waits out the request delay
            if !request.delay.is_zero() {
                tokio::time::sleep(request.delay).await;
            }

            if request.clear_cache {
                self.clear_ad_cache().await;
            }

            let info = self.provider_info();
            let outcome = self.dispatch(&info).await;
            let duration_ms = self.clock.now_ms().saturating_sub(attempt_started);

            let error = match outcome {
                Ok(()) => {
                    let result = RefreshResult::succeeded(
                        info.active_provider_name.as_str(),
                        duration_ms,
                        retry_count,
                    );
                    self.record(&result);
                    info!(
                        "Ad refresh completed for provider: {}",
                        info.active_provider_name
                    );
                    return result;
                }
                Err(error) => error,
            };

            let will_retry =
                error.is_retryable() && retry_count < self.config.max_retry_attempts;
            let result = RefreshResult::failed(
                info.active_provider_name.as_str(),
                duration_ms,
                error,
                retry_count,
            );
            self.record(&result);

            if !will_retry {
                if let Some(error) = result.error() {
                    error!("Ad refresh failed after all retries: {}", error);
                }
                return result;
            }

            warn!(
                "Ad refresh failed, retrying... ({}/{})",
                retry_count + 1,
                self.config.max_retry_attempts
            );
            tokio::time::sleep(self.config.retry_delay).await;
            retry_count += 1;
            attempt_started = self.clock.now_ms();
        }
    }

    /// Forced refresh with cache purge and no delay.
    pub async fn manual_refresh(&self) -> RefreshResult {
        self.refresh(super::auto::RefreshTrigger::Manual.request())
            .await
    }

    /// Races the active provider's adapter against its budget.
    async fn dispatch(&self, info: &ProviderInfo) -> Result<(), RefreshError> {
        let Some(provider) = info.active_provider() else {
            return Err(RefreshError::no_active_provider(&info.active_provider_name));
        };

        let budget = self.config.timeouts.for_provider(provider);
        let surface = Arc::clone(&self.surface);
        let settings = self.settings.read().clone();

        let mut task =
            tokio::spawn(async move { provider.refresh(surface.as_ref(), &settings).await });

        match tokio::time::timeout(budget, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(RefreshError::adapter_crashed(provider, join_error)),
            Err(_) => {
                if self.config.abort_on_timeout {
                    task.abort();
                }
                Err(RefreshError::timed_out(provider.name(), budget))
            }
        }
    }

    async fn clear_ad_cache(&self) {
        let Some(cache) = &self.cache else {
            return;
        };

        match purge_ad_responses(cache.as_ref()).await {
            Ok(removed) => info!("Ad cache cleared ({} entries)", removed),
            Err(err) => warn!("Failed to clear ad cache: {}", err),
        }
    }

    fn reject(&self, error: RefreshError, started: u64, request: &RefreshRequest) -> RefreshResult {
        let provider = error.provider().unwrap_or_default().to_string();
        let duration_ms = self.clock.now_ms().saturating_sub(started);
        let result = RefreshResult::failed(provider, duration_ms, error, request.retry_count);
        self.record(&result);
        result
    }

    fn record(&self, result: &RefreshResult) {
        if self.config.enable_analytics {
            self.metrics.record(result);
        }
    }

    /// Provider snapshot built from the current settings.
    pub fn provider_info(&self) -> ProviderInfo {
        self.settings.read().provider_info()
    }

    /// Replaces the ad settings. Takes effect from the next attempt.
    pub fn update_settings(&self, settings: AdSettings) {
        *self.settings.write() = settings;
    }

    /// Whether a refresh currently holds the guard.
    #[inline]
    pub fn is_refreshing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Start time of the last refresh that passed the throttle.
    pub fn last_refresh_at_ms(&self) -> Option<u64> {
        *self.last_refresh_at.lock()
    }

    /// Orchestrator settings.
    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// The aggregator outcomes are reported to.
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }
}

impl fmt::Debug for RefreshOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("config", &self.config)
            .field("settings", &*self.settings.read())
            .field("refreshing", &self.is_refreshing())
            .field("last_refresh_at_ms", &self.last_refresh_at_ms())
            .finish()
    }
}

/// Holds the in-progress flag; clears it when dropped.
struct RefreshGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RefreshGuard<'a> {
    /// Forced acquisition always succeeds, even over a running refresh.
    fn acquire(flag: &'a AtomicBool, force: bool) -> Option<Self> {
        if force {
            if flag.swap(true, Ordering::AcqRel) {
                debug!("Forced ad refresh overlaps a running one");
            }
        } else if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        Some(Self { flag })
    }
}

impl<'a> Drop for RefreshGuard<'a> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::refresh::cache::MemoryResponseCache;
    use crate::refresh::error::RefreshErrorKind;
    use crate::refresh::provider::Provider;
    use crate::refresh::surface::{InMemorySurface, InvokeBehavior};
    use std::sync::atomic::AtomicUsize;

    fn orchestrator(
        provider: Option<Provider>,
        surface: Arc<InMemorySurface>,
        config: RefreshConfig,
    ) -> RefreshOrchestrator {
        RefreshOrchestrator::from_parts(
            config,
            AdSettings::new(provider),
            surface,
            None,
            Arc::new(MetricsAggregator::default()),
            Arc::new(TokioClock::new()),
        )
    }

    fn ready_surface(provider: Provider) -> Arc<InMemorySurface> {
        Arc::new(InMemorySurface::new().with_library(provider))
    }

    #[test]
    fn test_request_defaults() {
        let request = RefreshRequest::default();
        assert!(!request.is_forced());
        assert!(request.delay().is_zero());
        assert!(request.clear_cache());
        assert_eq!(request.retry_count(), 0);
    }

    #[test]
    fn test_result_invariant() {
        let ok = RefreshResult::succeeded("ezoic", 10, 0);
        assert!(ok.is_success() && ok.error().is_none());

        let err = RefreshResult::failed("ezoic", 10, RefreshError::throttled("ezoic"), 1);
        assert!(!err.is_success() && err.error().is_some());
        assert_eq!(err.retry_count(), 1);
    }

    #[test]
    fn test_guard_resets_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = RefreshGuard::acquire(&flag, false).unwrap();
            assert!(flag.load(Ordering::Acquire));
            assert!(RefreshGuard::acquire(&flag, false).is_none());
        }
        assert!(!flag.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_refresh() {
        let surface = ready_surface(Provider::Monetag);
        let orch = orchestrator(Some(Provider::Monetag), surface.clone(), RefreshConfig::production());

        let result = orch.refresh(RefreshRequest::new()).await;

        assert!(result.is_success());
        assert_eq!(result.provider(), "monetag");
        assert_eq!(surface.calls().len(), 1);
        assert!(!orch.is_refreshing());
        assert_eq!(orch.metrics().metrics().successful_refreshes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_counts_toward_duration() {
        let orch = orchestrator(
            Some(Provider::Monetag),
            ready_surface(Provider::Monetag),
            RefreshConfig::production(),
        );

        let result = orch
            .refresh(RefreshRequest::new().with_delay(Duration::from_millis(750)))
            .await;

        assert!(result.is_success());
        assert!((750..760).contains(&result.duration_ms()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_repeats_on_each_retry() {
        let surface = Arc::new(
            InMemorySurface::new()
                .with_library(Provider::Monetag)
                .with_behavior(Provider::Monetag, InvokeBehavior::Fail("down".into())),
        );
        let orch = orchestrator(
            Some(Provider::Monetag),
            surface.clone(),
            RefreshConfig::production().with_max_retry_attempts(1),
        );

        let begin = tokio::time::Instant::now();
        let result = orch
            .refresh(RefreshRequest::new().with_delay(Duration::from_millis(1_000)))
            .await;

        // delay + retry_delay + delay
        assert!(begin.elapsed() >= Duration::from_millis(4_000));
        assert!(!result.is_success());
        assert_eq!(result.retry_count(), 1);
        assert!((1_000..1_010).contains(&result.duration_ms()));
        assert_eq!(surface.calls().len(), 2);

        let metrics = orch.metrics().metrics();
        assert_eq!(metrics.total_refreshes, 2);
        assert_eq!(metrics.failed_refreshes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_provider_is_not_retried() {
        let orch = orchestrator(None, Arc::new(InMemorySurface::new()), RefreshConfig::production());

        let result = orch.refresh(RefreshRequest::new()).await;
        let error = result.error().unwrap();

        assert_eq!(error.kind(), RefreshErrorKind::Provider);
        assert!(!error.is_retryable());
        assert_eq!(result.provider(), "none");
        assert_eq!(result.retry_count(), 0);
        assert_eq!(orch.metrics().metrics().total_refreshes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_then_success() {
        let surface = Arc::new(
            InMemorySurface::new()
                .with_library(Provider::Monetag)
                .with_behavior(Provider::Monetag, InvokeBehavior::Fail("flaky".into())),
        );
        let orch = Arc::new(orchestrator(
            Some(Provider::Monetag),
            surface.clone(),
            RefreshConfig::production(),
        ));

        let task = tokio::spawn({
            let orch = orch.clone();
            async move { orch.refresh(RefreshRequest::new()).await }
        });

        // First attempt fails immediately; heal the vendor during the retry delay.
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        surface.set_behavior(Provider::Monetag, InvokeBehavior::Succeed);

        let result = task.await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.retry_count(), 1);

        let metrics = orch.metrics().metrics();
        assert_eq!(metrics.total_refreshes, 2);
        assert_eq!(metrics.failed_refreshes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_library_stops_immediately() {
        let orch = orchestrator(
            Some(Provider::Ezoic),
            Arc::new(InMemorySurface::new()),
            RefreshConfig::production(),
        );

        let result = orch.refresh(RefreshRequest::new()).await;
        assert_eq!(result.error().unwrap().kind(), RefreshErrorKind::ScriptLoad);
        assert_eq!(result.retry_count(), 0);
        assert_eq!(orch.metrics().metrics().total_refreshes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_purged_and_failures_ignored() {
        let cache = Arc::new(MemoryResponseCache::new());
        cache.insert("ad-cache-v1", "https://ezoic.com/ad.js");

        let orch = RefreshOrchestrator::from_parts(
            RefreshConfig::production(),
            AdSettings::new(Some(Provider::Monetag)),
            ready_surface(Provider::Monetag),
            Some(cache.clone()),
            Arc::new(MetricsAggregator::default()),
            Arc::new(TokioClock::new()),
        );

        assert!(orch.refresh(RefreshRequest::new()).await.is_success());
        assert!(cache.urls("ad-cache-v1").is_empty());

        cache.set_failing(true);
        let result = orch.refresh(RefreshRequest::new().with_force(true)).await;
        assert!(result.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_left_alone_when_not_requested() {
        let cache = Arc::new(MemoryResponseCache::new());
        cache.insert("c", "https://monetag.com/tag.js");

        let orch = RefreshOrchestrator::from_parts(
            RefreshConfig::production(),
            AdSettings::new(Some(Provider::Monetag)),
            ready_surface(Provider::Monetag),
            Some(cache.clone()),
            Arc::new(MetricsAggregator::default()),
            Arc::new(TokioClock::new()),
        );

        orch.refresh(RefreshRequest::new().with_clear_cache(false)).await;
        assert_eq!(cache.urls("c").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_are_read_each_cycle() {
        let surface = Arc::new(
            InMemorySurface::new()
                .with_library(Provider::Monetag)
                .with_library(Provider::Adsterra),
        );
        let orch = orchestrator(Some(Provider::Monetag), surface, RefreshConfig::production());

        assert_eq!(orch.refresh(RefreshRequest::new()).await.provider(), "monetag");

        orch.update_settings(AdSettings::new(Some(Provider::Adsterra)));
        let result = orch.refresh(RefreshRequest::new().with_force(true)).await;
        assert_eq!(result.provider(), "adsterra");
    }

    #[tokio::test(start_paused = true)]
    async fn test_analytics_disabled() {
        let orch = orchestrator(
            Some(Provider::Monetag),
            ready_surface(Provider::Monetag),
            RefreshConfig::production().with_analytics(false),
        );

        orch.refresh(RefreshRequest::new()).await;
        assert_eq!(orch.metrics().metrics().total_refreshes, 0);
    }

    /// Surface whose Monetag call completes only after a long pause, counting
    /// completions.
    struct SlowSurface {
        finished: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AdSurface for SlowSurface {
        fn library_available(&self, _provider: Provider) -> bool {
            true
        }

        async fn clear_containers(
            &self,
            _selector: crate::refresh::surface::ContainerSelector,
        ) -> Result<Vec<String>, crate::refresh::surface::SurfaceError> {
            Ok(Vec::new())
        }

        async fn invoke(
            &self,
            _call: crate::refresh::surface::ReinitCall,
        ) -> Result<(), crate::refresh::surface::SurfaceError> {
            tokio::time::sleep(Duration::from_secs(20)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_adapter_keeps_running_by_default() {
        let surface = Arc::new(SlowSurface {
            finished: AtomicUsize::new(0),
        });
        let orch = RefreshOrchestrator::from_parts(
            RefreshConfig::production().with_max_retry_attempts(0),
            AdSettings::new(Some(Provider::Monetag)),
            surface.clone(),
            None,
            Arc::new(MetricsAggregator::default()),
            Arc::new(TokioClock::new()),
        );

        let result = orch.refresh(RefreshRequest::new()).await;
        assert_eq!(result.error().unwrap().kind(), RefreshErrorKind::Timeout);
        assert!((6_000..6_010).contains(&result.duration_ms()));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(surface.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_on_timeout_cancels_adapter() {
        let surface = Arc::new(SlowSurface {
            finished: AtomicUsize::new(0),
        });
        let orch = RefreshOrchestrator::from_parts(
            RefreshConfig::production()
                .with_max_retry_attempts(0)
                .with_abort_on_timeout(true),
            AdSettings::new(Some(Provider::Monetag)),
            surface.clone(),
            None,
            Arc::new(MetricsAggregator::default()),
            Arc::new(TokioClock::new()),
        );

        orch.refresh(RefreshRequest::new()).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(surface.finished.load(Ordering::SeqCst), 0);
    }
}

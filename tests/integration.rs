use adrefresh::{
    AdSettings, ClientRateLimiter, InMemorySurface, InvokeBehavior, KeyValueStore, ManualClock,
    MemoryResponseCache, MemoryStore, OrchestratorBuilder, PageEvent, Provider, RateLimitConfig,
    RefreshConfig, RefreshErrorKind, RefreshOrchestrator, RefreshRequest, ReinitCall,
    StoredBucket, TokioClock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn monetag_page() -> Arc<InMemorySurface> {
    Arc::new(
        InMemorySurface::new()
            .with_library(Provider::Monetag)
            .with_container("monetag-footer", None, "<iframe>"),
    )
}

fn orchestrator(provider: Provider, surface: Arc<InMemorySurface>) -> RefreshOrchestrator {
    OrchestratorBuilder::new()
        .config(RefreshConfig::production())
        .settings(AdSettings::new(Some(provider)))
        .surface(surface)
        .clock(Arc::new(TokioClock::new()))
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_throttle_and_forced_bypass() {
    let surface = monetag_page();
    let orchestrator = orchestrator(Provider::Monetag, surface.clone());

    assert!(orchestrator.refresh(RefreshRequest::new()).await.is_success());

    tokio::time::advance(Duration::from_millis(1_000)).await;
    let throttled = orchestrator.refresh(RefreshRequest::new()).await;
    assert!(!throttled.is_success());
    let error = throttled.error().unwrap();
    assert_eq!(error.kind(), RefreshErrorKind::Timeout);
    assert_eq!(error.message(), "Ad refresh skipped - too frequent");
    assert!(!error.is_retryable());

    // Forced requests skip the throttle
    let forced = orchestrator
        .refresh(RefreshRequest::new().with_force(true))
        .await;
    assert!(forced.is_success());

    tokio::time::advance(Duration::from_millis(5_000)).await;
    assert!(orchestrator.refresh(RefreshRequest::new()).await.is_success());

    let metrics = orchestrator.metrics().metrics();
    assert_eq!(metrics.total_refreshes, 4);
    assert_eq!(metrics.successful_refreshes, 3);
    assert_eq!(metrics.failed_refreshes, 1);
    assert!((orchestrator.metrics().success_rate() - 0.75).abs() < f64::EPSILON);
    assert_eq!(surface.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_provider_records_once() {
    let orchestrator = OrchestratorBuilder::new()
        .surface(Arc::new(InMemorySurface::new()))
        .clock(Arc::new(TokioClock::new()))
        .build();

    let result = orchestrator.refresh(RefreshRequest::new()).await;

    assert_eq!(result.provider(), "none");
    assert_eq!(result.retry_count(), 0);
    let error = result.error().unwrap();
    assert_eq!(error.kind(), RefreshErrorKind::Provider);
    assert!(!error.is_retryable());
    assert_eq!(orchestrator.metrics().metrics().total_refreshes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_adapter_times_out_and_retries() {
    let surface = Arc::new(
        InMemorySurface::new()
            .with_library(Provider::Ezoic)
            .with_behavior(Provider::Ezoic, InvokeBehavior::Hang),
    );
    let orchestrator = orchestrator(Provider::Ezoic, surface.clone());
    let start = Instant::now();

    let result = orchestrator.refresh(RefreshRequest::new()).await;

    let error = result.error().unwrap();
    assert_eq!(error.kind(), RefreshErrorKind::Timeout);
    assert_eq!(error.message(), "Ad refresh timeout after 10000ms");
    assert_eq!(result.retry_count(), 3);
    assert!((10_000..10_010).contains(&result.duration_ms()));

    // Four attempts of 10s each, separated by three 2s pauses
    assert!(start.elapsed() >= Duration::from_secs(46));
    assert_eq!(surface.calls().len(), 4);

    let metrics = orchestrator.metrics().metrics();
    assert_eq!(metrics.total_refreshes, 4);
    assert_eq!(metrics.failed_refreshes, 4);
    assert_eq!(
        orchestrator.metrics().error_distribution()[&RefreshErrorKind::Timeout],
        4
    );
    assert!(!orchestrator.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_in_progress_rejection() {
    let surface = Arc::new(
        InMemorySurface::new()
            .with_library(Provider::Ezoic)
            .with_behavior(Provider::Ezoic, InvokeBehavior::Hang),
    );
    let orchestrator = Arc::new(orchestrator(Provider::Ezoic, surface.clone()));

    let background = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.refresh(RefreshRequest::new()).await })
    };

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(orchestrator.is_refreshing());

    let rejected = orchestrator.refresh(RefreshRequest::new()).await;
    let error = rejected.error().unwrap();
    assert_eq!(error.kind(), RefreshErrorKind::Provider);
    assert_eq!(rejected.retry_count(), 0);

    // The rejection is the only attempt finished so far
    let metrics = orchestrator.metrics().metrics();
    assert_eq!(metrics.total_refreshes, 1);
    assert_eq!(metrics.failed_refreshes, 1);

    // A forced refresh runs alongside the stuck one
    surface.set_behavior(Provider::Ezoic, InvokeBehavior::Succeed);
    let forced = orchestrator.manual_refresh().await;
    assert!(forced.is_success());

    let first = background.await.unwrap();
    assert!(first.is_success());
    assert_eq!(first.retry_count(), 1);
    assert!(!orchestrator.is_refreshing());

    // rejection, forced success, background timeout, background retry
    let metrics = orchestrator.metrics().metrics();
    assert_eq!(metrics.total_refreshes, 4);
    assert_eq!(metrics.failed_refreshes, 2);
    assert_eq!(metrics.successful_refreshes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_purges_ad_cache() {
    let cache = Arc::new(MemoryResponseCache::new());
    cache.insert("assets", "https://pagead2.googlesyndication.com/pagead/show_ads.js");
    cache.insert("assets", "https://cdn.monetag.com/tag.js");
    cache.insert("assets", "https://example.com/app.js");

    let surface = monetag_page();
    let orchestrator = OrchestratorBuilder::new()
        .settings(AdSettings::new(Some(Provider::Monetag)))
        .surface(surface.clone())
        .response_cache(cache.clone())
        .clock(Arc::new(TokioClock::new()))
        .build();

    let result = orchestrator.manual_refresh().await;

    assert!(result.is_success());
    assert_eq!(cache.urls("assets"), vec!["https://example.com/app.js"]);
    assert_eq!(surface.content("monetag-footer").as_deref(), Some(""));
    assert_eq!(surface.calls(), vec![ReinitCall::MonetagInit]);
}

#[tokio::test(start_paused = true)]
async fn test_auto_refresh_from_page_events() {
    let surface = monetag_page();
    let orchestrator = Arc::new(orchestrator(Provider::Monetag, surface.clone()));
    let (tx, rx) = mpsc::channel(8);
    let handle = orchestrator.clone().setup_auto_refresh(rx);

    tx.send(PageEvent::Focus).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(surface.calls().is_empty(), "focus waits 500ms");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(surface.calls().len(), 1);

    // Hidden pages and fresh page loads do nothing
    tx.send(PageEvent::VisibilityChange { visible: false })
        .await
        .unwrap();
    tx.send(PageEvent::PageShow { persisted: false })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(surface.calls().len(), 1);

    // Restored from cache: forced despite the throttle
    tx.send(PageEvent::PageShow { persisted: true })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(surface.calls().len(), 2);

    drop(tx);
    handle.await.unwrap();
    assert_eq!(orchestrator.metrics().metrics().successful_refreshes, 2);
}

#[test]
fn test_limiter_window_scenario() {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let store = Arc::new(MemoryStore::new());
    let limiter = ClientRateLimiter::new(RateLimitConfig::new(10, 60_000))
        .with_clock(clock.clone())
        .with_store(store.clone());

    for expected_remaining in (0..10).rev() {
        let decision = limiter.check_limit(Some("session"));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, expected_remaining);
    }

    let denied = limiter.check_limit(Some("session"));
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.retry_after_ms, Some(6_000));
    assert_eq!(denied.reset_at_ms, 1_060_000);
    let snapshot: StoredBucket =
        serde_json::from_str(&store.get("rate_limit_session").unwrap().unwrap()).unwrap();
    assert_eq!(snapshot.tokens, 0);
    assert_eq!(snapshot.reset_time, 1_060_000);

    clock.advance_ms(6_500);
    assert!(limiter.check_limit(Some("session")).allowed);
    assert!(!limiter.check_limit(Some("session")).allowed);

    // A full window refills to capacity, never beyond
    clock.advance_ms(600_000);
    assert_eq!(limiter.available("session"), 10);

    let stats = limiter.stats();
    assert_eq!(stats.total_allowed, 11);
    assert_eq!(stats.total_denied, 2);
}

#[test]
fn test_limiter_keys_are_independent() {
    let limiter = ClientRateLimiter::new(RateLimitConfig::new(2, 60_000))
        .with_clock(Arc::new(ManualClock::new(0)));

    assert!(limiter.check_limit(Some("a")).allowed);
    assert!(limiter.check_limit(Some("a")).allowed);
    assert!(!limiter.check_limit(Some("a")).allowed);
    assert!(limiter.check_limit(Some("b")).allowed);
    assert_eq!(limiter.active_keys(), 2);

    limiter.reset(Some("a"));
    assert!(limiter.check_limit(Some("a")).allowed);
}

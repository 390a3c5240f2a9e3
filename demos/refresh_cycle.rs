//! Orchestrated ad refreshes: throttling, forced refreshes, timeouts with
//! retries, page events and metrics.
//!
//! Run with `RUST_LOG=adrefresh=debug` to see every decision.

use adrefresh::prelude::*;
use adrefresh::{
    AnalyticsSettings, InvokeBehavior, MemoryResponseCache, Profile, ProviderTimeouts, TracingSink,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Ad Refresh Cycle Example ===\n");

    // Environment first, falling back to AdSense on a development profile
    let settings = match AdSettings::from_env() {
        Ok(settings) if settings.provider.is_some() => settings,
        Ok(_) => AdSettings::new(Some(Provider::AdSense)).with_profile(Profile::Development),
        Err(err) => {
            eprintln!("Ignoring bad environment: {}", err);
            AdSettings::new(Some(Provider::AdSense)).with_profile(Profile::Development)
        }
    };
    let provider = settings.provider.unwrap_or(Provider::AdSense);

    let surface = Arc::new(
        InMemorySurface::new()
            .with_library(provider)
            .with_container("slot-top", Some("adsbygoogle"), "<ins>")
            .with_container("monetag-footer", None, "<iframe>")
            .with_container("adsterra-side", None, "<div>")
            .with_container("ezoic-pub-ad-placeholder-101", None, "<div>"),
    );

    let cache = Arc::new(MemoryResponseCache::new());
    cache.insert("runtime", "https://pagead2.googlesyndication.com/pagead/show_ads.js");
    cache.insert("runtime", "https://example.com/app.js");

    let metrics = Arc::new(
        MetricsAggregator::new(AnalyticsSettings {
            batch_size: 5,
            ..AnalyticsSettings::default()
        })
        .with_sink(Arc::new(TracingSink)),
    );
    metrics.start_periodic_flush();

    // Short budgets so the timeout path finishes quickly
    let config = RefreshConfig::development()
        .with_retry_delay(Duration::from_millis(200))
        .with_timeouts(ProviderTimeouts {
            ezoic: Duration::from_millis(500),
            adsense: Duration::from_millis(500),
            monetag: Duration::from_millis(500),
            adsterra: Duration::from_millis(500),
        });

    let orchestrator: SharedOrchestrator = Arc::new(
        OrchestratorBuilder::new()
            .config(config)
            .settings(settings)
            .surface(surface.clone())
            .response_cache(cache.clone())
            .metrics(metrics.clone())
            .build(),
    );

    println!("1. First refresh:");
    report(&orchestrator.refresh(RefreshRequest::new()).await);
    println!("   Remaining cached URLs: {:?}", cache.urls("runtime"));

    println!("\n2. Immediate second refresh:");
    report(&orchestrator.refresh(RefreshRequest::new()).await);

    println!("\n3. Manual refresh:");
    report(&orchestrator.manual_refresh().await);

    println!("\n4. Vendor script hangs:");
    surface.set_behavior(provider, InvokeBehavior::Hang);
    report(
        &orchestrator
            .refresh(RefreshRequest::new().with_force(true))
            .await,
    );
    surface.set_behavior(provider, InvokeBehavior::Succeed);

    println!("\n5. Page events:");
    let (tx, rx) = mpsc::channel(8);
    let events = orchestrator.clone().setup_auto_refresh(rx);
    for event in [
        PageEvent::VisibilityChange { visible: false },
        PageEvent::PageShow { persisted: true },
        PageEvent::Focus,
    ] {
        println!("   -> {:?}", event);
        let _ = tx.send(event).await;
    }
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    drop(tx);
    let _ = events.await;

    println!("\n{}", metrics.metrics());
    println!("{}", metrics.performance_summary());
    for (kind, count) in metrics.error_distribution() {
        if count > 0 {
            println!("   {}: {}", kind, count);
        }
    }
    println!("Flushed {} pending events on shutdown", metrics.shutdown());
}

fn report(result: &RefreshResult) {
    match result.error() {
        None => println!(
            "   ✅ {} refreshed in {}ms",
            result.provider(),
            result.duration_ms()
        ),
        Some(error) => println!(
            "   ❌ {} after {} retries ({}ms)",
            error,
            result.retry_count(),
            result.duration_ms()
        ),
    }
}

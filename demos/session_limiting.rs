//! Per-session limiting with snapshot persistence and a fixed-window limiter
//! cleaned up in the background.

use adrefresh::{
    ClientRateLimiter, FixedWindowLimiter, KeyValueStore, MemoryStore, RateLimitConfig,
    StoredBucket, UnavailableStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Session Limiting Example ===\n");

    sessions_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    persistence_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    fixed_window_example();
}

fn sessions_example() {
    println!("1. Generated Session Keys:");

    // Every call without a key is attributed to the "current" session
    let counter = Arc::new(AtomicUsize::new(0));
    let generator = counter.clone();
    let limiter = ClientRateLimiter::new(RateLimitConfig::new(3, 60_000))
        .with_key_generator(move || format!("session-{}", generator.load(Ordering::Relaxed)));

    for session in 0..2 {
        counter.store(session, Ordering::Relaxed);
        for i in 1..=4 {
            let decision = limiter.check_limit(None);
            println!(
                "   session-{} request {} - {}",
                session,
                i,
                if decision.allowed { "✅" } else { "❌" }
            );
        }
    }

    println!("   Active sessions: {}", limiter.active_keys());
}

fn persistence_example() {
    println!("2. Snapshot Persistence:");

    let store = Arc::new(MemoryStore::new());
    let limiter = ClientRateLimiter::new(RateLimitConfig::picker()).with_store(store.clone());

    for _ in 0..5 {
        limiter.check_limit(Some("picker"));
    }

    if let Ok(Some(raw)) = store.get("rate_limit_picker") {
        println!("   Stored: {}", raw);
        if let Ok(snapshot) = serde_json::from_str::<StoredBucket>(&raw) {
            println!("   Tokens left according to the store: {}", snapshot.tokens);
        }
    }

    // A broken store never affects decisions
    let offline = ClientRateLimiter::new(RateLimitConfig::picker())
        .with_store(Arc::new(UnavailableStore::default()));
    println!(
        "   With an unavailable store: allowed = {}",
        offline.check_limit(Some("picker")).allowed
    );
}

fn fixed_window_example() {
    println!("3. Fixed Window With Cleanup:");

    let limiter = match FixedWindowLimiter::new(RateLimitConfig::new(2, 200)) {
        Ok(limiter) => Arc::new(limiter.with_cleanup_interval_ms(100)),
        Err(err) => {
            eprintln!("   invalid configuration: {}", err);
            return;
        }
    };

    for i in 0..20 {
        limiter.check_limit(&format!("10.0.0.{}", i));
    }
    println!("   Tracked keys: {}", limiter.active_keys());

    let (handle, stop_tx) = match limiter.clone().start_cleanup_thread() {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("   could not start cleanup: {}", err);
            return;
        }
    };

    thread::sleep(Duration::from_millis(450));
    println!(
        "   After expiry: {} tracked, {} cleaned",
        limiter.active_keys(),
        limiter.total_cleaned()
    );

    let _ = stop_tx.send(());
    let _ = handle.join();
}

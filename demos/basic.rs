//! Basic usage example for the adrefresh rate limiter.

use adrefresh::{ClientRateLimiter, ManualClock, RateLimitConfig, TokenBucket};
use std::sync::Arc;

fn main() {
    println!("=== Basic Rate Limiter Example ===\n");

    // Example 1: Simple keyed limiter
    simple_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 2: Presets
    presets_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 3: Refill over simulated time
    refill_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 4: The raw bucket
    bucket_example();
}

fn simple_example() {
    println!("1. Simple Rate Limiter:");

    // 10 requests per minute
    let limiter = ClientRateLimiter::new(RateLimitConfig::api());

    println!("   Created limiter with 10 requests per 60 seconds");

    let mut successful = 0;
    let mut failed = 0;

    for i in 1..=12 {
        let decision = limiter.check_limit(Some("user-1"));
        if decision.allowed {
            successful += 1;
            println!("   Request {} - ✅ Allowed ({} left)", i, decision.remaining);
        } else {
            failed += 1;
            println!(
                "   Request {} - ❌ Rate limited (retry in {}ms)",
                i,
                decision.retry_after_ms.unwrap_or_default()
            );
        }
    }

    println!(
        "   Results: {} successful, {} rate limited",
        successful, failed
    );
}

fn presets_example() {
    println!("2. Presets:");

    for (name, config) in [
        ("api", RateLimitConfig::api()),
        ("picker", RateLimitConfig::picker()),
        ("per_second(5)", RateLimitConfig::per_second(5)),
    ] {
        println!(
            "   - {:<14} {} requests / {}s ({:.3} tokens/s)",
            name,
            config.max_requests,
            config.window_secs(),
            config.refill_rate_per_sec()
        );
    }
}

fn refill_example() {
    println!("3. Refill Demonstration:");

    let clock = Arc::new(ManualClock::new(0));
    let limiter = ClientRateLimiter::new(RateLimitConfig::new(4, 4_000)).with_clock(clock.clone());

    for _ in 0..4 {
        limiter.check_limit(Some("k"));
    }
    println!("   Drained: {} tokens available", limiter.available("k"));

    for step in 1..=4 {
        clock.advance_ms(1_000);
        println!(
            "   After {}s: {} tokens available",
            step,
            limiter.available("k")
        );
    }

    println!("\n{}", limiter.stats());
}

fn bucket_example() {
    println!("4. Token Bucket:");

    let mut bucket = TokenBucket::new(3, 0.5, 0);
    while bucket.try_consume(0) {}

    println!("   Empty bucket, next token in {}ms", bucket.time_until_token_ms());
    println!("   Tokens after 3s: {:.1}", bucket.tokens(3_000));
}

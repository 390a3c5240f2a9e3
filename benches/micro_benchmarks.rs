//! # Micro Benchmarks
//!
//! Fine-grained benchmarks for the bucket arithmetic, metrics recording
//! and configuration helpers.
//!
//! Run with: `cargo bench --bench micro_benchmarks`

use adrefresh::{
    is_ad_related, AdSettings, AnalyticsSettings, InMemorySurface, MemorySink,
    MetricsAggregator, OrchestratorBuilder, Provider, RateLimitConfig, RefreshConfig,
    RefreshError, RefreshResult, TokenBucket, AD_DOMAINS,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

/// Benchmark the raw token bucket
fn bench_token_bucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_bucket");

    group.bench_function("try_consume", |b| {
        let mut bucket = TokenBucket::new(u32::MAX, 1_000.0, 0);
        b.iter(|| black_box(bucket.try_consume(0)));
    });

    for elapsed in [1u64, 1_000, 60_000] {
        group.bench_with_input(
            BenchmarkId::new("refill", elapsed),
            &elapsed,
            |b, &elapsed| {
                let mut bucket = TokenBucket::new(100, 10.0, 0);
                let mut now = 0u64;
                b.iter(|| {
                    now += elapsed;
                    bucket.refill(black_box(now));
                });
            },
        );
    }

    group.bench_function("time_until_token", |b| {
        let mut bucket = TokenBucket::new(10, 1.0, 0);
        for _ in 0..10 {
            bucket.try_consume(0);
        }
        b.iter(|| black_box(bucket.time_until_token_ms()));
    });

    group.finish();
}

/// Benchmark metrics recording with batching
fn bench_metrics_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics_record");

    let success = RefreshResult::succeeded("adsense", 420, 0);
    let failure = RefreshResult::failed(
        "adsense",
        8_000,
        RefreshError::timed_out("adsense", Duration::from_millis(8_000)),
        1,
    );

    for batch_size in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("mixed", batch_size),
            &batch_size,
            |b, &batch_size| {
                let settings = AnalyticsSettings {
                    batch_size,
                    ..AnalyticsSettings::default()
                };
                let aggregator =
                    MetricsAggregator::new(settings).with_sink(Arc::new(MemorySink::new()));
                let mut flip = false;
                b.iter(|| {
                    flip = !flip;
                    aggregator.record(if flip { &success } else { &failure });
                });
            },
        );
    }

    group.bench_function("performance_summary", |b| {
        let aggregator = MetricsAggregator::default().with_sink(Arc::new(MemorySink::new()));
        for _ in 0..100 {
            aggregator.record(&success);
        }
        b.iter(|| black_box(aggregator.performance_summary()));
    });

    group.finish();
}

/// Benchmark ad URL classification
fn bench_ad_url_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("ad_url_matching");

    let ad_url = format!("https://cdn.{}/tag.js", AD_DOMAINS[AD_DOMAINS.len() - 1]);
    group.bench_function("ad_url", |b| {
        b.iter(|| black_box(is_ad_related(black_box(&ad_url))));
    });
    group.bench_function("plain_url", |b| {
        b.iter(|| black_box(is_ad_related(black_box("https://example.com/app.js"))));
    });

    group.finish();
}

/// Benchmark configuration parsing and validation
fn bench_config(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");

    group.bench_function("rate_limit_validate", |b| {
        let config = RateLimitConfig::picker();
        b.iter(|| black_box(config.validate()));
    });

    group.bench_function("refresh_validate", |b| {
        let config = RefreshConfig::production();
        b.iter(|| black_box(config.validate()));
    });

    group.bench_function("settings_from_lookup", |b| {
        b.iter(|| {
            black_box(AdSettings::from_lookup(|var| match var {
                "ADREFRESH_PROVIDER" => Some("Ezoic".to_string()),
                "ADREFRESH_EZOIC_PLACEMENTS" => Some("101, 102, 103".to_string()),
                _ => None,
            }))
        });
    });

    group.bench_function("provider_parse", |b| {
        b.iter(|| black_box("AdSense".parse::<Provider>()));
    });

    group.finish();
}

/// Benchmark builder pattern
fn bench_builder_pattern(c: &mut Criterion) {
    let mut group = c.benchmark_group("builder");

    group.bench_function("orchestrator", |b| {
        let surface = Arc::new(InMemorySurface::new());
        b.iter(|| {
            let orchestrator = OrchestratorBuilder::new()
                .settings(AdSettings::new(Some(Provider::Monetag)))
                .surface(surface.clone())
                .build();
            black_box(orchestrator)
        });
    });

    group.finish();
}

criterion_group!(
    micro_benches,
    bench_token_bucket,
    bench_metrics_record,
    bench_ad_url_matching,
    bench_config,
    bench_builder_pattern,
);

criterion_main!(micro_benches);

//! Resilience layer benchmarks
//!
//! Hot paths every outbound call goes through: cache lookups, rate limiter
//! admission, circuit breaker bookkeeping, retry execution and request
//! fingerprinting, plus chunked log ingestion throughput.
//!
//! Run with: `cargo bench --bench resilience_bench -p healer-common`

use std::convert::Infallible;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use healer_common::cache::{fingerprint, Cache, CacheConfig};
use healer_common::resilience::{
    policies, BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, Jitter, MockClock,
    RateLimiter, RateLimiterConfig, ResilienceError, RetryConfig, RetryExecutor,
};
use healer_common::stream::process_in_chunks;
use thiserror::Error;
use tokio::runtime::Builder as RuntimeBuilder;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
struct BenchError(&'static str);

// ============================================================================
// Cache Benchmarks
// ============================================================================

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    for capacity in [100, 1000, 10_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("insert_fifo", capacity), &capacity, |b, &cap| {
            let cache: Cache<u64, String> =
                Cache::new(CacheConfig::bounded(cap, Duration::from_secs(300)));
            let mut counter = 0u64;
            b.iter(|| {
                cache.insert(black_box(counter), format!("diagnosis_{counter}"));
                counter = counter.wrapping_add(1);
            });
        });

        group.bench_with_input(BenchmarkId::new("get_hit", capacity), &capacity, |b, &cap| {
            let cache: Cache<u64, String> =
                Cache::new(CacheConfig::bounded(cap, Duration::from_secs(300)));
            for i in 0..cap as u64 {
                cache.insert(i, format!("diagnosis_{i}"));
            }
            let mut counter = 0u64;
            b.iter(|| {
                black_box(cache.get(&(counter % cap as u64)));
                counter = counter.wrapping_add(1);
            });
        });
    }

    group.bench_function("get_expired", |b| {
        let clock = MockClock::new();
        let cache: Cache<u64, u64, MockClock> =
            Cache::with_clock(CacheConfig::bounded(1024, Duration::from_secs(1)), clock.clone());
        b.iter(|| {
            cache.insert(1, 1);
            clock.advance(Duration::from_secs(2));
            black_box(cache.get(&1));
        });
    });

    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let log = "x".repeat(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &log, |b, log| {
            b.iter(|| black_box(fingerprint(["anthropic", "diagnose", log.as_str()])));
        });
    }

    group.finish();
}

// ============================================================================
// Rate Limiter and Circuit Breaker Benchmarks
// ============================================================================

fn bench_rate_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");

    group.bench_function("allow_with_tokens", |b| {
        let config = RateLimiterConfig::builder()
            .capacity(u64::MAX)
            .window(Duration::from_secs(60))
            .build()
            .expect("valid limiter config for benchmarks");
        let limiter = RateLimiter::new(config).expect("limiter should build");
        b.iter(|| black_box(limiter.allow()));
    });

    group.bench_function("allow_exhausted", |b| {
        let config = RateLimiterConfig::builder()
            .capacity(1)
            .window(Duration::from_secs(3600))
            .build()
            .expect("valid limiter config for benchmarks");
        let limiter = RateLimiter::new(config).expect("limiter should build");
        let _ = limiter.allow();
        b.iter(|| black_box(limiter.allow()));
    });

    group.finish();
}

fn bench_circuit_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("call_success", |b| {
        let breaker =
            CircuitBreaker::new(CircuitBreakerConfig::default()).expect("breaker should build");
        b.iter(|| {
            let result: Result<_, ResilienceError<BenchError>> =
                breaker.call(|| Ok::<_, BenchError>(()));
            black_box(result.is_ok())
        });
    });

    group.bench_function("open_short_circuit", |b| {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .reset_timeout(Duration::from_secs(3600))
            .build()
            .expect("valid breaker config for benchmarks");
        let breaker = CircuitBreaker::new(config).expect("breaker should build");
        let _ = breaker.call(|| Err::<(), _>(BenchError("trip")));

        b.iter(|| black_box(breaker.call(|| Ok::<_, BenchError>(())).is_err()));
    });

    group.bench_function("open_half_open_recover", |b| {
        b.iter(|| {
            let clock = MockClock::new();
            let config = CircuitBreakerConfig::builder()
                .failure_threshold(3)
                .reset_timeout(Duration::from_millis(10))
                .build()
                .expect("valid breaker config for benchmarks");
            let breaker =
                CircuitBreaker::with_clock(config, clock.clone()).expect("breaker should build");

            for _ in 0..3 {
                let _ = breaker.call(|| Err::<(), _>(BenchError("state transition")));
            }
            clock.advance(Duration::from_millis(10));
            let _ = breaker.call(|| Ok::<_, BenchError>(()));
            black_box(breaker.state())
        });
    });

    group.finish();
}

// ============================================================================
// Retry Benchmarks
// ============================================================================

fn bench_retry(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry");
    let runtime = RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks");
    let token = CancellationToken::new();
    let token = &token;

    group.bench_function("immediate_success", |b| {
        b.to_async(&runtime).iter(move || async move {
            let executor = RetryExecutor::with_config(RetryConfig::default());
            black_box(executor.execute(token, || async { Ok::<_, BenchError>(()) }).await.is_ok())
        });
    });

    group.bench_function("transient_failures_then_success", |b| {
        b.to_async(&runtime).iter(move || async move {
            let config = RetryConfig::builder()
                .max_attempts(5)
                .fixed_backoff(Duration::ZERO)
                .jitter(Jitter::None)
                .build()
                .expect("valid retry config for benchmarks");
            let executor = RetryExecutor::new(config, policies::AlwaysRetry);

            let mut remaining_failures = 3u32;
            let result = executor
                .execute(token, move || {
                    let fail_now = remaining_failures > 0;
                    remaining_failures = remaining_failures.saturating_sub(1);
                    async move {
                        if fail_now {
                            Err(BenchError("transient failure"))
                        } else {
                            Ok(())
                        }
                    }
                })
                .await;
            black_box(result.is_ok())
        });
    });

    group.finish();
}

fn bench_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff");
    let exponential =
        BackoffStrategy::Exponential { initial_delay: Duration::from_millis(100), base: 2.0 };

    group.bench_function("exponential_delay", |b| {
        b.iter(|| {
            for retry in 0..10 {
                black_box(exponential.calculate_delay(black_box(retry)));
            }
        });
    });

    for jitter in [Jitter::Full, Jitter::Equal] {
        group.bench_function(format!("{jitter:?}_jitter"), |b| {
            b.iter(|| black_box(jitter.apply(black_box(Duration::from_secs(1)))));
        });
    }

    group.finish();
}

// ============================================================================
// Stream Benchmarks
// ============================================================================

fn bench_chunked_ingestion(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_ingestion");
    let log = vec![b'a'; 4 * 1024 * 1024];
    group.throughput(Throughput::Bytes(log.len() as u64));

    for chunk_size in [4096usize, 64 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &chunk_size, |b, &size| {
            b.iter(|| {
                let mut newlines = 0usize;
                let total = process_in_chunks(log.as_slice(), size, |chunk| {
                    newlines += chunk.iter().filter(|b| **b == b'\n').count();
                    Ok::<_, Infallible>(())
                });
                black_box((total.is_ok(), newlines))
            });
        });
    }

    group.finish();
}

criterion_group!(
    resilience,
    bench_cache,
    bench_fingerprint,
    bench_rate_limiter,
    bench_circuit_breaker,
    bench_retry,
    bench_backoff,
    bench_chunked_ingestion
);
criterion_main!(resilience);

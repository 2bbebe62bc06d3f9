use apphub_core::workflow::{RetryPolicySpec, RetryStrategy};
use apphub_orchestrator::retry::compute_delay;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn policy(strategy: RetryStrategy) -> RetryPolicySpec {
    RetryPolicySpec {
        max_attempts: 10,
        strategy,
        initial_delay_ms: 100,
        max_delay_ms: 30_000,
        jitter_ratio: 0.2,
        non_retryable_errors: Vec::new(),
    }
}

fn bench_compute_delay(c: &mut Criterion) {
    let fixed = policy(RetryStrategy::Fixed);
    let exponential = policy(RetryStrategy::Exponential);
    let jittered = policy(RetryStrategy::Jittered);

    c.bench_function("compute_delay/fixed", |b| {
        b.iter(|| compute_delay(black_box(5), black_box(&fixed)))
    });
    c.bench_function("compute_delay/exponential", |b| {
        b.iter(|| compute_delay(black_box(5), black_box(&exponential)))
    });
    c.bench_function("compute_delay/jittered", |b| {
        b.iter(|| compute_delay(black_box(5), black_box(&jittered)))
    });
}

criterion_group!(benches, bench_compute_delay);
criterion_main!(benches);

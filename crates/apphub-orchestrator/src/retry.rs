use std::time::Duration;

use apphub_core::workflow::{RetryPolicySpec, RetryStrategy};
use rand::Rng;

/// Computes the delay before the next attempt, given the attempt number that
/// just failed (1-based) — spec §4.E "Retry policy": `next delay =
/// strategy(attempt, initialDelayMs, maxDelayMs, jitterRatio)`.
///
/// Grounded on the teacher's `RetryPolicy::delay_for_attempt`, generalized
/// from a single hardcoded exponential curve into a dispatch over the three
/// strategies the spec names.
pub fn compute_delay(attempt: u32, policy: &RetryPolicySpec) -> Duration {
    let base_ms = match policy.strategy {
        RetryStrategy::Fixed => policy.initial_delay_ms as f64,
        RetryStrategy::Exponential | RetryStrategy::Jittered => {
            policy.initial_delay_ms as f64 * 2f64.powi(attempt.saturating_sub(1) as i32)
        }
    };
    let capped_ms = base_ms.min(policy.max_delay_ms as f64);

    let final_ms = if matches!(policy.strategy, RetryStrategy::Jittered) && policy.jitter_ratio > 0.0
    {
        let jitter_range = capped_ms * policy.jitter_ratio;
        let mut rng = rand::thread_rng();
        let offset = rng.gen_range(-jitter_range..=jitter_range);
        (capped_ms + offset).max(0.0)
    } else {
        capped_ms
    };

    Duration::from_secs_f64(final_ms / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: RetryStrategy) -> RetryPolicySpec {
        RetryPolicySpec {
            max_attempts: 5,
            strategy,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            jitter_ratio: 0.0,
            non_retryable_errors: Vec::new(),
        }
    }

    #[test]
    fn fixed_strategy_is_constant() {
        let policy = policy(RetryStrategy::Fixed);
        assert_eq!(compute_delay(1, &policy), Duration::from_millis(100));
        assert_eq!(compute_delay(2, &policy), Duration::from_millis(100));
        assert_eq!(compute_delay(3, &policy), Duration::from_millis(100));
    }

    #[test]
    fn exponential_strategy_doubles() {
        let policy = policy(RetryStrategy::Exponential);
        assert_eq!(compute_delay(1, &policy), Duration::from_millis(100));
        assert_eq!(compute_delay(2, &policy), Duration::from_millis(200));
        assert_eq!(compute_delay(3, &policy), Duration::from_millis(400));
    }

    #[test]
    fn exponential_strategy_caps_at_max_delay() {
        let mut policy = policy(RetryStrategy::Exponential);
        policy.max_delay_ms = 300;
        assert_eq!(compute_delay(4, &policy), Duration::from_millis(300));
    }

    #[test]
    fn jittered_strategy_stays_within_range() {
        let mut policy = policy(RetryStrategy::Jittered);
        policy.jitter_ratio = 0.5;
        for attempt in 1..=4 {
            let delay = compute_delay(attempt, &policy);
            let base = 100.0 * 2f64.powi(attempt as i32 - 1);
            let capped = base.min(policy.max_delay_ms as f64);
            let lower = (capped * 0.5).max(0.0) / 1000.0;
            let upper = (capped * 1.5) / 1000.0;
            let secs = delay.as_secs_f64();
            assert!(secs >= lower - 1e-9 && secs <= upper + 1e-9);
        }
    }
}

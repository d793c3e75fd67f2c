//! Jittered exponential backoff for fetch retries.
//!
//! Stateless: a wait is a function of the attempt index and the owning
//! strategy's base. No cap beyond `max_retries` bounding the attempt
//! count; the deterministic floor `2^attempt * base` strictly increases,
//! the jitter adds up to one base on top.

use std::time::Duration;

use rand::Rng;

/// Whether another attempt is allowed after `attempt` (0-based) failed.
pub fn should_retry(attempt: u32, max_retries: u32) -> bool {
    attempt < max_retries
}

/// Deterministic floor of the wait before retrying attempt `attempt + 1`.
pub fn delay_floor(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(1u32 << attempt.min(31))
}

/// Full jittered wait: `2^attempt * base + uniform(0, base)`.
pub fn delay(attempt: u32, base: Duration, rng: &mut impl Rng) -> Duration {
    let jitter_ms = if base.as_millis() == 0 {
        0
    } else {
        rng.gen_range(0..base.as_millis() as u64)
    };
    delay_floor(attempt, base) + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn retry_eligibility_is_bounded_by_budget() {
        assert!(should_retry(0, 5));
        assert!(should_retry(4, 5));
        assert!(!should_retry(5, 5));
        assert!(!should_retry(0, 0));
    }

    #[test]
    fn floor_doubles_each_attempt() {
        let base = Duration::from_millis(2000);
        assert_eq!(delay_floor(0, base), Duration::from_millis(2000));
        assert_eq!(delay_floor(1, base), Duration::from_millis(4000));
        assert_eq!(delay_floor(2, base), Duration::from_millis(8000));
        for a in 0..10 {
            assert!(delay_floor(a + 1, base) > delay_floor(a, base));
        }
    }

    #[test]
    fn jitter_stays_under_one_base() {
        let base = Duration::from_millis(1000);
        let mut rng = StdRng::seed_from_u64(9);
        for attempt in 0..4 {
            let d = delay(attempt, base, &mut rng);
            assert!(d >= delay_floor(attempt, base));
            assert!(d < delay_floor(attempt, base) + base);
        }
    }

    #[test]
    fn zero_base_yields_zero_wait() {
        let mut rng = StdRng::seed_from_u64(10);
        assert_eq!(delay(3, Duration::ZERO, &mut rng), Duration::ZERO);
    }
}

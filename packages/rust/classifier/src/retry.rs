//! Exponential back-off for rate-limited requests.

use std::time::Duration;

use riskclause_shared::RetryPolicy;

/// Doubling delay sequence starting at the base delay, capped at the ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    ceiling: Duration,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            next: policy.base_delay.min(policy.max_delay),
            ceiling: policy.max_delay,
        }
    }

    /// The delay to wait now; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = delay
            .checked_mul(2)
            .map_or(self.ceiling, |d| d.min(self.ceiling));
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            max_attempts: None,
        }
    }

    #[test]
    fn doubles_until_ceiling() {
        let mut backoff = Backoff::new(&policy(20_000, 100_000));
        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![20_000, 40_000, 80_000, 100_000, 100_000, 100_000]);
    }

    #[test]
    fn base_above_ceiling_is_clamped() {
        let mut backoff = Backoff::new(&policy(500, 100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn huge_delays_do_not_overflow() {
        let mut backoff = Backoff::new(&RetryPolicy {
            base_delay: Duration::MAX,
            max_delay: Duration::MAX,
            max_attempts: None,
        });
        assert_eq!(backoff.next_delay(), Duration::MAX);
        assert_eq!(backoff.next_delay(), Duration::MAX);
    }
}

use std::time::Duration;

use rand::Rng;

/// Retry knobs for transient backend failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Base delay for the exponential schedule
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub cap_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            cap_delay: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff with full jitter, modeled as an explicit state
/// machine: each `next_delay` advances the attempt counter and yields
/// `random(0, min(cap, base * 2^attempt))`, or `None` once attempts are
/// exhausted.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Attempts consumed so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next retry, or `None` when the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        // attempt 0 is the initial call; max_attempts-1 retries remain
        if self.attempt + 1 >= self.config.max_attempts {
            return None;
        }
        let exp = self
            .config
            .base_delay
            .saturating_mul(2u32.saturating_pow(self.attempt));
        let ceiling = exp.min(self.config.cap_delay);
        self.attempt += 1;

        let jittered = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Some(Duration::from_millis(jittered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_bounded_by_schedule() {
        let config = RetryConfig {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            cap_delay: Duration::from_millis(1_500),
        };
        let mut backoff = Backoff::new(config);

        // Ceilings: 100, 200, 400, 800, then capped at 1500
        let ceilings = [100u64, 200, 400, 800, 1_500];
        for (i, &ceiling) in ceilings.iter().enumerate() {
            let delay = backoff.next_delay().unwrap_or_else(|| {
                panic!("attempt {} should still have budget", i)
            });
            assert!(
                delay <= Duration::from_millis(ceiling),
                "attempt {}: {:?} exceeds ceiling {}ms",
                i,
                delay,
                ceiling
            );
        }
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let mut backoff = Backoff::new(RetryConfig {
            max_attempts: 1,
            ..Default::default()
        });
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_attempt_counter_advances() {
        let mut backoff = Backoff::new(RetryConfig::default());
        assert_eq!(backoff.attempt(), 0);
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 1);
    }
}

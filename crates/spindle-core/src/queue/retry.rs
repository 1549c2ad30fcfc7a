//! Retry policy: decides when a failed batch is sent again.

use std::time::Duration;

use super::config::QueueConfig;

/// Retry policy for failed batches.
///
/// Fixed delay, no backoff: the indexer is local and either up or down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included.
    pub max_retries: u32,

    /// Wait between two attempts.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }

    /// Delay before the attempt following `attempts` (1-indexed) failures.
    pub fn next_delay(&self, _attempts: u32) -> Duration {
        self.retry_delay
    }

    /// True once `attempts` failed attempts used up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_config() {
        let policy = RetryPolicy::from_config(&QueueConfig::default());
        assert_eq!(policy.max_retries, 100);
        assert_eq!(policy.retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn delay_is_fixed() {
        let policy = RetryPolicy {
            max_retries: 5,
            retry_delay: Duration::from_millis(250),
        };

        assert_eq!(policy.next_delay(1), Duration::from_millis(250));
        assert_eq!(policy.next_delay(4), Duration::from_millis(250));
    }

    #[test]
    fn exhausted_after_max_retries_attempts() {
        let policy = RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::ZERO,
        };

        assert!(!policy.is_exhausted(1));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }
}

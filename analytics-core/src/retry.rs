use std::time;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// The retry policy used by the client to space out attempts at uploading a batch.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<time::Duration>,
    /// How many times a failed upload is retried before giving up.
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
        max_retries: u32,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
            max_retries,
        }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether another attempt is allowed after `attempt` retries have already been made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Calculate the time until the next retry, preferring the server's Retry-After if it is longer.
    pub fn time_until_next_retry(
        &self,
        attempt: u32,
        preferred_retry_interval: Option<time::Duration>,
    ) -> time::Duration {
        let candidate_interval = self
            .initial_interval
            .saturating_mul(self.backoff_coefficient.saturating_pow(attempt));

        match (preferred_retry_interval, self.maximum_interval) {
            (Some(duration), Some(max_interval)) => std::cmp::min(
                std::cmp::max(std::cmp::min(candidate_interval, max_interval), duration),
                max_interval,
            ),
            (Some(duration), None) => std::cmp::max(candidate_interval, duration),
            (None, Some(max_interval)) => std::cmp::min(candidate_interval, max_interval),
            (None, None) => candidate_interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_millis(100),
            maximum_interval: Some(time::Duration::from_secs(10)),
            max_retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_backoff_grows_until_maximum() {
        let policy = RetryPolicy::new(
            2,
            Duration::from_millis(100),
            Some(Duration::from_millis(500)),
            5,
        );

        assert_eq!(policy.time_until_next_retry(0, None), Duration::from_millis(100));
        assert_eq!(policy.time_until_next_retry(1, None), Duration::from_millis(200));
        assert_eq!(policy.time_until_next_retry(2, None), Duration::from_millis(400));
        assert_eq!(policy.time_until_next_retry(3, None), Duration::from_millis(500));
        assert_eq!(policy.time_until_next_retry(40, None), Duration::from_millis(500));
    }

    #[test]
    fn test_retry_after_is_honoured_within_maximum() {
        let policy = RetryPolicy::new(
            2,
            Duration::from_millis(100),
            Some(Duration::from_secs(2)),
            5,
        );

        assert_eq!(
            policy.time_until_next_retry(0, Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );
        assert_eq!(
            policy.time_until_next_retry(0, Some(Duration::from_secs(60))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_should_retry_respects_max_retries() {
        let policy = RetryPolicy::default().with_max_retries(2);

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::default().with_max_retries(0).should_retry(0));
    }
}

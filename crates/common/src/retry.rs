//! Bounded retry policy shared by the saga runtime and the scheduler bridge.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Number of retries after the first attempt.
    pub max_retries: usize,
}

impl RetryPolicy {
    /// Creates a policy with the given retry count and default delays.
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Policy for optimistic-concurrency conflicts on saga saves.
    ///
    /// - Min delay: 10ms
    /// - Max delay: 1s
    /// - Max retries: 5
    pub fn conflict() -> Self {
        Self {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            max_retries: 5,
        }
    }

    /// Policy for republishing fired scheduler jobs.
    ///
    /// - Min delay: 100ms
    /// - Max delay: 5s
    /// - Max retries: 5
    pub fn publish() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_retries: 5,
        }
    }

    /// Total number of attempts including the first one.
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Builds the `backon` backoff for this policy.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::conflict()
    }
}

//! Activity timeouts and retry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default schedule-to-start timeout (5 minutes)
pub const DEFAULT_SCHEDULE_TO_START_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default start-to-close timeout (20 minutes)
pub const DEFAULT_START_TO_CLOSE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Timeouts applied to every activity invocation scheduled by a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// How long an invocation may wait for a free worker.
    pub schedule_to_start_timeout: Duration,

    /// How long an invocation may run once a worker picked it up.
    pub start_to_close_timeout: Duration,

    /// Let in-flight invocations finish when the run is canceled.
    pub wait_for_cancellation: bool,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            schedule_to_start_timeout: DEFAULT_SCHEDULE_TO_START_TIMEOUT,
            start_to_close_timeout: DEFAULT_START_TO_CLOSE_TIMEOUT,
            wait_for_cancellation: true,
        }
    }
}

impl ActivityOptions {
    pub fn with_schedule_to_start_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_start_timeout = timeout;
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }
}

/// Retry policy applied uniformly to one activity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub maximum_attempts: u32,

    /// Delay before the second attempt.
    pub initial_interval: Duration,

    /// Multiplier applied to the delay after every attempt.
    pub backoff_coefficient: f64,

    /// Upper bound for a single delay.
    pub maximum_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: 3,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy that runs an activity exactly once
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Default::default()
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed
    pub fn allows_attempt_after(&self, attempt: u32) -> bool {
        attempt < self.maximum_attempts.max(1)
    }

    /// Delay to wait after `attempt` (1-based) failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.backoff_coefficient.max(1.0).powi(exponent);
        let delay = self.initial_interval.as_secs_f64() * factor;
        let capped = delay.min(self.maximum_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_option_defaults() {
        let options = ActivityOptions::default();
        assert_eq!(options.schedule_to_start_timeout, Duration::from_secs(300));
        assert_eq!(options.start_to_close_timeout, Duration::from_secs(1200));
        assert!(options.wait_for_cancellation);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            maximum_attempts: 10,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(5));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_attempt_after(1));
        assert!(policy.allows_attempt_after(2));
        assert!(!policy.allows_attempt_after(3));
        assert!(!RetryPolicy::no_retry().allows_attempt_after(1));
    }
}

//! Per-node retry policy for transient failures.

use std::time::Duration;

/// Retry policy applied around a node's execution.
///
/// Only errors classified transient by `AgentError::is_transient` are
/// retried; permanent errors propagate immediately.
#[derive(Clone, Copy, Debug, Default)]
pub enum RetryPolicy {
    /// No retries (default).
    #[default]
    None,
    /// Exponential backoff: delay = initial * factor^attempt, capped at max.
    Exponential {
        /// Total attempts including the first.
        max_attempts: u32,
        initial: Duration,
        max: Duration,
        factor: f64,
    },
}

impl RetryPolicy {
    /// Convenience constructor matching the common (attempts, initial, max, factor) shape.
    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration, factor: f64) -> Self {
        RetryPolicy::Exponential {
            max_attempts,
            initial,
            max,
            factor,
        }
    }

    /// Delay before retry number `attempt` (0-based), or `None` when the
    /// attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Exponential {
                max_attempts,
                initial,
                max,
                factor,
            } => {
                // attempt+1 attempts already made; allow while below budget.
                if attempt + 1 >= *max_attempts {
                    return None;
                }
                let delay = initial.as_secs_f64() * factor.powi(attempt as i32);
                Some(Duration::from_secs_f64(delay.min(max.as_secs_f64())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: None never grants a retry.
    #[test]
    fn none_policy_has_no_retries() {
        assert_eq!(RetryPolicy::None.delay_for(0), None);
    }

    /// **Scenario**: exponential policy grows the delay and caps attempts.
    #[test]
    fn exponential_policy_backoff_and_budget() {
        let policy = RetryPolicy::exponential(
            3,
            Duration::from_millis(500),
            Duration::from_secs(5),
            1.5,
        );
        assert_eq!(policy.delay_for(0), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(750)));
        // Three attempts total: no retry after the second failure.
        assert_eq!(policy.delay_for(2), None);
    }

    /// **Scenario**: delays are capped at max.
    #[test]
    fn exponential_policy_caps_delay() {
        let policy =
            RetryPolicy::exponential(10, Duration::from_secs(4), Duration::from_secs(5), 2.0);
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(5)));
    }
}

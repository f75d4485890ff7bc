//! Retry policy and backoff strategies.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::execution::JobExecution;

// ═══════════════════════════════════════════════════════════════════════════════
// Backoff Strategy
// ═══════════════════════════════════════════════════════════════════════════════

/// Strategy for calculating retry delays. Every strategy is deterministic in `attempt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed { delay_secs: u64 },
    /// Linear increase in delay (initial + increment * (attempt - 1))
    Linear {
        initial_delay_secs: u64,
        increment_secs: u64,
    },
    /// Exponential increase in delay (base * 2^(attempt - 1)), capped
    Exponential {
        base_delay_secs: u64,
        max_delay_secs: u64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base_delay_secs: 5,
            max_delay_secs: 3600, // 1 hour max
        }
    }
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (1-based; 0 is treated as 1).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let step = u64::from(attempt.max(1) - 1);
        let secs = match self {
            Self::Fixed { delay_secs } => *delay_secs,
            Self::Linear {
                initial_delay_secs,
                increment_secs,
            } => initial_delay_secs.saturating_add(increment_secs.saturating_mul(step)),
            Self::Exponential {
                base_delay_secs,
                max_delay_secs,
            } => {
                let factor = 1u64.checked_shl(step as u32).unwrap_or(u64::MAX);
                base_delay_secs.saturating_mul(factor).min(*max_delay_secs)
            }
        };

        Duration::from_secs(secs)
    }

    /// Create a fixed backoff strategy.
    pub fn fixed(delay_secs: u64) -> Self {
        Self::Fixed { delay_secs }
    }

    /// Create an exponential backoff strategy.
    pub fn exponential(base_delay_secs: u64, max_delay_secs: u64) -> Self {
        Self::Exponential {
            base_delay_secs,
            max_delay_secs,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Retry Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Decides whether a finished execution gets another attempt, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: BackoffStrategy) -> Self {
        Self { max_retries, backoff }
    }

    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// True iff the execution failed or timed out and has attempts left.
    pub fn should_retry(&self, execution: &JobExecution) -> bool {
        execution.has_failed() && execution.retry_count() < self.max_retries
    }

    /// Get the delay before retry number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_doubles_and_caps() {
        let backoff = BackoffStrategy::exponential(5, 60);
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(20));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_secs(40));
        assert_eq!(backoff.delay_for_attempt(5), Duration::from_secs(60));
        assert_eq!(backoff.delay_for_attempt(200), Duration::from_secs(60));
    }

    #[test]
    fn test_attempt_zero_is_first_attempt() {
        let backoff = BackoffStrategy::default();
        assert_eq!(backoff.delay_for_attempt(0), backoff.delay_for_attempt(1));
    }

    #[test]
    fn test_linear_and_fixed() {
        let linear = BackoffStrategy::Linear {
            initial_delay_secs: 10,
            increment_secs: 5,
        };
        assert_eq!(linear.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(linear.delay_for_attempt(3), Duration::from_secs(20));
        assert_eq!(BackoffStrategy::fixed(7).delay_for_attempt(9), Duration::from_secs(7));
    }

    #[test]
    fn test_backoff_serde_tagged() {
        let json = serde_json::to_value(BackoffStrategy::fixed(3)).unwrap();
        assert_eq!(json["type"], "fixed");
        assert_eq!(json["delay_secs"], 3);
    }
}

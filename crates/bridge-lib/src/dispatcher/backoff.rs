//! Retry policy for incident delivery
//!
//! A pure function of (attempt number, error kind), kept apart from the
//! transport so it can be tested without timers or sockets.

use std::time::Duration;

use crate::error::BridgeError;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the given delay, then try again
    Retry(Duration),
    /// Stop and report the failure
    GiveUp,
}

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failure; doubles per attempt
    pub base_delay: Duration,
    /// Ceiling for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Decide after `attempt` (1-based) failed with `error`
    pub fn decide(&self, attempt: u32, error: &BridgeError) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.delay_for(attempt))
        }
    }

    /// Backoff after the given failed attempt: `base * 2^(attempt - 1)`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout() -> BridgeError {
        BridgeError::Timeout("deadline elapsed".into())
    }

    #[test]
    fn test_transient_errors_retry_until_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.decide(1, &timeout()),
            RetryDecision::Retry(Duration::from_secs(1))
        );
        assert_eq!(
            policy.decide(2, &BridgeError::Network("reset".into())),
            RetryDecision::Retry(Duration::from_secs(2))
        );
        assert_eq!(policy.decide(3, &timeout()), RetryDecision::GiveUp);
    }

    #[test]
    fn test_definitive_errors_never_retry() {
        let policy = RetryPolicy::default();

        let rejected = BridgeError::Rejected {
            status: 400,
            body: "invalid routing key".into(),
        };
        assert_eq!(policy.decide(1, &rejected), RetryDecision::GiveUp);
        assert_eq!(
            policy.decide(1, &BridgeError::Auth("forbidden".into())),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_delay_doubles_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }
}

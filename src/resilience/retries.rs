//! Retry policy for upstream calls.
//!
//! # Responsibilities
//! - Bound the number of attempts per call
//! - Decide after each failed attempt whether another one makes sense
//! - Provide the pause between attempts
//!
//! # Design Decisions
//! - Fixed delay between attempts; nothing is slept after the last one
//! - Every method is retried; connection-level failures happen before the
//!   upstream could have acted on the request, or the request is re-sendable
//! - DNS failures only move on when another destination can be tried

use std::time::Duration;

use crate::error::ProxyError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Pause before the zero-based `attempt`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.delay
        }
    }

    /// What to do after the zero-based `attempt` failed with `err`.
    pub fn decide(&self, attempt: u32, err: &ProxyError, destinations: usize) -> RetryDecision {
        if !err.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if matches!(err, ProxyError::UnknownHost { .. }) && destinations < 2 {
            return RetryDecision::GiveUp;
        }
        if attempt + 1 >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refused() -> ProxyError {
        ProxyError::ConnectionRefused { target: "127.0.0.1:1".into() }
    }

    #[test]
    fn test_attempt_bound() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(0, &refused(), 1), RetryDecision::Retry);
        assert_eq!(policy.decide(3, &refused(), 1), RetryDecision::Retry);
        assert_eq!(policy.decide(4, &refused(), 1), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_only_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::from_millis(10));
        assert_eq!(policy.delay_before(2), Duration::from_millis(10));
    }

    #[test]
    fn test_unknown_host_needs_alternative() {
        let policy = RetryPolicy::default();
        let dns = ProxyError::UnknownHost { host: "nowhere.invalid".into() };
        assert_eq!(policy.decide(0, &dns, 1), RetryDecision::GiveUp);
        assert_eq!(policy.decide(0, &dns, 2), RetryDecision::Retry);
    }

    #[test]
    fn test_fatal_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(0, &ProxyError::NoDestinations, 3), RetryDecision::GiveUp);
        assert_eq!(policy.decide(0, &ProxyError::Terminated, 3), RetryDecision::GiveUp);
    }

    #[test]
    fn test_client_and_protocol_failures_are_not_retried() {
        let policy = RetryPolicy::default();
        let client = ProxyError::ClientIo("connection reset".into());
        let garbage = ProxyError::UpstreamProtocol {
            target: "127.0.0.1:1".into(),
            message: "invalid status line".into(),
        };
        assert_eq!(policy.decide(0, &client, 3), RetryDecision::GiveUp);
        assert_eq!(policy.decide(0, &garbage, 3), RetryDecision::GiveUp);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}

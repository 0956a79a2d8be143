//! Retry policy: a pure function of attempt index, error classification,
//! and policy parameters. Delay grows geometrically with jitter; a
//! server-supplied retry-after floor is honored for upstream rate limits.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClassification {
    BadRequest,
    Auth,
    RateLimitedUpstream,
    Transport,
    Timeout,
    ServerError,
    CircuitOpen,
    ContentFilter,
    Cancelled,
}

impl ErrorClassification {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorClassification::Transport
                | ErrorClassification::Timeout
                | ErrorClassification::RateLimitedUpstream
                | ErrorClassification::ServerError
                | ErrorClassification::CircuitOpen
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub jitter_pct: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            factor: 2.0,
            jitter_pct: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Decides whether attempt `i` (0-based) should retry, and after how long.
/// `retry_after` is an optional server-supplied hint (e.g. a 429's
/// `Retry-After` header) honored as a floor for upstream rate limits.
pub fn decide(
    attempt_index: u32,
    classification: ErrorClassification,
    policy: &RetryPolicy,
    retry_after: Option<Duration>,
) -> RetryDecision {
    if !classification.is_retryable() {
        return RetryDecision::GiveUp;
    }
    if attempt_index + 1 >= policy.max_attempts {
        return RetryDecision::GiveUp;
    }

    let base = policy.base_delay.as_secs_f64() * policy.factor.powi(attempt_index as i32);
    let jitter_span = base * policy.jitter_pct;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    let mut delay = (base + jitter).max(0.0);

    if classification == ErrorClassification::RateLimitedUpstream {
        if let Some(floor) = retry_after {
            delay = delay.max(floor.as_secs_f64());
        }
    }

    RetryDecision::RetryAfter(Duration::from_secs_f64(delay))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retryable_classes_give_up_immediately() {
        let policy = RetryPolicy::default();
        for class in [
            ErrorClassification::BadRequest,
            ErrorClassification::Auth,
            ErrorClassification::ContentFilter,
            ErrorClassification::Cancelled,
        ] {
            assert_eq!(decide(0, class, &policy, None), RetryDecision::GiveUp);
        }
    }

    #[test]
    fn gives_up_once_attempt_budget_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        };
        assert_eq!(
            decide(1, ErrorClassification::Transport, &policy, None),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn retry_after_floors_the_delay_for_upstream_rate_limit() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            factor: 2.0,
            jitter_pct: 0.0,
        };
        let decision = decide(
            0,
            ErrorClassification::RateLimitedUpstream,
            &policy,
            Some(Duration::from_secs(5)),
        );
        match decision {
            RetryDecision::RetryAfter(d) => assert!(d >= Duration::from_secs(5)),
            RetryDecision::GiveUp => panic!("expected a retry"),
        }
    }

    #[test]
    fn delay_grows_geometrically() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            jitter_pct: 0.0,
        };
        let RetryDecision::RetryAfter(d0) = decide(0, ErrorClassification::Transport, &policy, None) else {
            panic!("expected retry")
        };
        let RetryDecision::RetryAfter(d1) = decide(1, ErrorClassification::Transport, &policy, None) else {
            panic!("expected retry")
        };
        assert!(d1 > d0);
    }
}

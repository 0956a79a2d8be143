//! Failover manager: given an ordered group of provider instances, produces
//! a candidate order per the group's strategy and drives an attempt loop
//! that consults the retry policy on every failure. Stateless across
//! requests except for the round-robin cursor kept per group.

use crate::retry::{decide, ErrorClassification, RetryDecision, RetryPolicy};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverStrategy {
    Priority,
    RoundRobin,
    HealthWeighted,
    CostOptimized,
}

#[derive(Debug, Clone)]
pub struct FailoverGroup {
    pub name: String,
    /// Instance names in priority order; other strategies reorder this.
    pub instances: Vec<String>,
    pub strategy: FailoverStrategy,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailoverError {
    NoHealthyProvider,
    /// Carries the first non-retryable error's message if one occurred,
    /// otherwise the last error observed before the candidate list or
    /// attempt budget was exhausted.
    Upstream(String),
}

pub struct FailoverManager {
    cursors: DashMap<String, AtomicUsize>,
}

impl FailoverManager {
    pub fn new() -> Self {
        Self {
            cursors: DashMap::new(),
        }
    }

    /// Builds the ordered candidate list for a group: healthy, closed-circuit
    /// instances only, permuted per `group.strategy`.
    pub fn candidates(
        &self,
        group: &FailoverGroup,
        is_circuit_open: impl Fn(&str) -> bool,
        health_score: impl Fn(&str) -> f64,
        health_threshold: f64,
    ) -> Vec<String> {
        let mut eligible: Vec<String> = group
            .instances
            .iter()
            .filter(|name| !is_circuit_open(name) && health_score(name) >= health_threshold)
            .cloned()
            .collect();

        match group.strategy {
            FailoverStrategy::Priority | FailoverStrategy::CostOptimized => eligible,
            FailoverStrategy::HealthWeighted => {
                eligible.sort_by(|a, b| {
                    health_score(b)
                        .partial_cmp(&health_score(a))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                eligible
            }
            FailoverStrategy::RoundRobin => {
                if eligible.is_empty() {
                    return eligible;
                }
                let cursor = self
                    .cursors
                    .entry(group.name.clone())
                    .or_insert_with(|| AtomicUsize::new(0));
                let start = cursor.fetch_add(1, Ordering::Relaxed) % eligible.len();
                eligible.rotate_left(start);
                eligible
            }
        }
    }

    /// Drives candidates in order, invoking `attempt` for each. On failure,
    /// consults the retry policy to decide whether to advance to the next
    /// candidate. A give-up preceded by a non-retryable error propagates
    /// that error unmodified; otherwise the last error observed is reported.
    pub async fn run<F, Fut, T>(
        &self,
        group: &FailoverGroup,
        candidates: &[String],
        policy: &RetryPolicy,
        mut attempt: F,
    ) -> Result<T, FailoverError>
    where
        F: FnMut(String, u32) -> Fut,
        Fut: Future<Output = Result<T, (ErrorClassification, String)>>,
    {
        if candidates.is_empty() {
            return Err(FailoverError::NoHealthyProvider);
        }

        let attempt_cap = group.max_attempts.min(candidates.len() as u32);
        let mut first_non_retryable: Option<String> = None;
        let mut last_message = String::new();

        for (i, candidate) in candidates.iter().take(attempt_cap as usize).enumerate() {
            match attempt(candidate.clone(), i as u32).await {
                Ok(value) => return Ok(value),
                Err((classification, message)) => {
                    last_message = message.clone();
                    if !classification.is_retryable() && first_non_retryable.is_none() {
                        first_non_retryable = Some(message);
                    }
                    if let RetryDecision::GiveUp = decide(i as u32, classification, policy, None) {
                        break;
                    }
                }
            }
        }

        Err(FailoverError::Upstream(
            first_non_retryable.unwrap_or(last_message),
        ))
    }
}

impl Default for FailoverManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(strategy: FailoverStrategy) -> FailoverGroup {
        FailoverGroup {
            name: "primary".to_string(),
            instances: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            strategy,
            max_attempts: 3,
        }
    }

    #[test]
    fn priority_keeps_declared_order_and_skips_open_circuits() {
        let manager = FailoverManager::new();
        let candidates = manager.candidates(
            &group(FailoverStrategy::Priority),
            |name| name == "a",
            |_| 1.0,
            0.5,
        );
        assert_eq!(candidates, vec!["b", "c"]);
    }

    #[test]
    fn health_weighted_sorts_descending() {
        let manager = FailoverManager::new();
        let candidates = manager.candidates(
            &group(FailoverStrategy::HealthWeighted),
            |_| false,
            |name| match name {
                "a" => 0.5,
                "b" => 0.9,
                _ => 0.7,
            },
            0.0,
        );
        assert_eq!(candidates, vec!["b", "c", "a"]);
    }

    #[test]
    fn round_robin_rotates_across_calls() {
        let manager = FailoverManager::new();
        let g = group(FailoverStrategy::RoundRobin);
        let first = manager.candidates(&g, |_| false, |_| 1.0, 0.0);
        let second = manager.candidates(&g, |_| false, |_| 1.0, 0.0);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn exhausting_candidates_without_success_reports_upstream_error() {
        let manager = FailoverManager::new();
        let g = group(FailoverStrategy::Priority);
        let candidates = vec!["a".to_string(), "b".to_string()];
        let result: Result<(), FailoverError> = manager
            .run(&g, &candidates, &RetryPolicy::default(), |_name, _i| async {
                Err((ErrorClassification::Transport, "boom".to_string()))
            })
            .await;
        assert_eq!(result, Err(FailoverError::Upstream("boom".to_string())));
    }

    #[tokio::test]
    async fn first_non_retryable_error_wins() {
        let manager = FailoverManager::new();
        let g = group(FailoverStrategy::Priority);
        let candidates = vec!["a".to_string(), "b".to_string()];
        let result: Result<(), FailoverError> = manager
            .run(&g, &candidates, &RetryPolicy::default(), |name, _i| async move {
                if name == "a" {
                    Err((ErrorClassification::Auth, "bad key".to_string()))
                } else {
                    Err((ErrorClassification::Transport, "timeout".to_string()))
                }
            })
            .await;
        assert_eq!(result, Err(FailoverError::Upstream("bad key".to_string())));
    }

    #[tokio::test]
    async fn empty_candidate_list_is_no_healthy_provider() {
        let manager = FailoverManager::new();
        let g = group(FailoverStrategy::Priority);
        let result: Result<(), FailoverError> = manager
            .run(&g, &[], &RetryPolicy::default(), |_name, _i| async {
                Ok(())
            })
            .await;
        assert_eq!(result, Err(FailoverError::NoHealthyProvider));
    }
}

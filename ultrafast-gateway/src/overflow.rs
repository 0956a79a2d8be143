//! Overflow queue (C4): absorbs admission bursts without rejecting work.
//!
//! No persistent store ships with this crate — the Non-goal is a durable job
//! store, not the queue contract itself. [`OverflowQueue`] is the trait other
//! code depends on; [`InMemoryOverflowQueue`] is the reference implementation
//! behind it, a `tokio::sync::Mutex`-guarded structure keyed by tenant, kept
//! swappable for a durable backend later the same way this codebase already
//! treats its provider registry as swappable behind a trait.

use crate::server::AppState;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// A unit of deferred admission work: a request that could not be admitted
/// immediately and was diverted to the queue instead of being rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverflowJob {
    pub job_id: Uuid,
    pub tenant_key: String,
    pub request_id: Uuid,
    pub payload: serde_json::Value,
    pub attempts: u32,
}

impl OverflowJob {
    pub fn new(tenant_key: impl Into<String>, request_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            tenant_key: tenant_key.into(),
            request_id,
            payload,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OverflowError {
    #[error("tenant queue at capacity")]
    KeyAtCapacity,
    #[error("job is not currently leased")]
    NotLeased,
}

/// Lease/ack/visibility-timeout contract for a FIFO-per-key, at-least-once
/// overflow queue. A leased job is invisible to other `lease` calls until it
/// is acked, nacked, or its visibility timeout elapses, at which point it is
/// requeued at the front of its tenant's FIFO — hence at-least-once, never
/// at-most-once.
#[async_trait::async_trait]
pub trait OverflowQueue: Send + Sync {
    async fn enqueue(&self, job: OverflowJob) -> Result<(), OverflowError>;
    async fn lease(&self, max_jobs: usize) -> Vec<OverflowJob>;
    async fn ack(&self, job_id: Uuid) -> Result<(), OverflowError>;
    async fn nack(&self, job_id: Uuid) -> Result<(), OverflowError>;
    async fn depth(&self, tenant_key: &str) -> usize;
}

struct Leased {
    job: OverflowJob,
    deadline: Instant,
}

struct State {
    queues: HashMap<String, VecDeque<OverflowJob>>,
    leased: HashMap<Uuid, Leased>,
}

/// In-process reference implementation. Not durable across restarts — this
/// is the contract's reference backend, not a production job store.
pub struct InMemoryOverflowQueue {
    state: Mutex<State>,
    capacity_per_key: usize,
    visibility_timeout: Duration,
}

impl InMemoryOverflowQueue {
    pub fn new(capacity_per_key: usize, visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                queues: HashMap::new(),
                leased: HashMap::new(),
            }),
            capacity_per_key,
            visibility_timeout,
        }
    }

    /// Moves leases past their visibility timeout back onto the front of
    /// their tenant's queue. Called opportunistically from `lease`.
    fn reap_expired(state: &mut State) {
        let now = Instant::now();
        let expired: Vec<Uuid> = state
            .leased
            .iter()
            .filter(|(_, l)| l.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for job_id in expired {
            if let Some(mut leased) = state.leased.remove(&job_id) {
                leased.job.attempts += 1;
                state
                    .queues
                    .entry(leased.job.tenant_key.clone())
                    .or_default()
                    .push_front(leased.job);
            }
        }
    }
}

#[async_trait::async_trait]
impl OverflowQueue for InMemoryOverflowQueue {
    async fn enqueue(&self, job: OverflowJob) -> Result<(), OverflowError> {
        let mut state = self.state.lock().await;
        let queue = state.queues.entry(job.tenant_key.clone()).or_default();
        if queue.len() >= self.capacity_per_key {
            return Err(OverflowError::KeyAtCapacity);
        }
        queue.push_back(job);
        Ok(())
    }

    async fn lease(&self, max_jobs: usize) -> Vec<OverflowJob> {
        let mut state = self.state.lock().await;
        Self::reap_expired(&mut state);

        let mut leased = Vec::with_capacity(max_jobs);
        let keys: Vec<String> = state.queues.keys().cloned().collect();
        let mut key_iter = keys.into_iter().cycle();
        let mut empty_streak = 0;
        let total_keys = state.queues.len().max(1);

        while leased.len() < max_jobs && empty_streak < total_keys {
            let Some(key) = key_iter.next() else { break };
            let took = state
                .queues
                .get_mut(&key)
                .and_then(|q| q.pop_front());
            match took {
                Some(job) => {
                    empty_streak = 0;
                    let deadline = Instant::now() + self.visibility_timeout;
                    state.leased.insert(
                        job.job_id,
                        Leased {
                            job: job.clone(),
                            deadline,
                        },
                    );
                    leased.push(job);
                }
                None => empty_streak += 1,
            }
        }
        state.queues.retain(|_, q| !q.is_empty());
        leased
    }

    async fn ack(&self, job_id: Uuid) -> Result<(), OverflowError> {
        let mut state = self.state.lock().await;
        state
            .leased
            .remove(&job_id)
            .map(|_| ())
            .ok_or(OverflowError::NotLeased)
    }

    async fn nack(&self, job_id: Uuid) -> Result<(), OverflowError> {
        let mut state = self.state.lock().await;
        let mut leased = state.leased.remove(&job_id).ok_or(OverflowError::NotLeased)?;
        leased.job.attempts += 1;
        state
            .queues
            .entry(leased.job.tenant_key.clone())
            .or_default()
            .push_front(leased.job);
        Ok(())
    }

    async fn depth(&self, tenant_key: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(tenant_key).map(VecDeque::len).unwrap_or(0)
    }
}

/// Requeue attempts a job gets before the drainer gives up on it entirely.
/// Past this, the caller was already told "queued" and will never see the
/// outcome of its own request; giving up just stops the job from sitting in
/// its tenant's FIFO forever behind a budget that never recovers.
const MAX_DRAIN_ATTEMPTS: u32 = 10;

/// Leases up to `max_jobs` and attempts to admit + replay each one against
/// the same chat-completion path the original caller would have taken.
/// Returns the number of jobs leased this round.
///
/// A job whose tenant still has no budget is nacked (requeued at the front,
/// `attempts` incremented) rather than rejected outright — the point of the
/// queue is to absorb bursts, not to convert one rejection into another.
/// Only a job that has been retried [`MAX_DRAIN_ATTEMPTS`] times is dropped.
pub async fn drain_once(state: &AppState, max_jobs: usize) -> usize {
    let jobs = state.overflow_queue.lease(max_jobs).await;
    for job in &jobs {
        state.telemetry.emit(
            crate::telemetry::Event::OverflowDrainStart,
            &crate::telemetry::measurements(&[("attempts", job.attempts as f64)]),
            &crate::telemetry::meta(&[("tenant_key", &job.tenant_key)]),
        );
    }

    for job in jobs.iter().cloned() {
        let job_id = job.job_id;
        let outcome = drain_job(state, job).await;
        match outcome {
            DrainOutcome::Admitted => {
                let _ = state.overflow_queue.ack(job_id).await;
                state.telemetry.emit(
                    crate::telemetry::Event::OverflowDrainStop,
                    &HashMap::new(),
                    &crate::telemetry::meta(&[("job_id", &job_id.to_string())]),
                );
            }
            DrainOutcome::StillOverBudget { attempts } if attempts < MAX_DRAIN_ATTEMPTS => {
                let _ = state.overflow_queue.nack(job_id).await;
            }
            DrainOutcome::StillOverBudget { .. } | DrainOutcome::Malformed => {
                let _ = state.overflow_queue.ack(job_id).await;
                state.telemetry.emit(
                    crate::telemetry::Event::OverflowDrainGiveup,
                    &HashMap::new(),
                    &crate::telemetry::meta(&[("job_id", &job_id.to_string())]),
                );
            }
        }
    }

    jobs.len()
}

enum DrainOutcome {
    Admitted,
    StillOverBudget { attempts: u32 },
    Malformed,
}

/// Re-checks admission for the job's tenant and, once budget allows, runs
/// the deferred chat completion to completion (recording metrics/cost the
/// same way the synchronous handler does) so draining a backlog has the
/// same observable effect as the request having been admitted immediately.
async fn drain_job(state: &AppState, job: OverflowJob) -> DrainOutcome {
    let request: ultrafast_models_sdk::models::ChatRequest =
        match serde_json::from_value(job.payload) {
            Ok(r) => r,
            Err(_) => return DrainOutcome::Malformed,
        };

    let auth_context = match crate::auth::validate_api_key_global(&job.tenant_key) {
        Ok(ctx) => ctx,
        Err(_) => return DrainOutcome::Malformed,
    };

    let slot =
        match crate::auth::check_admission(&auth_context.user_id, &auth_context.rate_limits).await {
            Ok(slot) => slot,
            Err(_) => return DrainOutcome::StillOverBudget { attempts: job.attempts },
        };

    let start = std::time::Instant::now();
    let result = state.client.chat_completion(request.clone()).await;
    drop(slot);
    let latency = start.elapsed();

    let status_code = match &result {
        Ok(_) => 200,
        Err(e) => crate::gateway_error::GatewayError::classify_client(e).status().as_u16(),
    };
    let provider = state.client.get_last_used_provider().await;
    let (input_tokens, output_tokens, cost_usd) = match &result {
        Ok(response) => {
            let input = response.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or_default();
            let output = response.usage.as_ref().map(|u| u.completion_tokens).unwrap_or_default();
            let cost = provider.as_ref().and_then(|p| {
                ultrafast_models_sdk::cost::estimate_cost_usd(p, &request.model, input, output)
            });
            (input, output, cost)
        }
        Err(_) => (0, 0, None),
    };

    let mut builder = crate::metrics::RequestMetricsBuilder::new(
        "POST".to_string(),
        "/v1/chat/completions".to_string(),
        status_code,
        latency,
    )
    .provider(provider.unwrap_or_default())
    .model(request.model.clone())
    .input_tokens(input_tokens)
    .output_tokens(output_tokens)
    .user_id(auth_context.user_id.clone());
    if let Some(cost) = cost_usd {
        builder = builder.cost_usd(cost);
    }
    crate::metrics::record_request(builder.build()).await;

    if let Err(e) = result {
        tracing::warn!(job_id = %job.job_id, "overflow drain: provider error: {}", e);
    }
    DrainOutcome::Admitted
}

/// Spawns the background task that periodically drains the overflow queue.
/// Keeps running for the lifetime of the server; there is no shutdown
/// signal because the server itself does not have a graceful-shutdown path
/// today.
pub fn spawn_drain_loop(state: AppState, interval: Duration, batch_size: usize) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            drain_once(&state, batch_size).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(key: &str) -> OverflowJob {
        OverflowJob::new(key, Uuid::new_v4(), serde_json::json!({"model": "gpt-4"}))
    }

    #[tokio::test]
    async fn fifo_per_key_preserved() {
        let q = InMemoryOverflowQueue::new(10, Duration::from_secs(30));
        let a1 = job("tenant-a");
        let a1_id = a1.job_id;
        q.enqueue(a1).await.unwrap();
        let a2 = job("tenant-a");
        let a2_id = a2.job_id;
        q.enqueue(a2).await.unwrap();

        let leased = q.lease(1).await;
        assert_eq!(leased[0].job_id, a1_id);
        q.ack(leased[0].job_id).await.unwrap();

        let leased = q.lease(1).await;
        assert_eq!(leased[0].job_id, a2_id);
    }

    #[tokio::test]
    async fn capacity_rejects_at_limit() {
        let q = InMemoryOverflowQueue::new(1, Duration::from_secs(30));
        q.enqueue(job("tenant-a")).await.unwrap();
        let err = q.enqueue(job("tenant-a")).await.unwrap_err();
        assert_eq!(err, OverflowError::KeyAtCapacity);
    }

    #[tokio::test]
    async fn expired_lease_is_redelivered() {
        let q = InMemoryOverflowQueue::new(10, Duration::from_millis(10));
        let j = job("tenant-a");
        let job_id = j.job_id;
        q.enqueue(j).await.unwrap();

        let leased = q.lease(1).await;
        assert_eq!(leased[0].job_id, job_id);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let redelivered = q.lease(1).await;
        assert_eq!(redelivered[0].job_id, job_id);
        assert_eq!(redelivered[0].attempts, 1);
    }

    #[tokio::test]
    async fn nack_requeues_at_front() {
        let q = InMemoryOverflowQueue::new(10, Duration::from_secs(30));
        let j = job("tenant-a");
        let job_id = j.job_id;
        q.enqueue(j).await.unwrap();

        let leased = q.lease(1).await;
        q.nack(leased[0].job_id).await.unwrap();

        let leased_again = q.lease(1).await;
        assert_eq!(leased_again[0].job_id, job_id);
        assert_eq!(leased_again[0].attempts, 1);
    }
}

//! Per-request usage accumulation. A stream reports prompt/completion
//! tokens incrementally; the tracker keeps last-value-wins accumulators
//! keyed by request id and finalizes a single report at `finish`/`error`.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    /// Set when the driver supplied no usage event and counts were
    /// derived from a character-to-token ratio table.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
    /// Set when the stream ended without a `finish`/`error` event and a
    /// terminal frame was synthesized.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl UsageReport {
    fn recompute_total(&mut self) {
        self.total_tokens = self.prompt_tokens + self.completion_tokens;
    }
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    report: UsageReport,
}

/// Tracks in-flight usage accumulators by request id, idempotent on
/// repeated partial usage events (last value wins per field).
pub struct UsageTracker {
    inflight: DashMap<String, Accumulator>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Records a `{usage, prompt_tok, completion_tok}` event for a request.
    pub fn record(&self, request_id: &str, prompt_tokens: u32, completion_tokens: u32) {
        let mut entry = self.inflight.entry(request_id.to_string()).or_default();
        entry.report.prompt_tokens = prompt_tokens;
        entry.report.completion_tokens = completion_tokens;
        entry.report.recompute_total();
        entry.report.estimated = false;
    }

    /// Estimates tokens from character counts using a fixed ratio (the
    /// default character-to-token table value of 4.0) when the driver
    /// never supplies a real usage event.
    pub fn estimate(&self, request_id: &str, prompt_chars: usize, completion_chars: usize, ratio: f64) {
        let mut entry = self.inflight.entry(request_id.to_string()).or_default();
        if entry.report.prompt_tokens == 0 && entry.report.completion_tokens == 0 {
            entry.report.prompt_tokens = (prompt_chars as f64 / ratio).ceil() as u32;
            entry.report.completion_tokens = (completion_chars as f64 / ratio).ceil() as u32;
            entry.report.recompute_total();
            entry.report.estimated = true;
        }
    }

    pub fn mark_partial(&self, request_id: &str) {
        if let Some(mut entry) = self.inflight.get_mut(request_id) {
            entry.report.partial = true;
        }
    }

    pub fn attach_cost(&self, request_id: &str, cost_usd: f64) {
        if let Some(mut entry) = self.inflight.get_mut(request_id) {
            entry.report.estimated_cost = Some(cost_usd);
        }
    }

    /// Finalizes and clears tracked state for a request, returning the
    /// accumulated report. Safe to call on an untracked id (returns the
    /// zero report).
    pub fn finish(&self, request_id: &str) -> UsageReport {
        self.inflight
            .remove(request_id)
            .map(|(_, acc)| acc.report)
            .unwrap_or_default()
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_TRACKER: OnceLock<UsageTracker> = OnceLock::new();

pub fn global_tracker() -> &'static UsageTracker {
    GLOBAL_TRACKER.get_or_init(UsageTracker::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_value_wins_across_repeated_partial_events() {
        let tracker = UsageTracker::new();
        tracker.record("req-1", 10, 5);
        tracker.record("req-1", 10, 8);
        let report = tracker.finish("req-1");
        assert_eq!(report.prompt_tokens, 10);
        assert_eq!(report.completion_tokens, 8);
        assert_eq!(report.total_tokens, 18);
    }

    #[test]
    fn finish_clears_state() {
        let tracker = UsageTracker::new();
        tracker.record("req-2", 1, 1);
        tracker.finish("req-2");
        assert_eq!(tracker.finish("req-2"), UsageReport::default());
    }

    #[test]
    fn estimate_only_applies_when_no_real_usage_recorded() {
        let tracker = UsageTracker::new();
        tracker.estimate("req-3", 40, 20, 4.0);
        tracker.record("req-3", 99, 99);
        let report = tracker.finish("req-3");
        assert_eq!(report.prompt_tokens, 99);
        assert!(!report.estimated);
    }
}

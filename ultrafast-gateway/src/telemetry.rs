//! Telemetry taxonomy (C15): a fixed vocabulary of gateway events behind a
//! thin sink trait. No metrics backend ships with this crate — the Non-goal
//! is the sink integration, not the taxonomy itself — so the default sink
//! renders every event through `tracing`, keeping the taxonomy observable in
//! the default build without a metrics backend. Event names are the exact
//! dotted strings named in the external interfaces: `auth.success`,
//! `rate_limit.block`, `router.decide`, `circuit.open`, and so on.

use std::collections::HashMap;

/// Named events a component may emit at a decision boundary. Variant names
/// mirror the dotted wire name; `name()` returns that wire string verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    AuthSuccess,
    AuthFailure,
    RateLimitAllow,
    RateLimitBlock,
    RouterDecide,
    RouterRouteError,
    ProviderRequestStart,
    ProviderRequestStop,
    ProviderRequestError,
    CircuitOpen,
    CircuitClose,
    CircuitHalfOpen,
    OverflowEnqueue,
    OverflowDrainStart,
    OverflowDrainStop,
    OverflowDrainGiveup,
    StreamChunk,
    StreamComplete,
    StreamError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Info,
    Warn,
}

impl Event {
    pub fn name(self) -> &'static str {
        match self {
            Event::AuthSuccess => "auth.success",
            Event::AuthFailure => "auth.failure",
            Event::RateLimitAllow => "rate_limit.allow",
            Event::RateLimitBlock => "rate_limit.block",
            Event::RouterDecide => "router.decide",
            Event::RouterRouteError => "router.route_error",
            Event::ProviderRequestStart => "provider.request.start",
            Event::ProviderRequestStop => "provider.request.stop",
            Event::ProviderRequestError => "provider.request.error",
            Event::CircuitOpen => "circuit.open",
            Event::CircuitClose => "circuit.close",
            Event::CircuitHalfOpen => "circuit.half_open",
            Event::OverflowEnqueue => "overflow.enqueue",
            Event::OverflowDrainStart => "overflow.drain.start",
            Event::OverflowDrainStop => "overflow.drain.stop",
            Event::OverflowDrainGiveup => "overflow.drain.giveup",
            Event::StreamChunk => "stream.chunk",
            Event::StreamComplete => "stream.complete",
            Event::StreamError => "stream.error",
        }
    }

    pub fn class(self) -> EventClass {
        match self {
            Event::AuthFailure
            | Event::RateLimitBlock
            | Event::RouterRouteError
            | Event::ProviderRequestError
            | Event::CircuitOpen
            | Event::OverflowDrainGiveup
            | Event::StreamError => EventClass::Warn,
            _ => EventClass::Info,
        }
    }
}

/// Measurements are numeric (latency, counts); metadata is free-form
/// identifying context (provider name, tenant key, request id).
pub trait TelemetrySink: Send + Sync {
    fn emit(
        &self,
        event: Event,
        measurements: &HashMap<String, f64>,
        metadata: &HashMap<String, String>,
    );
}

/// Default sink: every event becomes one `tracing` record at `info!` or
/// `warn!` depending on its class.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(
        &self,
        event: Event,
        measurements: &HashMap<String, f64>,
        metadata: &HashMap<String, String>,
    ) {
        match event.class() {
            EventClass::Info => {
                tracing::info!(event = event.name(), ?measurements, ?metadata, "telemetry")
            }
            EventClass::Warn => {
                tracing::warn!(event = event.name(), ?measurements, ?metadata, "telemetry")
            }
        }
    }
}

/// Convenience for the common case of a single metadata/measurement pair;
/// call sites build these ad hoc rather than threading builders everywhere.
pub fn meta(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn measurements(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        seen: Mutex<Vec<&'static str>>,
    }

    impl TelemetrySink for RecordingSink {
        fn emit(&self, event: Event, _: &HashMap<String, f64>, _: &HashMap<String, String>) {
            self.seen.lock().unwrap().push(event.name());
        }
    }

    #[test]
    fn event_class_matches_severity() {
        assert_eq!(Event::RateLimitBlock.class(), EventClass::Warn);
        assert_eq!(Event::RateLimitAllow.class(), EventClass::Info);
    }

    #[test]
    fn sink_receives_emitted_events() {
        let sink = RecordingSink {
            seen: Mutex::new(Vec::new()),
        };
        sink.emit(Event::RouterDecide, &HashMap::new(), &HashMap::new());
        assert_eq!(sink.seen.lock().unwrap().as_slice(), ["router.decide"]);
    }

    #[test]
    fn wire_names_match_taxonomy() {
        assert_eq!(Event::OverflowDrainGiveup.name(), "overflow.drain.giveup");
        assert_eq!(Event::StreamChunk.name(), "stream.chunk");
    }
}

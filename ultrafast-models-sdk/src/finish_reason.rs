//! Maps vendor-specific stream/response termination tags onto a single
//! closed set so callers never branch on provider-specific strings.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalFinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Cancelled,
}

impl CanonicalFinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalFinishReason::Stop => "stop",
            CanonicalFinishReason::Length => "length",
            CanonicalFinishReason::ContentFilter => "content_filter",
            CanonicalFinishReason::ToolCalls => "tool_calls",
            CanonicalFinishReason::Error => "error",
            CanonicalFinishReason::Cancelled => "cancelled",
        }
    }
}

/// `(vendor, vendor_tag) -> CanonicalFinishReason`. Unknown tags fall back
/// to `stop` and are logged once per distinct `(vendor, tag)` pair.
fn map_table(vendor: &str, tag: &str) -> Option<CanonicalFinishReason> {
    match (vendor, tag) {
        ("openai", "stop") => Some(CanonicalFinishReason::Stop),
        ("openai", "length") => Some(CanonicalFinishReason::Length),
        ("openai", "content_filter") => Some(CanonicalFinishReason::ContentFilter),
        ("openai", "tool_calls") | ("openai", "function_call") => {
            Some(CanonicalFinishReason::ToolCalls)
        }
        ("anthropic", "end_turn") | ("anthropic", "stop_sequence") => {
            Some(CanonicalFinishReason::Stop)
        }
        ("anthropic", "max_tokens") => Some(CanonicalFinishReason::Length),
        ("anthropic", "tool_use") => Some(CanonicalFinishReason::ToolCalls),
        ("gemini", "STOP") => Some(CanonicalFinishReason::Stop),
        ("gemini", "MAX_TOKENS") => Some(CanonicalFinishReason::Length),
        ("gemini", "SAFETY") | ("gemini", "RECITATION") => {
            Some(CanonicalFinishReason::ContentFilter)
        }
        ("cohere", "COMPLETE") => Some(CanonicalFinishReason::Stop),
        ("cohere", "MAX_TOKENS") => Some(CanonicalFinishReason::Length),
        _ => None,
    }
}

fn warned_tags() -> &'static RwLock<std::collections::HashSet<(String, String)>> {
    static WARNED: OnceLock<RwLock<std::collections::HashSet<(String, String)>>> = OnceLock::new();
    WARNED.get_or_init(Default::default)
}

/// Maps a raw vendor finish tag to the canonical set. Unknown tags default
/// to `stop`; a warning fires once per distinct `(vendor, tag)` pair.
pub fn map_finish_reason(vendor: &str, tag: &str) -> CanonicalFinishReason {
    if let Some(reason) = map_table(vendor, tag) {
        return reason;
    }

    let key = (vendor.to_string(), tag.to_string());
    let already_warned = warned_tags().read().unwrap().contains(&key);
    if !already_warned {
        warned_tags().write().unwrap().insert(key);
        tracing::warn!(vendor, tag, "unrecognized finish reason, defaulting to stop");
    }
    CanonicalFinishReason::Stop
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_vendor_tags() {
        assert_eq!(map_finish_reason("openai", "stop"), CanonicalFinishReason::Stop);
        assert_eq!(
            map_finish_reason("anthropic", "end_turn"),
            CanonicalFinishReason::Stop
        );
        assert_eq!(
            map_finish_reason("anthropic", "max_tokens"),
            CanonicalFinishReason::Length
        );
        assert_eq!(
            map_finish_reason("anthropic", "tool_use"),
            CanonicalFinishReason::ToolCalls
        );
    }

    #[test]
    fn unknown_tag_defaults_to_stop() {
        assert_eq!(
            map_finish_reason("mystery", "whatever"),
            CanonicalFinishReason::Stop
        );
    }

    #[test]
    fn as_str_round_trips_wire_names() {
        assert_eq!(CanonicalFinishReason::ContentFilter.as_str(), "content_filter");
        assert_eq!(CanonicalFinishReason::ToolCalls.as_str(), "tool_calls");
    }
}

//! Builds canonical SSE frames from StreamEvents. Every frame shares the
//! stable id and creation timestamp assigned at request start, matching
//! the wire shape OpenAI-compatible clients already parse.

use crate::finish_reason::CanonicalFinishReason;
use crate::models::{Delta, DeltaFunction, DeltaToolCall, StreamChoice, StreamChunk};

pub struct StreamFormatter {
    id: String,
    created: u64,
    model: String,
}

impl StreamFormatter {
    pub fn new(id: impl Into<String>, created: u64, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created,
            model: model.into(),
        }
    }

    fn chunk(&self, choice: StreamChoice) -> StreamChunk {
        StreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![choice],
        }
    }

    /// Content delta frame: `data: {...}\n\n`. Strips CR/LF from the text
    /// so provider-origin content can never split an SSE frame.
    pub fn content_frame(&self, text: &str) -> String {
        let sanitized = sanitize(text);
        let chunk = self.chunk(StreamChoice {
            index: 0,
            delta: Delta {
                role: None,
                content: Some(sanitized),
                tool_calls: None,
            },
            finish_reason: None,
        });
        frame(&chunk)
    }

    pub fn tool_call_frame(
        &self,
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    ) -> String {
        let chunk = self.chunk(StreamChoice {
            index: 0,
            delta: Delta {
                role: None,
                content: None,
                tool_calls: Some(vec![DeltaToolCall {
                    index,
                    id,
                    call_type: Some("function".to_string()),
                    function: Some(DeltaFunction {
                        name,
                        arguments: arguments.map(|a| sanitize(&a)),
                    }),
                }]),
            },
            finish_reason: None,
        });
        frame(&chunk)
    }

    /// Terminal frame carrying the mapped finish reason, followed by the
    /// caller emitting `[DONE]` separately via [`done_frame`].
    pub fn finish_frame(&self, reason: CanonicalFinishReason) -> String {
        let chunk = self.chunk(StreamChoice {
            index: 0,
            delta: Delta {
                role: None,
                content: None,
                tool_calls: None,
            },
            finish_reason: Some(reason.as_str().to_string()),
        });
        frame(&chunk)
    }

    /// In-band error event emitted when bytes were already flushed to the
    /// sink and the error can no longer become a plain HTTP error response.
    pub fn error_frame(&self, classification: &str, message: &str) -> String {
        let payload = serde_json::json!({
            "error": {
                "type": classification,
                "message": sanitize(message),
            }
        });
        format!("event: error\ndata: {payload}\n\n")
    }

    pub fn done_frame(&self) -> &'static str {
        "data: [DONE]\n\n"
    }
}

fn frame(chunk: &StreamChunk) -> String {
    let payload = serde_json::to_string(chunk).expect("StreamChunk always serializes");
    format!("data: {payload}\n\n")
}

fn sanitize(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_frame_strips_embedded_newlines() {
        let formatter = StreamFormatter::new("chatcmpl-1", 1000, "gpt-4o-mini");
        let out = formatter.content_frame("line one\nline two\r\n");
        assert!(!out.trim_end_matches("\n\n").contains('\n'));
        assert!(out.starts_with("data: "));
        assert!(out.ends_with("\n\n"));
    }

    #[test]
    fn finish_frame_carries_mapped_reason() {
        let formatter = StreamFormatter::new("chatcmpl-1", 1000, "gpt-4o-mini");
        let out = formatter.finish_frame(CanonicalFinishReason::Stop);
        assert!(out.contains("\"finish_reason\":\"stop\""));
    }

    #[test]
    fn done_frame_is_exact_terminator() {
        let formatter = StreamFormatter::new("chatcmpl-1", 1000, "gpt-4o-mini");
        assert_eq!(formatter.done_frame(), "data: [DONE]\n\n");
    }

    #[test]
    fn error_frame_uses_event_error_shape() {
        let formatter = StreamFormatter::new("chatcmpl-1", 1000, "gpt-4o-mini");
        let out = formatter.error_frame("transport", "connection reset");
        assert!(out.starts_with("event: error\ndata: "));
    }
}

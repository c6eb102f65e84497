//! Streaming-Chat Wire Protocol
//!
//! Every protocol item rides one SSE `data:` line holding the envelope
//! `{"type": "<meta|sources|token|done|error>", "data": <payload>}`. The
//! envelope is assembled explicitly so `done` carries a literal `null`
//! payload rather than omitting the field.

use axum::response::sse::Event;
use banter_core::SourcePassage;
use serde_json::json;

/// One item of the chat stream, in emission order: `meta` first, at most
/// one `sources`, any number of `token`, then exactly one of
/// `done`/`error`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Meta { conversation_id: String },
    Sources(Vec<SourcePassage>),
    Token(String),
    Done,
    Error(String),
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }

    /// The protocol envelope for this event.
    pub fn envelope(&self) -> serde_json::Value {
        match self {
            StreamEvent::Meta { conversation_id } => json!({
                "type": "meta",
                "data": { "conversation_id": conversation_id },
            }),
            StreamEvent::Sources(sources) => json!({
                "type": "sources",
                "data": sources,
            }),
            StreamEvent::Token(fragment) => json!({
                "type": "token",
                "data": fragment,
            }),
            StreamEvent::Done => json!({
                "type": "done",
                "data": null,
            }),
            StreamEvent::Error(message) => json!({
                "type": "error",
                "data": message,
            }),
        }
    }

    /// Render as an SSE event (`data: <envelope>`).
    pub fn into_sse(self) -> Event {
        Event::default().data(self.envelope().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_envelope() {
        let event = StreamEvent::Meta {
            conversation_id: "c-1".to_string(),
        };
        assert_eq!(
            event.envelope(),
            json!({"type": "meta", "data": {"conversation_id": "c-1"}})
        );
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_done_carries_explicit_null() {
        let rendered = StreamEvent::Done.envelope().to_string();
        assert!(rendered.contains("\"data\":null"));
        assert!(StreamEvent::Done.is_terminal());
    }

    #[test]
    fn test_token_and_error_payloads_are_strings() {
        assert_eq!(
            StreamEvent::Token("hel".to_string()).envelope(),
            json!({"type": "token", "data": "hel"})
        );
        let error = StreamEvent::Error("upstream failed".to_string());
        assert_eq!(
            error.envelope(),
            json!({"type": "error", "data": "upstream failed"})
        );
        assert!(error.is_terminal());
    }

    #[test]
    fn test_sources_envelope_omits_absent_fields() {
        let event = StreamEvent::Sources(vec![SourcePassage {
            source: "file:///doc.pdf".to_string(),
            title: None,
            text: "passage".to_string(),
            score: 0.5,
            metadata: None,
        }]);
        let rendered = event.envelope().to_string();
        assert!(rendered.contains("\"source\":\"file:///doc.pdf\""));
        assert!(!rendered.contains("\"title\""));
        assert!(!rendered.contains("\"metadata\""));
    }
}

//! Controller-level streaming events.
//!
//! `AgentStreamEvent` is what [`IterationController::run_stream`] hands to a
//! live consumer: display text as it becomes safe to show, tool activity,
//! round boundaries, and a terminal `done` or `error`.
//!
//! [`IterationController::run_stream`]: crate::controller::IterationController::run_stream

use sieve_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted while a generation request runs.
///
/// - `chunk`           : display text, directive markers already removed
/// - `tool_call`       : a directive is about to be dispatched
/// - `tool_result`     : the dispatcher returned
/// - `round_completed` : results were folded back into the context
/// - `done`            : the request finished
/// - `error`           : the provider failed and the request was aborted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Text safe to render.
    Chunk { content: String },

    /// A directive with its sanitized parameters.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed (or failed in-band).
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// A round with directives finished.
    RoundCompleted { round: u32, directives: usize },

    /// The request is complete.
    Done {
        conversation_id: String,
        usage: Option<Usage>,
        rounds: usize,
        tool_calls_made: usize,
        forced_fallback: bool,
    },

    /// The request was aborted.
    Error { message: String },
}

impl AgentStreamEvent {
    /// Wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::RoundCompleted { .. } => "round_completed",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serialization() {
        let event = AgentStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn tool_call_serialization() {
        let event = AgentStreamEvent::ToolCall {
            id: "r0_c0".into(),
            name: "calculator".into(),
            input: serde_json::json!({"expression": "2+2"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"calculator""#));
    }

    #[test]
    fn done_serialization() {
        let event = AgentStreamEvent::Done {
            conversation_id: "abc".into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            rounds: 2,
            tool_calls_made: 1,
            forced_fallback: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""rounds":2"#));
        assert!(json.contains(r#""forced_fallback":false"#));
    }

    #[test]
    fn event_type_matches_tag() {
        let events = [
            AgentStreamEvent::Chunk { content: "x".into() },
            AgentStreamEvent::RoundCompleted {
                round: 0,
                directives: 1,
            },
            AgentStreamEvent::Error {
                message: "boom".into(),
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.event_type());
        }
    }

    #[test]
    fn deserialization() {
        let json = r#"{"type":"round_completed","round":1,"directives":2}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            AgentStreamEvent::RoundCompleted {
                round: 1,
                directives: 2
            }
        );
    }
}

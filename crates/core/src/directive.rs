//! Directive and stream-segment value objects.
//!
//! A directive is an in-band request from the model to run a named tool,
//! written as `[TOOL_CALL:<tool_name>:<parameters>]`. The scanner carves
//! directives out of the text stream and hands everything else through as
//! [`StreamSegment::Text`].

use serde::{Deserialize, Serialize};

/// The literal that opens every directive.
pub const DIRECTIVE_MARKER: &str = "[TOOL_CALL:";

/// Insertion-ordered, string-keyed parameter map.
pub type ParameterMap = serde_json::Map<String, serde_json::Value>;

/// A complete directive found in one round of model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveCall {
    /// Name of the tool to invoke (trimmed).
    pub tool_name: String,

    /// Unparsed parameter body (trimmed), without the closing bracket.
    pub raw_parameters: String,

    /// Typed parameters, filled in by the sanitizer before dispatch.
    #[serde(default)]
    pub parsed_parameters: ParameterMap,

    /// The verbatim source text, markers included.
    pub source_span: String,

    /// Position among the calls found in the current round.
    pub sequence_index: usize,
}

impl DirectiveCall {
    pub fn new(
        tool_name: impl Into<String>,
        raw_parameters: impl Into<String>,
        source_span: impl Into<String>,
        sequence_index: usize,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            raw_parameters: raw_parameters.into(),
            parsed_parameters: ParameterMap::new(),
            source_span: source_span.into(),
            sequence_index,
        }
    }

    /// Attach sanitized parameters.
    pub fn with_parameters(mut self, parameters: ParameterMap) -> Self {
        self.parsed_parameters = parameters;
        self
    }
}

/// One classified piece of the incoming stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamSegment {
    /// Text that is safe to show to the user.
    Text { text: String },

    /// A complete, balanced directive.
    Directive { call: DirectiveCall },
}

impl StreamSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Directive { .. } => None,
        }
    }

    pub fn as_directive(&self) -> Option<&DirectiveCall> {
        match self {
            Self::Directive { call } => Some(call),
            Self::Text { .. } => None,
        }
    }
}

/// Merge adjacent text segments.
///
/// Live emission splits text wherever chunks happen to end; the coalesced
/// form is the same for every chunking of the same input.
pub fn coalesce(segments: impl IntoIterator<Item = StreamSegment>) -> Vec<StreamSegment> {
    let mut out: Vec<StreamSegment> = Vec::new();
    for segment in segments {
        match (out.last_mut(), segment) {
            (Some(StreamSegment::Text { text: last }), StreamSegment::Text { text }) => {
                last.push_str(&text);
            }
            (_, segment) => out.push(segment),
        }
    }
    out
}

/// The outcome of dispatching one directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The directive this result answers.
    pub call: DirectiveCall,

    /// Formatted text fed back into the conversation.
    pub output_text: String,

    /// Whether the tool ran and returned normally.
    pub succeeded: bool,

    /// Failure description when `succeeded` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_merges_adjacent_text() {
        let call = DirectiveCall::new("search", "{}", "[TOOL_CALL:search:{}]", 0);
        let merged = coalesce(vec![
            StreamSegment::text("Hel"),
            StreamSegment::text("lo "),
            StreamSegment::Directive { call: call.clone() },
            StreamSegment::text(" wor"),
            StreamSegment::text("ld"),
        ]);
        assert_eq!(
            merged,
            vec![
                StreamSegment::text("Hello "),
                StreamSegment::Directive { call },
                StreamSegment::text(" world"),
            ]
        );
    }

    #[test]
    fn segment_accessors() {
        let text = StreamSegment::text("hi");
        assert_eq!(text.as_text(), Some("hi"));
        assert!(text.as_directive().is_none());
    }

    #[test]
    fn segment_serialization_is_tagged() {
        let json = serde_json::to_string(&StreamSegment::text("hi")).unwrap();
        assert!(json.contains(r#""kind":"text""#));
    }
}

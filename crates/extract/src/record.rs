//! Extraction results.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The structured payload recovered from a model's final text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredRecord {
    /// The recovered fields, in source order.
    pub fields: Map<String, Value>,

    /// Name of the strategy that produced the record.
    pub strategy: &'static str,
}

impl StructuredRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Convert into a caller-defined type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }
}

/// No strategy produced a record.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "no structured payload found (tried {}); text starts with: {excerpt:?}",
    .attempted.join(", ")
)]
pub struct ExtractionFailure {
    /// Bounded prefix of the input.
    pub excerpt: String,

    /// Strategies tried, in order.
    pub attempted: Vec<&'static str>,
}

/// A generated article section, the usual payload of a writing round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub level: u32,

    pub content: String,

    #[serde(default)]
    pub word_count: usize,

    #[serde(default)]
    pub needs_expansion: bool,

    #[serde(default)]
    pub subsections: Vec<Value>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> StructuredRecord {
        StructuredRecord {
            fields: value.as_object().cloned().unwrap(),
            strategy: "direct",
        }
    }

    #[test]
    fn deserializes_into_article_draft() {
        let draft: ArticleDraft = record(json!({
            "title": "Ownership",
            "level": 2,
            "content": "Every value has an owner.",
            "word_count": 5
        }))
        .deserialize()
        .unwrap();

        assert_eq!(draft.title, "Ownership");
        assert_eq!(draft.level, 2);
        assert!(!draft.needs_expansion);
        assert!(draft.subsections.is_empty());
    }

    #[test]
    fn missing_content_does_not_deserialize() {
        let result: Result<ArticleDraft, _> = record(json!({"title": "x"})).deserialize();
        assert!(result.is_err());
    }

    #[test]
    fn failure_message_lists_strategies() {
        let failure = ExtractionFailure {
            excerpt: "Sorry".into(),
            attempted: vec!["direct", "any_fence"],
        };
        let msg = failure.to_string();
        assert!(msg.contains("direct, any_fence"));
        assert!(msg.contains("Sorry"));
    }
}

//! Extraction strategies.
//!
//! Each strategy is an independent attempt to find an object in the text.
//! The extractor runs them in order and the first success wins.

use crate::candidate::best_candidate;
use crate::extractor::PayloadExtractor;
use crate::repair::parse_object;
use serde_json::{Map, Value};
use sieve_config::ExtractorConfig;
use sieve_core::scan::{SQUARE, find_balanced_close};
use tracing::debug;

/// What a strategy can see besides the text.
pub struct ExtractContext<'a> {
    pub extractor: &'a PayloadExtractor,
    /// Number of `Finish[...]` wrappers already unwrapped.
    pub depth: usize,
}

impl ExtractContext<'_> {
    pub fn config(&self) -> &ExtractorConfig {
        self.extractor.config()
    }
}

/// One way of turning text into an object.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_extract(&self, text: &str, cx: &ExtractContext<'_>) -> Option<Map<String, Value>>;
}

/// `Finish[<payload>]`: run the whole extraction again on the payload.
pub struct FinishWrapper;

const FINISH_OPEN: &str = "Finish[";

impl ExtractionStrategy for FinishWrapper {
    fn name(&self) -> &'static str {
        "finish_wrapper"
    }

    fn try_extract(&self, text: &str, cx: &ExtractContext<'_>) -> Option<Map<String, Value>> {
        if cx.depth >= cx.config().max_depth {
            return None;
        }

        let mut cursor = 0;
        while let Some(rel) = text[cursor..].find(FINISH_OPEN) {
            let body_start = cursor + rel + FINISH_OPEN.len();
            let (payload, next) = match find_balanced_close(text, body_start, SQUARE, 1) {
                Some(close) => (&text[body_start..close], Some(close + 1)),
                // Truncated output: the wrapper runs to the end
                None => (&text[body_start..], None),
            };

            if let Some(record) = cx.extractor.extract_at(payload.trim(), cx.depth + 1) {
                debug!(inner = record.strategy, "Unwrapped Finish payload");
                return Some(record.fields);
            }

            cursor = next?;
        }

        None
    }
}

/// The trimmed text is itself an object.
pub struct DirectParse;

impl ExtractionStrategy for DirectParse {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn try_extract(&self, text: &str, _cx: &ExtractContext<'_>) -> Option<Map<String, Value>> {
        parse_object(text)
    }
}

/// A code fence labelled with one of the configured format tags.
pub struct LabeledFence;

impl ExtractionStrategy for LabeledFence {
    fn name(&self) -> &'static str {
        "labeled_fence"
    }

    fn try_extract(&self, text: &str, cx: &ExtractContext<'_>) -> Option<Map<String, Value>> {
        let tags = &cx.config().format_tags;
        fences(text)
            .into_iter()
            .filter(|f| is_format_tag(f.label, tags))
            .find_map(|f| parse_object(f.body))
    }
}

/// Any code fence. A format tag alone on the first body line is dropped.
pub struct AnyFence;

impl ExtractionStrategy for AnyFence {
    fn name(&self) -> &'static str {
        "any_fence"
    }

    fn try_extract(&self, text: &str, cx: &ExtractContext<'_>) -> Option<Map<String, Value>> {
        let tags = &cx.config().format_tags;
        fences(text).into_iter().find_map(|f| {
            let body = f.body.trim_start();
            let body = match body.split_once('\n') {
                Some((first, rest)) if is_format_tag(first.trim(), tags) => rest,
                _ => body,
            };
            parse_object(body)
        })
    }
}

/// Ranked balanced `{...}` candidates.
pub struct BalancedCandidates;

impl ExtractionStrategy for BalancedCandidates {
    fn name(&self) -> &'static str {
        "balanced_candidates"
    }

    fn try_extract(&self, text: &str, cx: &ExtractContext<'_>) -> Option<Map<String, Value>> {
        let best = best_candidate(text, &cx.config().required_field)?;
        debug!(
            offset = best.first_offset,
            fields = best.field_count,
            required = best.has_required_field,
            "Selected brace candidate"
        );
        best.parsed_value
    }
}

fn is_format_tag(label: &str, tags: &[String]) -> bool {
    !label.is_empty() && tags.iter().any(|t| t.eq_ignore_ascii_case(label))
}

/// A fenced block: the label right after the opening backticks and the
/// text up to the closing backticks (or end of text).
#[derive(Debug, PartialEq)]
pub(crate) struct Fence<'a> {
    pub label: &'a str,
    pub body: &'a str,
}

const FENCE: &str = "```";

pub(crate) fn fences(text: &str) -> Vec<Fence<'_>> {
    let mut out = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(FENCE) {
        let label_start = cursor + rel + FENCE.len();
        let label_len = text[label_start..]
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '+' | '-')))
            .unwrap_or(text.len() - label_start);
        let body_start = label_start + label_len;

        match text[body_start..].find(FENCE) {
            Some(close_rel) => {
                let close = body_start + close_rel;
                out.push(Fence {
                    label: &text[label_start..body_start],
                    body: text[body_start..close].trim(),
                });
                cursor = close + FENCE.len();
            }
            None => {
                out.push(Fence {
                    label: &text[label_start..body_start],
                    body: text[body_start..].trim(),
                });
                break;
            }
        }
    }

    out
}

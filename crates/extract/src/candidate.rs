//! Balanced-brace candidates and their ranking.
//!
//! Every top-level `{...}` group in the text is a candidate. Groups that do
//! not parse are opened up and their own top-level groups considered, so a
//! valid object wrapped in brace-delimited prose is still found. Opening up
//! stops [`MAX_UNPARSED_NESTING`] levels down.
//!
//! Ranking is total and independent of candidate order in the input apart
//! from the final tie-break:
//! 1. candidates carrying the required field first;
//! 2. then more fields;
//! 3. then the earliest offset.

use crate::repair::parse_object;
use serde_json::{Map, Value};
use sieve_core::scan::{CURLY, balanced_spans};
use std::cmp::Reverse;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionCandidate {
    /// The balanced `{...}` text.
    pub raw_text: String,

    /// The parsed object, if the text parsed.
    pub parsed_value: Option<Map<String, Value>>,

    pub field_count: usize,

    pub has_required_field: bool,

    /// Byte offset of the opening brace in the scanned text.
    pub first_offset: usize,
}

impl ExtractionCandidate {
    fn new(raw_text: &str, first_offset: usize, required_field: &str) -> Self {
        let parsed_value = parse_object(raw_text);
        let (field_count, has_required_field) = parsed_value
            .as_ref()
            .map(|map| (map.len(), map.contains_key(required_field)))
            .unwrap_or((0, false));

        Self {
            raw_text: raw_text.to_string(),
            parsed_value,
            field_count,
            has_required_field,
            first_offset,
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed_value.is_some()
    }

    fn rank_key(&self) -> (Reverse<bool>, Reverse<usize>, usize) {
        (
            Reverse(self.has_required_field),
            Reverse(self.field_count),
            self.first_offset,
        )
    }
}

/// How many levels of unparsed groups are opened up.
pub const MAX_UNPARSED_NESTING: usize = 8;

/// All candidates in source order, parsed or not.
pub fn collect_candidates(text: &str, required_field: &str) -> Vec<ExtractionCandidate> {
    let mut out = Vec::new();
    collect_into(text, 0, 0, required_field, &mut out);
    out
}

fn collect_into(
    text: &str,
    base: usize,
    level: usize,
    required_field: &str,
    out: &mut Vec<ExtractionCandidate>,
) {
    for (start, end) in balanced_spans(text, CURLY) {
        let raw = &text[start..=end];
        let candidate = ExtractionCandidate::new(raw, base + start, required_field);
        let parsed = candidate.is_parsed();
        out.push(candidate);

        if !parsed && level < MAX_UNPARSED_NESTING {
            let inner = &raw[1..raw.len() - 1];
            collect_into(inner, base + start + 1, level + 1, required_field, out);
        }
    }
}

/// Parsed candidates, best first.
pub fn rank_candidates(mut candidates: Vec<ExtractionCandidate>) -> Vec<ExtractionCandidate> {
    candidates.retain(ExtractionCandidate::is_parsed);
    candidates.sort_by_key(ExtractionCandidate::rank_key);
    candidates
}

/// The winning candidate, if any parsed.
pub fn best_candidate(text: &str, required_field: &str) -> Option<ExtractionCandidate> {
    collect_candidates(text, required_field)
        .into_iter()
        .filter(ExtractionCandidate::is_parsed)
        .min_by_key(ExtractionCandidate::rank_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_field_wins_regardless_of_order() {
        let with = r#"{"content": "body"}"#;
        let without = r#"{"title": "t", "level": 1, "tags": []}"#;

        for text in [format!("{with} then {without}"), format!("{without} then {with}")] {
            let best = best_candidate(&text, "content").unwrap();
            assert_eq!(best.raw_text, with);
            assert!(best.has_required_field);
        }
    }

    #[test]
    fn field_count_then_offset_break_ties() {
        let text = r#"{"a": 1} {"a": 1, "b": 2} {"c": 3, "d": 4}"#;
        let best = best_candidate(text, "content").unwrap();
        assert_eq!(best.raw_text, r#"{"a": 1, "b": 2}"#);
        assert_eq!(best.first_offset, 9);
    }

    #[test]
    fn unparsed_groups_are_opened_up() {
        let text = r#"Note {see below: {"content": "x"}} end"#;
        let all = collect_candidates(text, "content");
        assert_eq!(all.len(), 2);
        assert!(!all[0].is_parsed());
        assert!(all[1].has_required_field);
        assert_eq!(&text[all[1].first_offset..all[1].first_offset + 1], "{");
    }

    #[test]
    fn braces_inside_strings_do_not_split_candidates() {
        let text = r#"{"content": "use } and { freely"}"#;
        let best = best_candidate(text, "content").unwrap();
        assert_eq!(best.raw_text, text);
    }

    #[test]
    fn ranking_drops_unparsed() {
        let ranked = rank_candidates(collect_candidates("{x} {\"a\": 1}", "content"));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].field_count, 1);
    }

    #[test]
    fn opening_up_stops_at_the_nesting_limit() {
        let wrap = |levels: usize| {
            format!(
                "{}{{\"content\": 1}}{}",
                "{x ".repeat(levels),
                "}".repeat(levels)
            )
        };
        let depth = MAX_UNPARSED_NESTING + 1;
        assert!(best_candidate(&wrap(depth - 1), "content").is_some());

        let deep = wrap(depth);
        assert!(best_candidate(&deep, "content").is_none());
        assert_eq!(collect_candidates(&deep, "content").len(), depth);
    }

    #[test]
    fn deep_and_unclosed_braces_finish_quickly() {
        let started = std::time::Instant::now();
        let deep = format!("{}{}", "{".repeat(20_000), "}".repeat(20_000));
        assert!(best_candidate(&deep, "content").is_none());
        assert!(best_candidate(&"{".repeat(20_000), "content").is_none());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn no_candidates() {
        assert!(best_candidate("plain prose", "content").is_none());
    }
}

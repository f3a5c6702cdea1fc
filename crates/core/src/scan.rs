//! Quote-aware bracket balancing.
//!
//! This is the single scanning primitive shared by the directive scanner,
//! the `Finish[...]` wrapper lookup and the brace-candidate search in the
//! payload extractor. Bracket characters inside a quoted string are
//! ignored. A string opened with `"` only closes on `"` (and likewise for
//! `'`). Inside a string a backslash escapes the character after it;
//! outside strings it is an ordinary character.

use std::collections::HashSet;

/// An opening/closing bracket pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Brackets {
    pub open: char,
    pub close: char,
}

/// `[` and `]`, used by directives and `Finish[...]`.
pub const SQUARE: Brackets = Brackets {
    open: '[',
    close: ']',
};

/// `{` and `}`, used for object candidates.
pub const CURLY: Brackets = Brackets {
    open: '{',
    close: '}',
};

/// Find the closing bracket that balances `open_depth` already-open brackets.
///
/// Scanning starts at byte offset `start`. Returns the byte offset of the
/// closing bracket that brings the depth to zero, or `None` when the text
/// ends first.
pub fn find_balanced_close(
    text: &str,
    start: usize,
    brackets: Brackets,
    open_depth: usize,
) -> Option<usize> {
    scan_close(text, start, brackets, open_depth, None)
}

/// The scan behind [`find_balanced_close`].
///
/// When `unclosed` is given and the scan runs off the end, it receives the
/// offsets of the nested openers that were still open at that point.
fn scan_close(
    text: &str,
    start: usize,
    brackets: Brackets,
    open_depth: usize,
    mut unclosed: Option<&mut Vec<usize>>,
) -> Option<usize> {
    let tail = text.get(start..)?;
    let mut depth = open_depth;
    let mut nested: Vec<usize> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in tail.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        if c == '"' || c == '\'' {
            quote = Some(c);
        } else if c == brackets.open {
            depth += 1;
            if unclosed.is_some() {
                nested.push(start + i);
            }
        } else if c == brackets.close && depth > 0 {
            depth -= 1;
            if depth == 0 {
                return Some(start + i);
            }
            nested.pop();
        }
    }

    if let Some(out) = unclosed.as_deref_mut() {
        out.extend(nested);
    }
    None
}

/// Full scans from openers that never balance before [`balanced_spans`] gives up.
pub const MAX_FAILED_SCANS: usize = 32;

/// Byte spans `(start, end_inclusive)` of every top-level balanced group.
///
/// An opening bracket that never balances is skipped and scanning resumes
/// right after it, so one stray bracket in prose does not hide later groups.
/// Openers nested inside a failed scan that were still open at its end
/// would fail the same way and are skipped without rescanning. After
/// [`MAX_FAILED_SCANS`] failures the search stops.
pub fn balanced_spans(text: &str, brackets: Brackets) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut known_open: HashSet<usize> = HashSet::new();
    let mut failed = 0;
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(brackets.open) {
        let open_at = cursor + rel;
        let body_start = open_at + brackets.open.len_utf8();
        if known_open.contains(&open_at) {
            cursor = body_start;
            continue;
        }

        let mut unclosed = Vec::new();
        match scan_close(text, body_start, brackets, 1, Some(&mut unclosed)) {
            Some(close_at) => {
                spans.push((open_at, close_at));
                cursor = close_at + brackets.close.len_utf8();
            }
            None => {
                failed += 1;
                if failed >= MAX_FAILED_SCANS {
                    break;
                }
                known_open.extend(unclosed);
                cursor = body_start;
            }
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_at_matching_bracket() {
        let text = "[a [b] c] tail";
        assert_eq!(find_balanced_close(text, 1, SQUARE, 1), Some(8));
    }

    #[test]
    fn ignores_brackets_inside_quotes() {
        let text = r#"{"q": "a]b"}] rest"#;
        assert_eq!(find_balanced_close(text, 0, SQUARE, 1), Some(12));
    }

    #[test]
    fn nested_array_in_quoted_value_does_not_close_early() {
        let text = r#"{"ids": "[1,2]"}]"#;
        assert_eq!(find_balanced_close(text, 0, SQUARE, 1), Some(text.len() - 1));
    }

    #[test]
    fn unquoted_nested_arrays_balance() {
        let text = r#"{"ids": [[1,2],[3]]}]"#;
        assert_eq!(find_balanced_close(text, 0, SQUARE, 1), Some(text.len() - 1));
    }

    #[test]
    fn escaped_quote_stays_inside_string() {
        let text = r#""say \"]\" now"]"#;
        assert_eq!(find_balanced_close(text, 0, SQUARE, 1), Some(text.len() - 1));
    }

    #[test]
    fn apostrophe_inside_double_quotes_is_plain() {
        let text = r#""it's ]" ]"#;
        assert_eq!(find_balanced_close(text, 0, SQUARE, 1), Some(9));
    }

    #[test]
    fn unterminated_returns_none() {
        assert_eq!(find_balanced_close("[1, 2", 1, SQUARE, 1), None);
        assert_eq!(find_balanced_close("abc", 10, SQUARE, 1), None);
    }

    #[test]
    fn spans_skip_stray_openers() {
        let text = r#"use { to open. {"a": 1} then {"b": {"c": 2}}"#;
        let spans: Vec<&str> = balanced_spans(text, CURLY)
            .into_iter()
            .map(|(s, e)| &text[s..=e])
            .collect();
        assert_eq!(spans, vec![r#"{"a": 1}"#, r#"{"b": {"c": 2}}"#]);
    }

    #[test]
    fn backslash_outside_quotes_is_plain() {
        let text = r"path=C:\tmp\] after";
        assert_eq!(find_balanced_close(text, 0, SQUARE, 1), Some(12));

        let text = r"pattern=\[a-z\]+]";
        assert_eq!(find_balanced_close(text, 0, SQUARE, 1), Some(text.len() - 1));
    }

    #[test]
    fn backslash_before_quote_outside_strings_still_opens_one() {
        let text = r#"\"]" ]"#;
        assert_eq!(find_balanced_close(text, 0, SQUARE, 1), Some(5));
    }

    #[test]
    fn stray_opener_with_apostrophe_in_prose() {
        let text = r#"use { to open. It's {"a": 1}"#;
        let spans: Vec<&str> = balanced_spans(text, CURLY)
            .into_iter()
            .map(|(s, e)| &text[s..=e])
            .collect();
        assert_eq!(spans, vec![r#"{"a": 1}"#]);
    }

    #[test]
    fn many_unclosed_openers_scan_quickly() {
        let text = "{".repeat(200_000);
        let started = std::time::Instant::now();
        assert!(balanced_spans(&text, CURLY).is_empty());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        let text = format!("{} {{\"a\": 1}}", "{ '".repeat(50_000));
        let started = std::time::Instant::now();
        assert_eq!(balanced_spans(&text, CURLY).len(), 1);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn nested_unclosed_openers_keep_inner_groups() {
        let text = r#"{ { {"a": 1} {"b": 2}"#;
        let spans: Vec<&str> = balanced_spans(text, CURLY)
            .into_iter()
            .map(|(s, e)| &text[s..=e])
            .collect();
        assert_eq!(spans, vec![r#"{"a": 1}"#, r#"{"b": 2}"#]);
    }

    #[test]
    fn spans_handle_multibyte_text() {
        let text = "前言 {\"标题\": \"值\"} 结束";
        let spans = balanced_spans(text, CURLY);
        assert_eq!(spans.len(), 1);
        let (s, e) = spans[0];
        assert_eq!(&text[s..=e], "{\"标题\": \"值\"}");
    }
}

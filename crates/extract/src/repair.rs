//! Lenient parsing of almost-JSON object text.

use regex_lite::Regex;
use serde_json::{Map, Value};
use sieve_core::literal::parse_literal;
use std::borrow::Cow;
use std::sync::OnceLock;

/// Parse `text` as an object: strict JSON, then JSON with raw control
/// characters escaped inside strings, then the permissive literal grammar.
pub fn parse_object(text: &str) -> Option<Map<String, Value>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let value = serde_json::from_str::<Value>(text)
        .ok()
        .or_else(|| match escape_control_chars(text) {
            Cow::Owned(repaired) => serde_json::from_str(&repaired).ok(),
            Cow::Borrowed(_) => None,
        })
        .or_else(|| parse_literal(text))?;

    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Escape raw control characters that appear inside double-quoted strings.
///
/// Models often put literal newlines into long string values, which strict
/// JSON rejects. Whitespace between tokens is left alone.
pub fn escape_control_chars(text: &str) -> Cow<'_, str> {
    if !text.chars().any(char::is_control) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            } else if c.is_control() {
                match c {
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    other => out.push_str(&format!("\\u{:04x}", other as u32)),
                }
                continue;
            }
        } else if c == '"' {
            in_string = true;
        }
        out.push(c);
    }

    Cow::Owned(out)
}

fn reasoning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<think(?:ing)?>.*?</think(?:ing)?>").expect("reasoning regex must compile")
    })
}

/// Remove `<think>…</think>` and `<thinking>…</thinking>` blocks.
pub fn strip_reasoning(text: &str) -> Cow<'_, str> {
    reasoning_re().replace_all(text, "")
}

/// Decode JSON-style backslash escapes, keeping unknown ones verbatim.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(q @ ('"' | '\'' | '\\' | '/')) => out.push(q),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// The first `max_chars` characters of `text`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

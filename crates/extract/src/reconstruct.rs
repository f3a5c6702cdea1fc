//! Field-by-field reconstruction when no object parses.
//!
//! Known keys are located individually in the raw text, and only as quoted
//! object keys (`"key":` or `'key':`). The body field is read up to the
//! first quote that plausibly ends it, or to the end of the text when the
//! output was cut off mid-string. A record is only produced when the body
//! or a string field was found; numbers and flags alone are not enough.

use crate::repair::unescape;
use crate::strategy::{ExtractContext, ExtractionStrategy};
use regex_lite::Regex;
use serde_json::{Map, Value};
use sieve_config::ReconstructionConfig;
use tracing::warn;

/// One known key and its compiled pattern.
struct KeyPattern {
    key: String,
    re: Regex,
}

impl KeyPattern {
    /// `value` is the regex for what follows `"key":`.
    fn compile(key: &str, value: &str) -> Option<Self> {
        let quoted = regex_lite::escape(key);
        match Regex::new(&format!(r#"(?s)["']{quoted}["']\s*[:=]\s*{value}"#)) {
            Ok(re) => Some(Self {
                key: key.to_string(),
                re,
            }),
            Err(e) => {
                warn!(key, error = %e, "Skipping reconstruction key");
                None
            }
        }
    }

    fn all(keys: &[String], value: &str) -> Vec<Self> {
        keys.iter()
            .filter_map(|key| Self::compile(key, value))
            .collect()
    }
}

const STRING_VALUE: &str = r#"(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')"#;
const INTEGER_VALUE: &str = r#"["']?(-?\d+)"#;
const BOOL_VALUE: &str = r#"["']?(true|false|True|False)\b"#;
const BODY_OPENER: &str = r#"(["'])"#;

pub struct FieldReconstruction {
    strings: Vec<KeyPattern>,
    integers: Vec<KeyPattern>,
    counts: Vec<KeyPattern>,
    bools: Vec<KeyPattern>,
    body: Option<KeyPattern>,
}

impl FieldReconstruction {
    pub fn new(config: &ReconstructionConfig) -> Self {
        Self {
            strings: KeyPattern::all(&config.string_fields, STRING_VALUE),
            integers: KeyPattern::all(&config.integer_fields, INTEGER_VALUE),
            counts: KeyPattern::all(&config.count_fields, INTEGER_VALUE),
            bools: KeyPattern::all(&config.bool_fields, BOOL_VALUE),
            body: KeyPattern::compile(&config.body_field, BODY_OPENER),
        }
    }
}

impl ExtractionStrategy for FieldReconstruction {
    fn name(&self) -> &'static str {
        "field_reconstruction"
    }

    fn try_extract(&self, text: &str, _cx: &ExtractContext<'_>) -> Option<Map<String, Value>> {
        let mut fields = Map::new();

        for p in &self.strings {
            if let Some(value) = string_field(text, &p.re) {
                fields.insert(p.key.clone(), Value::String(value));
            }
        }

        let body = self.body.as_ref().and_then(|p| {
            let body = body_field(text, &p.re)?;
            Some((p.key.clone(), body))
        });
        if fields.is_empty() && body.is_none() {
            return None;
        }

        for p in &self.integers {
            if let Some(n) = integer_field(text, &p.re) {
                fields.insert(p.key.clone(), Value::from(n));
            }
        }

        let body_chars = body.as_ref().map_or(0, |(_, b)| b.chars().count());
        if let Some((key, body)) = body {
            fields.insert(key, Value::String(body));
        }

        for p in &self.counts {
            let n = integer_field(text, &p.re).unwrap_or(body_chars as i64);
            fields.insert(p.key.clone(), Value::from(n));
        }

        for p in &self.bools {
            let flag = bool_field(text, &p.re).unwrap_or(false);
            fields.insert(p.key.clone(), Value::Bool(flag));
        }

        Some(fields)
    }
}

fn string_field(text: &str, re: &Regex) -> Option<String> {
    let caps = re.captures(text)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    Some(unescape(raw))
}

fn integer_field(text: &str, re: &Regex) -> Option<i64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn bool_field(text: &str, re: &Regex) -> Option<bool> {
    let word = re.captures(text)?.get(1)?.as_str();
    Some(word.eq_ignore_ascii_case("true"))
}

/// The body string, tolerating unescaped quotes and truncation.
fn body_field(text: &str, re: &Regex) -> Option<String> {
    let caps = re.captures(text)?;
    let opener = caps.get(1)?;
    let quote = if opener.as_str() == "'" { '\'' } else { '"' };
    let rest = &text[opener.end()..];

    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == quote && ends_value(&rest[i + 1..]) {
            return Some(unescape(&rest[..i]));
        }
    }

    // Cut off mid-string
    let tail = rest.trim_end_matches(|c: char| {
        c.is_whitespace() || c == quote || matches!(c, '}' | ']' | ',')
    });
    (!tail.is_empty()).then(|| unescape(tail))
}

/// Whether a closing quote is followed by the end of the value: end of
/// text, a closing brace, or a comma leading into another key.
fn ends_value(after: &str) -> bool {
    let after = after.trim_start();
    match after.strip_prefix(',') {
        Some(next) => {
            let next = next.trim_start();
            next.is_empty() || next.starts_with(['"', '\'', '}'])
        }
        None => after.is_empty() || after.starts_with(['}', ']']),
    }
}

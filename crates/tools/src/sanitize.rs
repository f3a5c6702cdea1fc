//! Parameter sanitizer: turns a directive's raw body into typed parameters.
//!
//! Models write parameters as JSON, as Python-style literals, or as loose
//! `key=value` prose. Parsing is attempted in that order; the first shape
//! that yields an object wins. String values are then normalized and a few
//! key-driven coercions applied. Nothing here fails: when no shape parses
//! the result is an empty map and the tool reports the gap itself.

use serde_json::Value;
use sieve_config::SanitizerConfig;
use sieve_core::directive::ParameterMap;
use sieve_core::literal::parse_literal;
use sieve_core::scan::{Brackets, SQUARE, find_balanced_close};
use tracing::debug;

const PARENS: Brackets = Brackets {
    open: '(',
    close: ')',
};

/// Normalizes raw directive parameters according to a [`SanitizerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ParameterSanitizer {
    config: SanitizerConfig,
}

impl ParameterSanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    /// Parse and normalize `raw`. Returns an empty map on total failure.
    pub fn sanitize(&self, raw: &str) -> ParameterMap {
        let Some(parsed) = parse_parameters(raw) else {
            if !raw.trim().is_empty() {
                debug!(raw, "Unparseable directive parameters, dispatching with none");
            }
            return ParameterMap::new();
        };

        parsed
            .into_iter()
            .map(|(key, value)| {
                let value = self.normalize_field(&key, value);
                (key, value)
            })
            .collect()
    }

    fn normalize_field(&self, key: &str, value: Value) -> Value {
        let Value::String(text) = value else {
            return value;
        };
        let (text, repaired) = normalize_string(&text);

        if self.config.is_id_key(key) {
            if let Some(id) = parse_digits(&text) {
                return id;
            }
        }

        if self.config.is_list_key(key) {
            return coerce_sequence(&text);
        }

        if repaired {
            if let Some(seq @ Value::Array(_)) = parse_structured(&text) {
                return seq;
            }
        }

        Value::String(text)
    }
}

/// Strict JSON, then a permissive literal, then `key=value` prose.
fn parse_parameters(raw: &str) -> Option<ParameterMap> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(Value::Object(map)) = parse_structured(raw) {
        return Some(map);
    }

    parse_prose(raw)
}

fn parse_structured(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok().or_else(|| parse_literal(text))
}

/// `query=rust, limit: 3` style parameters.
///
/// Pairs are separated by commas or newlines at the top level. A piece with
/// no separator continues the previous value, so `q=tea, coffee` keeps its
/// comma.
fn parse_prose(raw: &str) -> Option<ParameterMap> {
    let mut pairs: Vec<(String, String)> = Vec::new();

    for piece in split_top_level(raw, &[',', '\n']) {
        let trimmed = piece.trim();
        if trimmed.is_empty() {
            continue;
        }
        match split_key_value(trimmed) {
            Some((key, value)) => pairs.push((key, value)),
            None => {
                let (_, last) = pairs.last_mut()?;
                last.push(',');
                last.push_str(piece);
            }
        }
    }

    if pairs.is_empty() {
        return None;
    }

    Some(
        pairs
            .into_iter()
            .map(|(key, value)| {
                let value = value.trim();
                let typed = parse_literal(value).unwrap_or_else(|| Value::String(value.into()));
                (key, typed)
            })
            .collect(),
    )
}

fn split_key_value(piece: &str) -> Option<(String, String)> {
    let at = top_level_positions(piece)
        .find(|&(_, c)| c == '=' || c == ':')
        .map(|(i, _)| i)?;
    let key = strip_quotes(piece[..at].trim());
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    valid.then(|| (key.to_string(), piece[at + 1..].to_string()))
}

fn split_top_level<'a>(text: &'a str, separators: &[char]) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, c) in top_level_positions(text) {
        if separators.contains(&c) {
            pieces.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    pieces.push(&text[start..]);
    pieces
}

/// Characters outside quotes and brackets, with their byte offsets.
fn top_level_positions(text: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    text.char_indices().filter(move |&(_, c)| {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            return false;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth = depth.saturating_sub(1),
            _ => return depth == 0,
        }
        false
    })
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(is_quote)
}

/// Trim, drop stray quotes, unwrap one matching quote pair, and close an
/// unterminated list or tuple. The flag reports whether a closer was added.
fn normalize_string(value: &str) -> (String, bool) {
    let mut s = value.trim();

    if let Some(q) = s.chars().next().filter(|c| is_quote(*c)) {
        if s.matches(q).count() == 1 {
            s = &s[1..];
        }
    }
    if let Some(q) = s.chars().last().filter(|c| is_quote(*c)) {
        if s.matches(q).count() == 1 {
            s = &s[..s.len() - 1];
        }
    }
    if s.len() >= 2 {
        if let Some(q) = s.chars().next().filter(|c| is_quote(*c)) {
            if s.ends_with(q) {
                s = &s[1..s.len() - 1];
            }
        }
    }

    let mut out = s.trim().to_string();
    let closer = match out.chars().next() {
        Some('[') if find_balanced_close(&out, 1, SQUARE, 1).is_none() => Some(']'),
        Some('(') if find_balanced_close(&out, 1, PARENS, 1).is_none() => Some(')'),
        _ => None,
    };
    if let Some(c) = closer {
        out.push(c);
    }
    (out, closer.is_some())
}

fn parse_digits(text: &str) -> Option<Value> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u64>().ok().map(Value::from)
}

/// Structured parse, then a plain comma split.
fn coerce_sequence(text: &str) -> Value {
    if let Some(seq @ Value::Array(_)) = parse_structured(text) {
        return seq;
    }

    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .or_else(|| text.strip_prefix('(').and_then(|t| t.strip_suffix(')')))
        .unwrap_or(text);

    Value::Array(
        inner
            .split(',')
            .map(|item| strip_quotes(item.trim()).trim())
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.into()))
            .collect(),
    )
}

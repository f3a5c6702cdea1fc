//! Permissive literal parser.
//!
//! Models frequently answer with something that is *almost* JSON: single
//! quoted strings, `True`/`False`/`None`, tuples, trailing commas, bare
//! object keys. This recursive-descent parser accepts that superset and
//! produces a `serde_json::Value`. The entire input must be consumed, and
//! containers may nest at most [`MAX_DEPTH`] levels deep.
//!
//! ```text
//! value  = object | array | tuple | string | number | keyword
//! object = "{" [ key ":" value ("," key ":" value)* [","] ] "}"
//! array  = "[" [ value ("," value)* [","] ] "]"
//! tuple  = "(" [ value ("," value)* [","] ] ")"
//! key    = string | number | IDENT
//! ```

use serde_json::{Map, Number, Value};

/// Container nesting limit, the same as serde_json's recursion limit.
pub const MAX_DEPTH: usize = 128;

/// Parse a permissive literal. Returns `None` unless the whole input is one value.
pub fn parse_literal(input: &str) -> Option<Value> {
    let chars: Vec<char> = input.chars().collect();
    let mut parser = LiteralParser {
        chars: &chars,
        pos: 0,
        depth: 0,
    };
    let value = parser.parse_value().ok()?;
    parser.skip_ws();
    if parser.pos == chars.len() {
        Some(value)
    } else {
        None
    }
}

struct LiteralParser<'a> {
    chars: &'a [char],
    pos: usize,
    depth: usize,
}

type ParseResult<T> = Result<T, String>;

impl<'a> LiteralParser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> ParseResult<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(format!("expected '{expected}', found '{c}'")),
            None => Err(format!("expected '{expected}', found end of input")),
        }
    }

    fn parse_value(&mut self) -> ParseResult<Value> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.nested(Self::parse_object),
            Some('[') => self.nested(|p| p.parse_sequence('[', ']')),
            Some('(') => self.nested(|p| p.parse_sequence('(', ')')),
            Some(q @ ('"' | '\'')) => self.parse_string(q).map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => {
                self.parse_number()
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let word = self.parse_ident();
                match word.as_str() {
                    "true" | "True" => Ok(Value::Bool(true)),
                    "false" | "False" => Ok(Value::Bool(false)),
                    "null" | "None" => Ok(Value::Null),
                    other => Err(format!("unexpected identifier '{other}'")),
                }
            }
            Some(c) => Err(format!("unexpected character '{c}'")),
            None => Err("unexpected end of input".into()),
        }
    }

    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> ParseResult<Value>,
    ) -> ParseResult<Value> {
        if self.depth >= MAX_DEPTH {
            return Err("nesting too deep".into());
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_object(&mut self) -> ParseResult<Value> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = match self.peek() {
                Some(q @ ('"' | '\'')) => self.parse_string(q)?,
                Some(c) if c.is_alphanumeric() || c == '_' || c == '-' => {
                    let key = self.parse_ident();
                    if key.is_empty() {
                        return Err("empty object key".into());
                    }
                    key
                }
                Some(c) => return Err(format!("unexpected character '{c}' in object key")),
                None => return Err("unterminated object".into()),
            };

            self.skip_ws();
            self.expect(':')?;
            let value = self.parse_value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                Some(c) => return Err(format!("expected ',' or '}}', found '{c}'")),
                None => return Err("unterminated object".into()),
            }
        }
    }

    fn parse_sequence(&mut self, open: char, close: char) -> ParseResult<Value> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }

            items.push(self.parse_value()?);

            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(Value::Array(items)),
                Some(c) => return Err(format!("expected ',' or '{close}', found '{c}'")),
                None => return Err("unterminated sequence".into()),
            }
        }
    }

    fn parse_string(&mut self, quote: char) -> ParseResult<String> {
        self.expect(quote)?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string".into()),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('u') => out.push(self.parse_unicode_escape()?),
                    Some(c) => out.push(c),
                    None => return Err("unterminated escape".into()),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> ParseResult<char> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| "invalid unicode escape".to_string())?;
            code = code * 16 + digit;
        }
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn parse_number(&mut self) -> ParseResult<Value> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.pos += 1;
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '_'))
        {
            // Exponent sign
            if matches!(self.peek(), Some('e' | 'E'))
                && matches!(self.chars.get(self.pos + 1), Some('-' | '+'))
            {
                self.pos += 1;
            }
            self.pos += 1;
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let text = text.strip_prefix('+').unwrap_or(&text);

        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("invalid number '{text}'"))
    }

    fn parse_ident(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

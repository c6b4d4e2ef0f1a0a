//! Tolerant decoding for warehouse columns that hold serialized structures.
//!
//! Upstream producers write these fields inconsistently: strict JSON,
//! JSON with single quotes, or Python literal reprs (`True`, `None`,
//! single-quoted strings). Decoding tries each shape in turn and gives up
//! cleanly, leaving the caller to keep the raw value.

use serde_json::{Map, Number, Value};

/// Decode a string that should contain a structured value.
///
/// Strategies, in order:
/// 1. strict JSON;
/// 2. strict JSON after rewriting single-quoted strings to double-quoted;
/// 3. a Python-literal parse, attempted only when the text starts with
///    `{` or `[`.
///
/// `None` means every strategy failed and the raw string should be kept.
pub fn relaxed_json_parse(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }

    if let Some(normalized) = normalize_single_quotes(raw) {
        if let Ok(value) = serde_json::from_str(&normalized) {
            return Some(value);
        }
    }

    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return parse_python_literal(raw);
    }

    None
}

/// Rewrite single-quoted string literals to double-quoted JSON strings,
/// escaping any double quotes they contain. Returns `None` when the text
/// has no single quotes to rewrite.
fn normalize_single_quotes(raw: &str) -> Option<String> {
    if !raw.contains('\'') {
        return None;
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '\'' if !in_double => {
                in_single = !in_single;
                out.push('"');
            }
            '"' if in_single => {
                out.push_str("\\\"");
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    Some(out)
}

/// Recursive-descent parse of the Python literal subset these columns
/// actually contain: dicts, lists, strings, numbers, True/False/None.
fn parse_python_literal(raw: &str) -> Option<Value> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parser = LiteralParser { chars, pos: 0 };
    let value = parser.parse_value()?;
    parser.skip_whitespace();
    if parser.pos == parser.chars.len() {
        Some(value)
    } else {
        None
    }
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> Option<()> {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        let end = self.pos + word.len();
        if end <= self.chars.len() && self.chars[self.pos..end].iter().collect::<String>() == word {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn parse_value(&mut self) -> Option<Value> {
        self.skip_whitespace();
        match self.peek()? {
            '{' => self.parse_dict(),
            '[' => self.parse_list(),
            '\'' | '"' => self.parse_string().map(Value::String),
            '-' | '0'..='9' => self.parse_number(),
            'T' if self.eat_word("True") => Some(Value::Bool(true)),
            'F' if self.eat_word("False") => Some(Value::Bool(false)),
            'N' if self.eat_word("None") => Some(Value::Null),
            _ => None,
        }
    }

    fn parse_dict(&mut self) -> Option<Value> {
        self.eat('{')?;
        let mut map = Map::new();
        self.skip_whitespace();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Some(Value::Object(map));
        }
        loop {
            self.skip_whitespace();
            let key = self.parse_string()?;
            self.eat(':')?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.bump()? {
                ',' => {
                    // Tolerate a trailing comma before the closing brace.
                    self.skip_whitespace();
                    if self.peek() == Some('}') {
                        self.pos += 1;
                        return Some(Value::Object(map));
                    }
                }
                '}' => return Some(Value::Object(map)),
                _ => return None,
            }
        }
    }

    fn parse_list(&mut self) -> Option<Value> {
        self.eat('[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(']') {
            self.pos += 1;
            return Some(Value::Array(items));
        }
        loop {
            let value = self.parse_value()?;
            items.push(value);
            self.skip_whitespace();
            match self.bump()? {
                ',' => {
                    self.skip_whitespace();
                    if self.peek() == Some(']') {
                        self.pos += 1;
                        return Some(Value::Array(items));
                    }
                }
                ']' => return Some(Value::Array(items)),
                _ => return None,
            }
        }
    }

    fn parse_string(&mut self) -> Option<String> {
        self.skip_whitespace();
        let delim = self.bump()?;
        if delim != '\'' && delim != '"' {
            return None;
        }
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == delim => return Some(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    'u' => {
                        let mut code = String::new();
                        for _ in 0..4 {
                            code.push(self.bump()?);
                        }
                        let n = u32::from_str_radix(&code, 16).ok()?;
                        out.push(char::from_u32(n)?);
                    }
                    'x' => {
                        let mut code = String::new();
                        for _ in 0..2 {
                            code.push(self.bump()?);
                        }
                        let n = u32::from_str_radix(&code, 16).ok()?;
                        out.push(char::from_u32(n)?);
                    }
                    escaped => out.push(escaped),
                },
                c => out.push(c),
            }
        }
    }

    fn parse_number(&mut self) -> Option<Value> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => self.pos += 1,
                '.' | 'e' | 'E' | '+' | '-' if self.pos > start => {
                    is_float = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            let f = text.parse::<f64>().ok()?;
            Number::from_f64(f).map(Value::Number)
        } else {
            text.parse::<i64>().ok().map(Value::from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_json_parses_first() {
        assert_eq!(relaxed_json_parse(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(relaxed_json_parse("[1, 2, 3]"), Some(json!([1, 2, 3])));
        assert_eq!(relaxed_json_parse("\"plain\""), Some(json!("plain")));
    }

    #[test]
    fn single_quoted_json_is_normalized() {
        assert_eq!(
            relaxed_json_parse("{'path': 's3://b/k.jpg', 'n': 2}"),
            Some(json!({"path": "s3://b/k.jpg", "n": 2}))
        );
    }

    #[test]
    fn python_literals_decode() {
        assert_eq!(
            relaxed_json_parse("{'ok': True, 'missing': None, 'vals': [1, 2.5, False]}"),
            Some(json!({"ok": true, "missing": null, "vals": [1, 2.5, false]}))
        );
    }

    #[test]
    fn mixed_quotes_fall_through_to_literal_parse() {
        // Naive quote replacement breaks on the embedded apostrophe; the
        // literal parser handles it.
        assert_eq!(
            relaxed_json_parse(r#"{'note': "it's fine"}"#),
            Some(json!({"note": "it's fine"}))
        );
    }

    #[test]
    fn nested_structures() {
        assert_eq!(
            relaxed_json_parse("{'outer': {'inner': ['a', 'b']}}"),
            Some(json!({"outer": {"inner": ["a", "b"]}}))
        );
    }

    #[test]
    fn escapes_in_literal_strings() {
        assert_eq!(
            relaxed_json_parse(r"{'s': 'line\none\ttab'}"),
            Some(json!({"s": "line\none\ttab"}))
        );
    }

    #[test]
    fn unparseable_input_returns_none() {
        assert_eq!(relaxed_json_parse("not structured at all"), None);
        assert_eq!(relaxed_json_parse("{broken"), None);
        assert_eq!(relaxed_json_parse("[1, 2,,]"), None);
    }

    #[test]
    fn trailing_garbage_rejected() {
        assert_eq!(relaxed_json_parse("{'a': 1} extra"), None);
    }
}

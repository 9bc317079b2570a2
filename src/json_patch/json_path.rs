use std::cmp::Ordering;

use serde_json::Value;

use super::error::PatchError;
use super::pointer::{parse_index, JsonPointer};

/// A compiled JSONPath selector.
///
/// Supported syntax: `$`, `.name`, `['name']`, `[n]` (negative counts from the end),
/// `*`, `..` recursive descent and `[?(@.field op literal)]` filters with
/// `==`, `!=`, `<`, `<=`, `>`, `>=` or bare `[?(@.field)]` existence checks.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Child(String),
    Wildcard,
    Index(i64),
    Filter(FilterExpr),
    Descendants(Box<Segment>),
}

#[derive(Debug, Clone, PartialEq)]
struct FilterExpr {
    path: Vec<String>,
    test: Option<(Comparator, Value)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl JsonPath {
    pub fn is_json_path(path: &str) -> bool {
        path.starts_with('$')
    }

    pub fn parse(expr: &str) -> Result<Self, PatchError> {
        Parser::new(expr).parse()
    }

    /// Concrete pointers to every node the selector matches, in document order
    pub fn select(&self, doc: &Value) -> Vec<JsonPointer> {
        let mut current: Vec<(Vec<String>, &Value)> = vec![(vec![], doc)];
        for segment in &self.segments {
            let mut next = Vec::new();
            for (path, value) in current {
                apply_segment(segment, path, value, &mut next);
            }
            current = next;
        }
        current
            .into_iter()
            .map(|(path, _)| JsonPointer::from_tokens(path))
            .collect()
    }
}

fn apply_segment<'a>(
    segment: &Segment,
    path: Vec<String>,
    value: &'a Value,
    out: &mut Vec<(Vec<String>, &'a Value)>,
) {
    match segment {
        Segment::Child(name) => match value {
            Value::Object(map) => {
                if let Some(child) = map.get(name) {
                    out.push((extend(&path, name.clone()), child));
                }
            }
            Value::Array(items) => {
                if let Some(child) = parse_index(name).and_then(|i| items.get(i)) {
                    out.push((extend(&path, name.clone()), child));
                }
            }
            _ => {}
        },
        Segment::Wildcard => for_each_child(&path, value, |p, v| out.push((p, v))),
        Segment::Index(index) => {
            if let Value::Array(items) = value {
                let resolved = if *index < 0 {
                    items.len() as i64 + index
                } else {
                    *index
                };
                if resolved >= 0 {
                    if let Some(child) = items.get(resolved as usize) {
                        out.push((extend(&path, resolved.to_string()), child));
                    }
                }
            }
        }
        Segment::Filter(filter) => for_each_child(&path, value, |p, v| {
            if filter.matches(v) {
                out.push((p, v));
            }
        }),
        Segment::Descendants(inner) => {
            let mut nodes = Vec::new();
            collect_descendants(path, value, &mut nodes);
            for (p, v) in nodes {
                apply_segment(inner, p, v, out);
            }
        }
    }
}

fn for_each_child<'a>(path: &[String], value: &'a Value, mut f: impl FnMut(Vec<String>, &'a Value)) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                f(extend(path, key.clone()), child);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                f(extend(path, i.to_string()), child);
            }
        }
        _ => {}
    }
}

fn collect_descendants<'a>(path: Vec<String>, value: &'a Value, out: &mut Vec<(Vec<String>, &'a Value)>) {
    out.push((path.clone(), value));
    for_each_child(&path, value, |p, v| collect_descendants(p, v, out));
}

fn extend(path: &[String], token: String) -> Vec<String> {
    let mut next = path.to_vec();
    next.push(token);
    next
}

impl FilterExpr {
    fn matches(&self, candidate: &Value) -> bool {
        let mut target = Some(candidate);
        for key in &self.path {
            target = target.and_then(|v| match v {
                Value::Object(map) => map.get(key),
                Value::Array(items) => parse_index(key).and_then(|i| items.get(i)),
                _ => None,
            });
        }

        match (&self.test, target) {
            (None, target) => target.is_some_and(|v| !v.is_null()),
            (Some((Comparator::Ne, _)), None) => true,
            (Some(_), None) => false,
            (Some((cmp, literal)), Some(actual)) => match cmp {
                Comparator::Eq => values_equal(actual, literal),
                Comparator::Ne => !values_equal(actual, literal),
                Comparator::Lt => compare(actual, literal) == Some(Ordering::Less),
                Comparator::Le => matches!(compare(actual, literal), Some(Ordering::Less | Ordering::Equal)),
                Comparator::Gt => compare(actual, literal) == Some(Ordering::Greater),
                Comparator::Ge => matches!(compare(actual, literal), Some(Ordering::Greater | Ordering::Equal)),
            },
        }
    }
}

/// Structural equality that treats `1` and `1.0` as the same number
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<JsonPath, PatchError> {
        if !self.eat('$') {
            return Err(self.error());
        }

        let mut segments = Vec::new();
        while !self.done() {
            if self.eat_str("..") {
                let inner = if self.peek() == Some('[') {
                    self.parse_bracket()?
                } else if self.eat('*') {
                    Segment::Wildcard
                } else {
                    Segment::Child(self.parse_name()?)
                };
                segments.push(Segment::Descendants(Box::new(inner)));
            } else if self.eat('.') {
                if self.eat('*') {
                    segments.push(Segment::Wildcard);
                } else {
                    segments.push(Segment::Child(self.parse_name()?));
                }
            } else if self.peek() == Some('[') {
                segments.push(self.parse_bracket()?);
            } else {
                return Err(self.error());
            }
        }

        Ok(JsonPath { segments })
    }

    fn parse_bracket(&mut self) -> Result<Segment, PatchError> {
        self.expect('[')?;
        self.skip_ws();
        let segment = if self.eat('*') {
            Segment::Wildcard
        } else if matches!(self.peek(), Some('\'') | Some('"')) {
            Segment::Child(self.parse_quoted()?)
        } else if self.eat('?') {
            self.expect('(')?;
            let filter = self.parse_filter()?;
            self.skip_ws();
            self.expect(')')?;
            Segment::Filter(filter)
        } else {
            let start = self.pos;
            if self.peek() == Some('-') {
                self.pos += 1;
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            Segment::Index(text.parse().map_err(|_| self.error())?)
        };
        self.skip_ws();
        self.expect(']')?;
        Ok(segment)
    }

    fn parse_filter(&mut self) -> Result<FilterExpr, PatchError> {
        self.skip_ws();
        self.expect('@')?;

        let mut path = Vec::new();
        loop {
            if self.eat('.') {
                path.push(self.parse_filter_name()?);
            } else if self.peek() == Some('[') {
                self.expect('[')?;
                path.push(self.parse_quoted()?);
                self.expect(']')?;
            } else {
                break;
            }
        }

        self.skip_ws();
        if self.peek() == Some(')') {
            return Ok(FilterExpr { path, test: None });
        }

        let comparator = if self.eat_str("==") {
            Comparator::Eq
        } else if self.eat_str("!=") {
            Comparator::Ne
        } else if self.eat_str("<=") {
            Comparator::Le
        } else if self.eat_str(">=") {
            Comparator::Ge
        } else if self.eat('<') {
            Comparator::Lt
        } else if self.eat('>') {
            Comparator::Gt
        } else {
            return Err(self.error());
        };

        self.skip_ws();
        let literal = self.parse_literal()?;
        Ok(FilterExpr {
            path,
            test: Some((comparator, literal)),
        })
    }

    fn parse_literal(&mut self) -> Result<Value, PatchError> {
        if matches!(self.peek(), Some('\'') | Some('"')) {
            return Ok(Value::String(self.parse_quoted()?));
        }
        for (word, value) in [("true", Value::Bool(true)), ("false", Value::Bool(false)), ("null", Value::Null)] {
            if self.eat_str(word) {
                return Ok(value);
            }
        }
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        serde_json::from_str::<serde_json::Number>(&text)
            .map(Value::Number)
            .map_err(|_| self.error())
    }

    fn parse_quoted(&mut self) -> Result<String, PatchError> {
        let quote = self.next().ok_or_else(|| self.error())?;
        let mut out = String::new();
        loop {
            match self.next() {
                Some('\\') => match self.next() {
                    Some(c) => out.push(c),
                    None => return Err(self.error()),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error()),
            }
        }
    }

    fn parse_name(&mut self) -> Result<String, PatchError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c != '.' && c != '[') {
            self.pos += 1;
        }
        self.name_from(start)
    }

    fn parse_filter_name(&mut self) -> Result<String, PatchError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && !matches!(c, '.' | '[' | ')' | '=' | '!' | '<' | '>'))
        {
            self.pos += 1;
        }
        self.name_from(start)
    }

    fn name_from(&self, start: usize) -> Result<String, PatchError> {
        if start == self.pos {
            return Err(self.error());
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let len = s.chars().count();
        if self.chars.len() >= self.pos + len && self.chars[self.pos..self.pos + len].iter().copied().eq(s.chars()) {
            self.pos += len;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), PatchError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn done(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self) -> PatchError {
        PatchError::InvalidPath(self.source.to_string())
    }
}

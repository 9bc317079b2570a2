use serde_json::Value;

use super::error::PatchError;

/// A parsed JSON Pointer (RFC 6901).
///
/// Both `""` and `"/"` address the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPointer {
    tokens: Vec<String>,
}

impl JsonPointer {
    pub fn root() -> Self {
        Self { tokens: vec![] }
    }

    pub fn from_tokens(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    pub fn parse(path: &str) -> Result<Self, PatchError> {
        if path.is_empty() || path == "/" {
            return Ok(Self::root());
        }
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| PatchError::InvalidPath(path.to_string()))?;

        let tokens = rest.split('/').map(unescape).collect();
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Split into the parent pointer and the last token
    pub fn split_last(&self) -> Option<(JsonPointer, &str)> {
        let (last, parent) = self.tokens.split_last()?;
        Some((JsonPointer { tokens: parent.to_vec() }, last.as_str()))
    }

    pub fn get<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut current = doc;
        for token in &self.tokens {
            current = match current {
                Value::Object(map) => map.get(token)?,
                Value::Array(items) => items.get(parse_index(token)?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn get_mut<'a>(&self, doc: &'a mut Value) -> Option<&'a mut Value> {
        let mut current = doc;
        for token in &self.tokens {
            current = match current {
                Value::Object(map) => map.get_mut(token)?,
                Value::Array(items) => items.get_mut(parse_index(token)?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl std::fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tokens.is_empty() {
            return write!(f, "/");
        }
        for token in &self.tokens {
            write!(f, "/{}", escape(token))?;
        }
        Ok(())
    }
}

/// Array index token: digits only, no leading zeros
pub fn parse_index(token: &str) -> Option<usize> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}

/// True for tokens that address an array slot (`0`, `12`, `-`)
pub fn is_array_token(token: &str) -> bool {
    token == "-" || parse_index(token).is_some()
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_root_forms() {
        assert!(JsonPointer::parse("").unwrap().is_root());
        assert!(JsonPointer::parse("/").unwrap().is_root());
        assert!(JsonPointer::parse("books").is_err());
    }

    #[test]
    fn resolves_escaped_tokens() {
        let doc = json!({"a/b": {"m~n": 7}});
        let pointer = JsonPointer::parse("/a~1b/m~0n").unwrap();
        assert_eq!(pointer.get(&doc), Some(&json!(7)));
        assert_eq!(pointer.to_string(), "/a~1b/m~0n");
    }

    #[test]
    fn resolves_array_indexes() {
        let doc = json!({"books": [{"title": "A"}, {"title": "B"}]});
        assert_eq!(JsonPointer::parse("/books/1/title").unwrap().get(&doc), Some(&json!("B")));
        assert_eq!(JsonPointer::parse("/books/01/title").unwrap().get(&doc), None);
        assert_eq!(JsonPointer::parse("/books/5").unwrap().get(&doc), None);
    }

    #[test]
    fn array_tokens() {
        assert!(is_array_token("-"));
        assert!(is_array_token("0"));
        assert!(!is_array_token("author"));
    }
}

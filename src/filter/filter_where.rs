use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};

/// Parses search strings such as `type:invite -is_verified:true "acme corp" created_utc:>2024-01-01`
/// and evaluates them against JSON documents. All terms must match.
pub struct FilterWhere;

impl FilterWhere {
    pub fn parse(search: &str) -> Result<Vec<FilterWhereInfo>, FilterError> {
        let mut out = Vec::new();
        for token in Self::tokenize(search)? {
            if let Some(info) = Self::parse_term(&token)? {
                out.push(info);
            }
        }
        Ok(out)
    }

    /// Split on whitespace outside double quotes; quotes are kept
    fn tokenize(search: &str) -> Result<Vec<String>, FilterError> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut quoted = false;

        for c in search.chars() {
            match c {
                '"' => {
                    quoted = !quoted;
                    current.push(c);
                }
                c if c.is_whitespace() && !quoted => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            }
        }
        if quoted {
            return Err(FilterError::UnbalancedQuotes(search.to_string()));
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        Ok(tokens)
    }

    fn parse_term(token: &str) -> Result<Option<FilterWhereInfo>, FilterError> {
        if token.eq_ignore_ascii_case("AND") {
            return Ok(None);
        }

        let (negated, body) = match token.strip_prefix('-') {
            Some(rest) if !rest.is_empty() => (true, rest),
            _ => (false, token),
        };

        // Free text, possibly quoted
        let Some((field, raw)) = Self::split_field(body) else {
            let value = Self::unquote(body);
            if value.is_empty() {
                return Ok(None);
            }
            return Ok(Some(FilterWhereInfo { field: None, operator: FilterOp::Eq, value, negated }));
        };

        Self::validate_field(field)?;

        if field == "_missing_" || field == "_exists_" {
            Self::validate_field(raw)?;
            let operator = if field == "_missing_" { FilterOp::Missing } else { FilterOp::Exists };
            return Ok(Some(FilterWhereInfo {
                field: Some(raw.to_string()),
                operator,
                value: String::new(),
                negated,
            }));
        }

        let (operator, value) = if raw == "*" {
            (FilterOp::Exists, "")
        } else if let Some(v) = raw.strip_prefix(">=") {
            (FilterOp::Gte, v)
        } else if let Some(v) = raw.strip_prefix("<=") {
            (FilterOp::Lte, v)
        } else if let Some(v) = raw.strip_prefix('>') {
            (FilterOp::Gt, v)
        } else if let Some(v) = raw.strip_prefix('<') {
            (FilterOp::Lt, v)
        } else if let Some(v) = raw.strip_prefix("!=") {
            (FilterOp::Neq, v)
        } else {
            (FilterOp::Eq, raw)
        };

        let value = Self::unquote(value);
        if value.is_empty() && operator != FilterOp::Exists {
            return Err(FilterError::InvalidTerm(token.to_string()));
        }

        Ok(Some(FilterWhereInfo {
            field: Some(field.to_string()),
            operator,
            value,
            negated,
        }))
    }

    /// `field:value` unless the colon sits inside quotes
    fn split_field(body: &str) -> Option<(&str, &str)> {
        if body.starts_with('"') {
            return None;
        }
        let (field, value) = body.split_once(':')?;
        if field.is_empty() {
            return None;
        }
        Some((field, value))
    }

    fn unquote(value: &str) -> String {
        value.trim_matches('"').to_string()
    }

    fn validate_field(field: &str) -> Result<(), FilterError> {
        let valid = !field.is_empty()
            && field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' || c == '@');
        if valid {
            Ok(())
        } else {
            Err(FilterError::InvalidField(field.to_string()))
        }
    }

    pub fn matches_all(document: &Value, conditions: &[FilterWhereInfo]) -> bool {
        conditions.iter().all(|c| Self::matches(document, c))
    }

    pub fn matches(document: &Value, condition: &FilterWhereInfo) -> bool {
        let result = match &condition.field {
            None => Self::matches_text(document, &condition.value.to_lowercase()),
            Some(field) => {
                let values = resolve_path(document, field);
                Self::matches_values(&values, condition)
            }
        };
        result != condition.negated
    }

    fn matches_values(values: &[&Value], condition: &FilterWhereInfo) -> bool {
        match condition.operator {
            FilterOp::Exists => values.iter().any(|v| !v.is_null()),
            FilterOp::Missing => values.iter().all(|v| v.is_null()),
            FilterOp::Eq => values.iter().any(|v| scalar_equals(v, &condition.value)),
            FilterOp::Neq => !values.iter().any(|v| scalar_equals(v, &condition.value)),
            op => values.iter().any(|v| compare(v, &condition.value).is_some_and(|o| match op {
                FilterOp::Gt => o.is_gt(),
                FilterOp::Gte => o.is_ge(),
                FilterOp::Lt => o.is_lt(),
                FilterOp::Lte => o.is_le(),
                _ => false,
            })),
        }
    }

    fn matches_text(value: &Value, needle: &str) -> bool {
        match value {
            Value::String(s) => s.to_lowercase().contains(needle),
            Value::Number(n) => n.to_string() == needle,
            Value::Array(items) => items.iter().any(|v| Self::matches_text(v, needle)),
            Value::Object(map) => map
                .iter()
                .filter(|(key, _)| !is_sensitive_key(key))
                .any(|(_, v)| Self::matches_text(v, needle)),
            _ => false,
        }
    }
}

/// Keys never searched by free text
pub fn is_sensitive_key(key: &str) -> bool {
    key == "salt" || key.contains("password") || key.contains("token")
}

/// Values at a dotted path, flattening arrays along the way
pub fn resolve_path<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![document];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(segment) {
                        next.push(v);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(v) = item.get(segment) {
                            next.push(v);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    // Leaf arrays match on their elements
    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn scalar_equals(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => match expected.strip_suffix('*') {
            Some(prefix) => s.to_lowercase().starts_with(&prefix.to_lowercase()),
            None => s.eq_ignore_ascii_case(expected),
        },
        Value::Number(n) => expected
            .parse::<f64>()
            .ok()
            .zip(n.as_f64())
            .is_some_and(|(e, n)| (e - n).abs() < f64::EPSILON),
        Value::Bool(b) => expected.parse::<bool>().is_ok_and(|e| e == *b),
        Value::Null => expected.eq_ignore_ascii_case("null"),
        _ => false,
    }
}

fn compare(value: &Value, expected: &str) -> Option<std::cmp::Ordering> {
    match value {
        Value::Number(n) => n.as_f64()?.partial_cmp(&expected.parse::<f64>().ok()?),
        Value::String(s) => Some(s.as_str().cmp(expected)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_terms() {
        let terms = FilterWhere::parse(r#"type:invite -is_verified:true "acme corp" seats:>=3"#).unwrap();
        assert_eq!(terms.len(), 4);
        assert_eq!(terms[0].field.as_deref(), Some("type"));
        assert!(terms[1].negated);
        assert_eq!(terms[2].field, None);
        assert_eq!(terms[2].value, "acme corp");
        assert_eq!(terms[3].operator, FilterOp::Gte);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(FilterWhere::parse(r#""open quote"#).is_err());
        assert!(FilterWhere::parse("na$me:x").is_err());
        assert!(FilterWhere::parse("name:").is_err());
    }

    #[test]
    fn evaluates_fields_and_text() {
        let doc = json!({
            "name": "Acme Corp",
            "seats": 5,
            "is_verified": false,
            "memberships": [{"organization_id": "o1", "roles": ["client", "user"]}],
            "password": "secret-hash"
        });

        let check = |q: &str| FilterWhere::matches_all(&doc, &FilterWhere::parse(q).unwrap());
        assert!(check("name:\"acme corp\""));
        assert!(check("name:acme*"));
        assert!(check("seats:>4 seats:<=5"));
        assert!(check("memberships.organization_id:o1"));
        assert!(check("memberships.roles:user"));
        assert!(check("-memberships.roles:admin"));
        assert!(check("is_verified:false"));
        assert!(check("acme"));
        assert!(check("_missing_:deleted_utc"));
        assert!(check("seats:*"));
        assert!(!check("secret"));
        assert!(!check("name:other"));
    }
}

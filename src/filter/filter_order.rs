use serde_json::Value;
use std::cmp::Ordering;

use super::error::FilterError;
use super::filter_where::resolve_path;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Accepts comma separated `field`, `-field`, `field asc` and `field desc`
    pub fn parse(order: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in order.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            let Some(col) = it.next() else { continue };
            let (field, mut sort) = match col.strip_prefix('-') {
                Some(rest) => (rest, SortDirection::Desc),
                None => (col, SortDirection::Asc),
            };
            if let Some(dir) = it.next() {
                sort = if dir.eq_ignore_ascii_case("desc") { SortDirection::Desc } else { SortDirection::Asc };
            }
            if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                return Err(FilterError::InvalidField(field.to_string()));
            }
            out.push(FilterOrderInfo { field: field.to_string(), sort });
        }
        Ok(out)
    }

    pub fn compare(a: &Value, b: &Value, infos: &[FilterOrderInfo]) -> Ordering {
        for info in infos {
            let left = resolve_path(a, &info.field).into_iter().next();
            let right = resolve_path(b, &info.field).into_iter().next();
            let ordering = compare_values(left, right);
            let ordering = match info.sort {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    pub fn sort(documents: &mut [Value], infos: &[FilterOrderInfo]) {
        if infos.is_empty() {
            return;
        }
        documents.sort_by(|a, b| Self::compare(a, b, infos));
    }
}

/// Missing values sort first
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (x, y) => x.to_string().cmp(&y.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_directions() {
        let infos = FilterOrder::parse("-created_utc, name asc,full_name desc").unwrap();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].sort, SortDirection::Desc);
        assert_eq!(infos[1].field, "name");
        assert_eq!(infos[2].sort, SortDirection::Desc);
        assert!(FilterOrder::parse("na;me").is_err());
    }

    #[test]
    fn sorts_documents() {
        let mut docs = vec![
            json!({"name": "beta", "seats": 2}),
            json!({"name": "Alpha", "seats": 2}),
            json!({"name": "gamma", "seats": 1}),
        ];
        FilterOrder::sort(&mut docs, &FilterOrder::parse("-seats,name").unwrap());
        let names: Vec<_> = docs.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Alpha", "beta", "gamma"]);
    }
}

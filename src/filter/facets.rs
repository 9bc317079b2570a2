use serde_json::Value;
use std::collections::HashMap;

use super::error::FilterError;
use super::filter_where::resolve_path;
use super::types::{FacetTerm, Facets};

/// Terms reported per facet field
pub const MAX_FACET_TERMS: usize = 25;

/// `facet=type,roles` style field lists
pub fn parse_facets(spec: &str) -> Result<Vec<String>, FilterError> {
    let mut fields = Vec::new();
    for field in spec.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            return Err(FilterError::InvalidField(field.to_string()));
        }
        fields.push(field.to_string());
    }
    Ok(fields)
}

/// Term counts over every matching document, most common first
pub fn compute_facets(documents: &[Value], fields: &[String]) -> Facets {
    let mut facets = Facets::new();
    for field in fields {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for document in documents {
            for value in resolve_path(document, field) {
                let term = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                *counts.entry(term).or_default() += 1;
            }
        }

        let mut terms: Vec<FacetTerm> = counts
            .into_iter()
            .map(|(term, total)| FacetTerm { term, total })
            .collect();
        terms.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.term.cmp(&b.term)));
        terms.truncate(MAX_FACET_TERMS);
        facets.insert(field.clone(), terms);
    }
    facets
}

use serde_json::Value;

use super::error::FilterError;
use super::facets::compute_facets;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo, FilterResult, FilterWhereInfo};

/// Hard ceiling on page size
pub const MAX_LIMIT: u32 = 1000;

/// Applies search terms, ordering, facets and paging to the documents a store returned
pub struct Filter {
    collection: String,
    conditions: Vec<FilterWhereInfo>,
    order_data: Vec<FilterOrderInfo>,
    facets: Vec<String>,
    page: u32,
    limit: Option<u32>,
}

impl Filter {
    pub fn new(collection: impl Into<String>) -> Result<Self, FilterError> {
        let collection = collection.into();
        Self::validate_collection(&collection)?;
        Ok(Self {
            collection,
            conditions: vec![],
            order_data: vec![],
            facets: vec![],
            page: 1,
            limit: None,
        })
    }

    pub fn assign(&mut self, data: &FilterData) -> Result<&mut Self, FilterError> {
        if let Some(filter) = &data.filter {
            self.where_clause(filter)?;
        }
        if let Some(query) = &data.query {
            self.where_clause(query)?;
        }
        if let Some(sort) = &data.sort {
            self.order(sort)?;
        }
        if let Some(limit) = data.limit {
            self.limit(limit, data.page.unwrap_or(1))?;
        }
        self.facets = data.facets.clone();
        Ok(self)
    }

    /// Terms are ANDed with any already assigned
    pub fn where_clause(&mut self, search: &str) -> Result<&mut Self, FilterError> {
        self.conditions.extend(FilterWhere::parse(search)?);
        Ok(self)
    }

    pub fn order(&mut self, order_spec: &str) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::parse(order_spec)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: u32, page: u32) -> Result<&mut Self, FilterError> {
        if limit == 0 {
            return Err(FilterError::InvalidLimit("Limit must be positive".to_string()));
        }
        let applied_limit = if limit > MAX_LIMIT {
            tracing::warn!("Limit {} exceeds max {}, capping to max", limit, MAX_LIMIT);
            MAX_LIMIT
        } else {
            limit
        };
        self.limit = Some(applied_limit);
        self.page = page.max(1);
        Ok(self)
    }

    pub fn matches(&self, document: &Value) -> bool {
        FilterWhere::matches_all(document, &self.conditions)
    }

    pub fn apply(&self, documents: Vec<Value>) -> FilterResult {
        let mut matched: Vec<Value> = documents.into_iter().filter(|d| self.matches(d)).collect();
        FilterOrder::sort(&mut matched, &self.order_data);

        let total = matched.len() as u64;
        let facets = compute_facets(&matched, &self.facets);

        let documents = match self.limit {
            Some(limit) => {
                let skip = (self.page as usize - 1).saturating_mul(limit as usize);
                matched.into_iter().skip(skip).take(limit as usize).collect()
            }
            None => matched,
        };

        tracing::trace!(
            collection = %self.collection,
            total,
            returned = documents.len(),
            "Filter applied"
        );

        FilterResult { documents, total, facets }
    }

    fn validate_collection(name: &str) -> Result<(), FilterError> {
        let mut chars = name.chars();
        let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FilterError::InvalidCollection(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Value> {
        (1..=25)
            .map(|i| json!({"id": format!("{:02}", i), "type": if i % 2 == 0 { "even" } else { "odd" }}))
            .collect()
    }

    #[test]
    fn validates_collection_name() {
        assert!(Filter::new("organization").is_ok());
        assert!(Filter::new("").is_err());
        assert!(Filter::new("1abc").is_err());
        assert!(Filter::new("drop;table").is_err());
    }

    #[test]
    fn pages_after_filtering_and_sorting() {
        let data = FilterData::default()
            .with_filter("type:odd")
            .with_sort("-id")
            .with_paging(2, 5);
        let mut filter = Filter::new("notification").unwrap();
        filter.assign(&data).unwrap();
        let result = filter.apply(docs());

        assert_eq!(result.total, 13);
        let ids: Vec<_> = result.documents.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["15", "13", "11", "09", "07"]);
    }

    #[test]
    fn caps_limit() {
        let mut filter = Filter::new("log").unwrap();
        filter.limit(5000, 1).unwrap();
        assert_eq!(filter.limit, Some(MAX_LIMIT));
        assert!(filter.limit(0, 1).is_err());
    }

    #[test]
    fn facets_cover_all_matches() {
        let data = FilterData {
            facets: vec!["type".into()],
            ..FilterData::default().with_paging(1, 2)
        };
        let mut filter = Filter::new("notification").unwrap();
        filter.assign(&data).unwrap();
        let result = filter.apply(docs());
        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.facets["type"][0].term, "odd");
        assert_eq!(result.facets["type"][0].total, 13);
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// `field:*`
    Exists,
    /// `_missing_:field`
    Missing,
}

/// Everything a repository needs to query one collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterData {
    /// Containment pattern handed to the document store
    pub pattern: Option<Value>,
    /// System filter terms, ANDed with `query`
    pub filter: Option<String>,
    /// User supplied search terms
    pub query: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default)]
    pub facets: Vec<String>,
}

impl FilterData {
    pub fn with_pattern(mut self, pattern: Value) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.trim().is_empty());
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn with_paging(mut self, page: u32, limit: u32) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterWhereInfo {
    /// Dotted document path, `None` for free text terms
    pub field: Option<String>,
    pub operator: FilterOp,
    pub value: String,
    pub negated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub field: String,
    pub sort: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetTerm {
    pub term: String,
    pub total: u64,
}

/// Field name to its most common terms
pub type Facets = BTreeMap<String, Vec<FacetTerm>>;

/// One page of documents that matched a filter
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub documents: Vec<Value>,
    pub total: u64,
    pub facets: Facets,
}

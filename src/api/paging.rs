// api/paging.rs - Page/limit normalization and paging response headers
use serde::Deserialize;
use url::form_urlencoded;

use crate::error::ApiError;

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAXIMUM_LIMIT: u32 = 1000;
/// Deepest result offset a page request may reach
pub const MAXIMUM_SKIP: u64 = 2000;

/// Query string accepted by every list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    /// Search terms
    pub q: Option<String>,
    /// Additional filter terms, ANDed with `q`
    pub f: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// `summary` returns the summary view of each document
    pub mode: Option<String>,
    /// Comma separated facet fields
    pub facet: Option<String>,
}

impl PageQuery {
    pub fn is_summary(&self) -> bool {
        self.mode.as_deref().is_some_and(|m| m.eq_ignore_ascii_case("summary"))
    }

    /// Search and filter terms joined together
    pub fn search(&self) -> Option<String> {
        let terms: Vec<&str> = [self.q.as_deref(), self.f.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        (!terms.is_empty()).then(|| terms.join(" "))
    }
}

pub fn get_page(page: Option<i64>) -> u32 {
    match page {
        Some(p) if p >= 1 => p.min(u32::MAX as i64) as u32,
        _ => 1,
    }
}

pub fn get_limit(limit: Option<i64>) -> u32 {
    match limit {
        Some(l) if l < 1 => DEFAULT_LIMIT,
        Some(l) if l > MAXIMUM_LIMIT as i64 => MAXIMUM_LIMIT,
        Some(l) => l as u32,
        None => DEFAULT_LIMIT,
    }
}

pub fn get_skip(page: u64, limit: u32) -> u64 {
    (page.max(1) - 1).saturating_mul(limit as u64)
}

/// Rejects pages that would reach past the result window
pub fn check_window(page: u32, limit: u32) -> Result<(), ApiError> {
    if get_skip(page as u64 + 1, limit) > MAXIMUM_SKIP {
        return Err(ApiError::bad_request("Cannot get requested page"));
    }
    Ok(())
}

/// More pages exist and the next one is still inside the result window
pub fn has_more_pages(has_more: bool, page: u32, limit: u32) -> bool {
    has_more && (page as u64 + 1) * (limit as u64) < MAXIMUM_SKIP
}

/// `Link` header value with `previous`/`next` relations, or `None` when there is neither
pub fn link_header(path: &str, raw_query: Option<&str>, page: u32, has_more: bool) -> Option<String> {
    let mut links = Vec::new();
    if page > 1 {
        links.push(format!("<{}>; rel=\"previous\"", page_url(path, raw_query, page - 1)));
    }
    if has_more {
        links.push(format!("<{}>; rel=\"next\"", page_url(path, raw_query, page + 1)));
    }
    (!links.is_empty()).then(|| links.join(", "))
}

fn page_url(path: &str, raw_query: Option<&str>, page: u32) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    if let Some(query) = raw_query {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key != "page" {
                serializer.append_pair(&key, &value);
            }
        }
    }
    serializer.append_pair("page", &page.to_string());
    format!("{}?{}", path, serializer.finish())
}

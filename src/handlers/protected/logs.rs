// handlers/protected/logs.rs - GET /logs handler

use axum::{
    extract::State,
    http::Uri,
    routing::get,
    Extension, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::api::extract::Query;
use crate::api::controller::ReadOnlyResource;
use crate::api::paging::PageQuery;
use crate::database::models::LogEvent;
use crate::database::{FindResults, Repository};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResult, RequestContext};
use crate::state::AppState;

const DEFAULT_LOG_LIMIT: i64 = 50;

pub fn routes() -> Router<AppState> {
    Router::new().route("/logs", get(list))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub q: Option<String>,
    pub f: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl LogQuery {
    fn page_query(&self) -> PageQuery {
        PageQuery {
            q: self.q.clone(),
            f: self.f.clone(),
            sort: self.sort.clone(),
            page: self.page,
            limit: Some(self.limit.unwrap_or(DEFAULT_LOG_LIMIT)),
            ..Default::default()
        }
    }
}

pub struct LogResource<'a> {
    pub state: &'a AppState,
    pub ctx: &'a RequestContext,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl<'a> LogResource<'a> {
    /// Global admins read across every organization
    fn scope(&self) -> Result<Option<&str>, ApiError> {
        if self.ctx.is_global_admin() {
            return Ok(None);
        }
        self.ctx.require_organization().map(Some)
    }
}

#[async_trait::async_trait]
impl<'a> ReadOnlyResource for LogResource<'a> {
    type Model = LogEvent;
    type View = LogEvent;

    fn repository(&self) -> &Repository<LogEvent> {
        &self.state.logs
    }

    fn context(&self) -> &RequestContext {
        self.ctx
    }

    fn map_view(&self, model: &LogEvent) -> LogEvent {
        model.clone()
    }

    fn system_filter(&self, _search: Option<&str>) -> FilterData {
        FilterData::default()
    }

    async fn find(&self, filter: FilterData) -> Result<FindResults<LogEvent>, ApiError> {
        let organization_id = self.scope()?;
        Ok(self
            .state
            .logs
            .entries(organization_id, self.start, self.end, filter)
            .await?)
    }
}

/// GET /api/v1/logs?start=&end=&q=&f=&page=&limit= - Newest audit entries first
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<LogQuery>,
    uri: Uri,
) -> ApiResult<Value> {
    ctx.require_user()?;
    if !ctx.is_global_admin() {
        ctx.require_organization()?;
    }
    if let (Some(start), Some(end)) = (query.start, query.end) {
        if start > end {
            return Err(ApiError::bad_request("The start date must be before the end date."));
        }
    }

    let resource = LogResource {
        state: &state,
        ctx: &ctx,
        start: query.start,
        end: query.end,
    };
    resource.get_page(&query.page_query(), &uri).await
}

// handlers/protected/notifications.rs - Notification handlers

use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    routing::{get, post},
    Extension, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::api::extract::{Json, Query};
use crate::api::controller::{parse_ids, CreateResource, ReadOnlyResource, RepositoryResource};
use crate::api::paging::PageQuery;
use crate::database::models::Notification;
use crate::database::{FindResults, Repository};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list).post(create))
        .route("/notifications/unread", get(unread))
        .route("/notifications/markread", post(mark_read))
        .route("/notifications/purge", post(purge))
        .route("/notifications/:id", get(get_by_id).delete(remove))
}

#[derive(Debug, Serialize)]
pub struct ViewNotification {
    pub id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
    pub data: Map<String, Value>,
    pub is_read: bool,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateNotification {
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

pub struct NotificationResource<'a> {
    pub state: &'a AppState,
    pub ctx: &'a RequestContext,
}

impl<'a> NotificationResource<'a> {
    pub fn new(state: &'a AppState, ctx: &'a RequestContext) -> Self {
        Self { state, ctx }
    }

    fn reader(&self) -> &str {
        self.ctx.user_id().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl<'a> ReadOnlyResource for NotificationResource<'a> {
    type Model = Notification;
    type View = ViewNotification;

    fn repository(&self) -> &Repository<Notification> {
        &self.state.notifications
    }

    fn context(&self) -> &RequestContext {
        self.ctx
    }

    fn map_view(&self, model: &Notification) -> ViewNotification {
        ViewNotification {
            id: model.id.clone(),
            organization_id: model.organization_id.clone(),
            user_id: model.user_id.clone(),
            notification_type: model.notification_type.clone(),
            message: model.message.clone(),
            data: model.data.clone(),
            is_read: model.is_read_by(self.reader()),
            created_utc: model.created_utc,
        }
    }

    fn is_visible(&self, model: &Notification) -> bool {
        self.ctx.selected_organization_id() == Some(model.organization_id.as_str())
            && model.is_visible_to(self.reader())
    }

    async fn find(&self, filter: FilterData) -> Result<FindResults<Notification>, ApiError> {
        let organization_id = self.ctx.require_organization()?;
        Ok(self
            .state
            .notifications
            .accessible(organization_id, self.reader(), filter)
            .await?)
    }
}

#[async_trait::async_trait]
impl<'a> RepositoryResource for NotificationResource<'a> {
    type UpdateModel = UpdateNotification;

    fn to_update_model(&self, model: &Notification) -> UpdateNotification {
        UpdateNotification {
            message: model.message.clone(),
            data: model.data.clone(),
        }
    }

    fn apply_update_model(&self, update: UpdateNotification, model: &mut Notification) {
        model.message = update.message;
        model.data = update.data;
    }
}

#[async_trait::async_trait]
impl<'a> CreateResource for NotificationResource<'a> {
    type NewModel = NewNotification;

    fn map_new(&self, value: NewNotification) -> Result<Notification, ApiError> {
        let now = Utc::now();
        Ok(Notification {
            id: String::new(),
            organization_id: String::new(),
            user_id: value.user_id.filter(|u| !u.trim().is_empty()),
            notification_type: value.notification_type,
            message: value.message,
            data: value.data,
            readers: BTreeSet::new(),
            created_utc: now,
            updated_utc: now,
        })
    }
}

/// GET /api/v1/notifications - Notifications addressed to the caller or the whole organization
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<PageQuery>,
    uri: Uri,
) -> ApiResult<Value> {
    ctx.require_user()?;
    ctx.require_organization()?;
    NotificationResource::new(&state, &ctx).get_page(&query, &uri).await
}

/// GET /api/v1/notifications/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    ctx.require_organization()?;
    NotificationResource::new(&state, &ctx).get_by_id(&id).await
}

/// GET /api/v1/notifications/unread
pub async fn unread(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> ApiResult<Value> {
    ctx.require_user()?;
    let organization_id = ctx.require_organization()?;
    let user_id = ctx.user_id().unwrap_or_default();
    let count = state.notifications.unread_count(organization_id, user_id).await?;
    Ok(ApiResponse::success(json!({ "unread": count })))
}

/// POST /api/v1/notifications/markread - Body is an array of ids
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(ids): Json<Vec<String>>,
) -> ApiResult<()> {
    let user_id = ctx.current_user()?.id.clone();
    ctx.require_organization()?;
    let resource = NotificationResource::new(&state, &ctx);
    let visible: Vec<String> = resource
        .get_models(&ids, false)
        .await?
        .into_iter()
        .map(|n| n.id)
        .collect();
    if !visible.is_empty() {
        state.notifications.mark_read(&visible, &user_id).await?;
    }
    Ok(ApiResponse::success(()))
}

/// POST /api/v1/notifications/purge - Removes the listed notifications
pub async fn purge(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(ids): Json<Vec<String>>,
) -> ApiResult<()> {
    ctx.require_user()?;
    ctx.require_organization()?;
    NotificationResource::new(&state, &ctx).delete_many(&ids).await
}

/// POST /api/v1/notifications - Body `{ "type", "message", "user_id"?, "data"? }`
pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<NewNotification>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    ctx.require_organization()?;
    NotificationResource::new(&state, &ctx).post(body).await
}

/// DELETE /api/v1/notifications/:ids - Comma separated ids
pub async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(ids): Path<String>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    ctx.require_organization()?;
    let resource = NotificationResource::new(&state, &ctx);
    match parse_ids(&ids).as_slice() {
        [] => Err(ApiError::not_found("Not found")),
        [id] => resource.delete(id).await,
        many => {
            resource.delete_many(many).await?;
            Ok(ApiResponse::with_status(Value::Null, StatusCode::NO_CONTENT))
        }
    }
}

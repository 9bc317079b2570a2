// handlers/protected/tokens.rs - Organization API token handlers

use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    routing::get,
    Extension, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::api::extract::{Json, Query};
use crate::api::controller::{parse_ids, CreateResource, ReadOnlyResource, RepositoryResource, VersionQuery};
use crate::api::paging::PageQuery;
use crate::api::permission::PermissionResult;
use crate::auth::password::generate_token;
use crate::auth::roles::{self, RoleSet};
use crate::database::models::log_event::LogLevel;
use crate::database::models::{LogEvent, Token, TokenType};
use crate::database::{FindResults, Repository};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tokens", get(list).post(create))
        .route("/tokens/:id", get(get_by_id).patch(patch).delete(remove))
}

#[derive(Debug, Serialize)]
pub struct ViewToken {
    pub id: String,
    pub organization_id: Option<String>,
    pub scopes: RoleSet,
    pub expires_utc: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<&Token> for ViewToken {
    fn from(token: &Token) -> Self {
        Self {
            id: token.id.clone(),
            organization_id: token.organization_id.clone(),
            scopes: token.scopes.clone(),
            expires_utc: token.expires_utc,
            notes: token.notes.clone(),
            created_by: token.created_by.clone(),
            created_utc: token.created_utc,
            updated_utc: token.updated_utc,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NewToken {
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expires_utc: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateToken {
    pub notes: Option<String>,
    pub expires_utc: Option<DateTime<Utc>>,
}

pub struct TokenResource<'a> {
    pub state: &'a AppState,
    pub ctx: &'a RequestContext,
}

impl<'a> TokenResource<'a> {
    pub fn new(state: &'a AppState, ctx: &'a RequestContext) -> Self {
        Self { state, ctx }
    }
}

#[async_trait::async_trait]
impl<'a> ReadOnlyResource for TokenResource<'a> {
    type Model = Token;
    type View = ViewToken;

    fn repository(&self) -> &Repository<Token> {
        &self.state.tokens
    }

    fn context(&self) -> &RequestContext {
        self.ctx
    }

    fn map_view(&self, model: &Token) -> ViewToken {
        ViewToken::from(model)
    }

    /// API tokens of the selected organization, plus the caller's own sessions there
    fn is_visible(&self, model: &Token) -> bool {
        let Some(selected) = self.ctx.selected_organization_id() else {
            return false;
        };
        model.token_type == TokenType::Access
            && model.organization_id.as_deref() == Some(selected)
            && model.user_id.as_deref().map_or(true, |u| Some(u) == self.ctx.user_id())
    }

    async fn find(&self, filter: FilterData) -> Result<FindResults<Token>, ApiError> {
        let organization_id = self.ctx.require_organization()?;
        Ok(self.state.tokens.api_tokens(organization_id, filter).await?)
    }
}

#[async_trait::async_trait]
impl<'a> RepositoryResource for TokenResource<'a> {
    type UpdateModel = UpdateToken;

    fn to_update_model(&self, model: &Token) -> UpdateToken {
        UpdateToken {
            notes: model.notes.clone(),
            expires_utc: model.expires_utc,
        }
    }

    fn apply_update_model(&self, update: UpdateToken, model: &mut Token) {
        model.notes = update.notes;
        model.expires_utc = update.expires_utc;
    }

    async fn after_delete(&self, model: &Token) -> Result<(), ApiError> {
        info!("Deleted token {} of organization {:?}", model.id, model.organization_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'a> CreateResource for TokenResource<'a> {
    type NewModel = NewToken;

    fn map_new(&self, value: NewToken) -> Result<Token, ApiError> {
        let mut token = Token::new(generate_token(), TokenType::Access);
        token.scopes = value
            .scopes
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if token.scopes.is_empty() {
            token.scopes = roles::client_scope();
        }
        token.expires_utc = value.expires_utc;
        token.notes = value.notes;
        Ok(token)
    }

    async fn can_add(&self, model: &Token) -> Result<PermissionResult, ApiError> {
        if model.scopes.iter().any(|s| !roles::is_valid_scope(s)) {
            return Ok(PermissionResult::deny_with_message("Invalid token scope requested."));
        }
        let principal = &self.ctx.principal;
        if (model.scopes.contains(roles::CLIENT) || model.scopes.contains(roles::USER))
            && !principal.has_role(roles::USER)
        {
            return Ok(PermissionResult::deny_with_status("Not allowed", 403));
        }
        if model.scopes.contains(roles::ADMIN) && !principal.is_admin() {
            return Ok(PermissionResult::deny_with_status("Not allowed", 403));
        }
        if model.scopes.contains(roles::GLOBAL_ADMIN) && !principal.is_global_admin() {
            return Ok(PermissionResult::deny_with_status("Not allowed", 403));
        }

        match model.organization_id.as_deref() {
            Some(id) if self.ctx.can_access_organization(id) => Ok(PermissionResult::allow()),
            _ => Ok(PermissionResult::deny_with_message("Invalid organization id specified.")),
        }
    }

    async fn add_model(&self, mut model: Token) -> Result<Token, ApiError> {
        model.created_by = self.ctx.user_id().map(str::to_string);
        model.scopes = roles::with_implied(model.scopes);
        Ok(self.state.tokens.add(model).await?)
    }

    async fn after_add(&self, model: Token) -> Result<Token, ApiError> {
        self.state
            .audit(
                LogEvent::new(LogLevel::Info, "tokens", "Created API token")
                    .for_organization(model.organization_id.as_deref())
                    .by_user(self.ctx.user_id())
                    .with_data("scopes", model.scopes.iter().cloned().collect::<Vec<String>>()),
            )
            .await;
        Ok(model)
    }
}

/// GET /api/v1/tokens - API tokens of the selected organization
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<PageQuery>,
    uri: Uri,
) -> ApiResult<Value> {
    ctx.require_user()?;
    ctx.require_organization()?;
    TokenResource::new(&state, &ctx).get_page(&query, &uri).await
}

/// GET /api/v1/tokens/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    ctx.require_organization()?;
    TokenResource::new(&state, &ctx).get_by_id(&id).await
}

/// POST /api/v1/tokens - Body `{ "scopes": [...], "expires_utc"?, "notes"? }`
pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<NewToken>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    ctx.require_organization()?;
    TokenResource::new(&state, &ctx).post(body).await
}

/// PATCH /api/v1/tokens/:id - Notes and expiry only
pub async fn patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(version): Query<VersionQuery>,
    Json(changes): Json<Value>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    ctx.require_organization()?;
    TokenResource::new(&state, &ctx).patch(&id, changes, version.version).await
}

/// DELETE /api/v1/tokens/:id - Accepts a comma separated id list
pub async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(ids): Path<String>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    ctx.require_organization()?;
    let resource = TokenResource::new(&state, &ctx);
    match parse_ids(&ids).as_slice() {
        [] => Err(ApiError::not_found("Not found")),
        [id] => resource.delete(id).await,
        many => {
            resource.delete_many(many).await?;
            Ok(ApiResponse::with_status(Value::Null, StatusCode::NO_CONTENT))
        }
    }
}

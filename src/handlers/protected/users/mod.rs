// handlers/protected/users/mod.rs - /users handlers

use axum::{
    extract::{Path, State},
    http::Uri,
    routing::{delete, get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::api::extract::{Json, Query};
use crate::api::controller::{parse_ids, ReadOnlyResource, RepositoryResource, VersionQuery};
use crate::api::paging::PageQuery;
use crate::auth::roles;
use crate::database::models::is_valid_email;
use crate::error::ApiError;
use crate::handlers::public::auth::{default_organization_id, non_empty, TokenResponse};
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::state::AppState;
use crate::types::ChangeType;

pub mod resource;

pub use resource::{UpdateUser, UserResource, ViewCurrentUser, ViewUser};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list))
        .route("/users/me", get(me))
        .route("/users/verify-email-address", get(verify_email_address))
        .route("/users/:id", get(get_by_id).patch(patch).put(put).delete(remove))
        .route("/users/:id/remove", delete(remove_membership))
        .route("/users/:id/email-address/:email", post(change_email_address))
        .route("/users/:id/resend-verification-email", get(resend_verification_email))
        .route("/users/:id/admin-role", post(add_admin_role).delete(remove_admin_role))
        .route(
            "/users/:id/global-admin-role",
            post(add_global_admin_role).delete(remove_global_admin_role),
        )
        .route("/users/:id/data/:key", post(set_data).delete(remove_data))
}

#[derive(Debug, Serialize)]
pub struct EmailAddressStatus {
    pub is_verified: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailAddressQuery {
    pub token: Option<String>,
}

/// GET /api/v1/users/me - The signed in user with session roles and membership names
pub async fn me(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> ApiResult<ViewCurrentUser> {
    let user = ctx.current_user()?;
    let organizations = state.organizations.by_ids(&user.organization_ids()).await?;
    Ok(ApiResponse::success(ViewCurrentUser::new(user, &ctx, &organizations)))
}

/// GET /api/v1/users - Users of the selected organization
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<PageQuery>,
    uri: Uri,
) -> ApiResult<Value> {
    ctx.require_admin()?;
    UserResource::new(&state, &ctx).get_page(&query, &uri).await
}

/// GET /api/v1/users/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    UserResource::new(&state, &ctx).get_by_id(&id).await
}

/// PATCH /api/v1/users/:id - JSON Patch against full_name, email_notifications_enabled, profile_image_path and data
pub async fn patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(version): Query<VersionQuery>,
    Json(changes): Json<Value>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    UserResource::new(&state, &ctx).patch(&id, changes, version.version).await
}

/// PUT /api/v1/users/:id
pub async fn put(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(version): Query<VersionQuery>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    UserResource::new(&state, &ctx).put(&id, body, version.version).await
}

/// DELETE /api/v1/users/:id - One id returns the deleted view, a comma separated list returns 204
pub async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(ids): Path<String>,
) -> ApiResult<Value> {
    ctx.require_admin()?;
    let resource = UserResource::new(&state, &ctx);
    let ids = parse_ids(&ids);
    match ids.as_slice() {
        [] => Err(ApiError::not_found("Not found")),
        [id] => resource.delete(id).await,
        many => {
            resource.delete_many(many).await?;
            Ok(ApiResponse::with_status(Value::Null, axum::http::StatusCode::NO_CONTENT))
        }
    }
}

/// DELETE /api/v1/users/:id/remove - Drop the user from the selected organization
pub async fn remove_membership(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    ctx.require_admin()?;
    let organization_id = ctx.require_organization()?;
    let resource = UserResource::new(&state, &ctx);
    let mut user = resource.managed_user(&id).await?;

    if user.remove_membership(organization_id) {
        let user = state.users.save(user).await?;
        resource.publish_membership_change(ChangeType::Removed, &user.id, organization_id);
        info!("Removed user {} from organization {}", user.id, organization_id);
    }
    Ok(ApiResponse::no_content())
}

/// POST /api/v1/users/:id/email-address/:email - Change the address and mail a new verification link
pub async fn change_email_address(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, email)): Path<(String, String)>,
) -> ApiResult<EmailAddressStatus> {
    ctx.require_user()?;
    let mut user = UserResource::new(&state, &ctx)
        .get_model(&id, false)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user '{}' not found", id)))?;

    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Please specify a valid Email Address."));
    }
    if user.email_address == email {
        return Ok(ApiResponse::success(EmailAddressStatus {
            is_verified: user.is_email_address_verified,
        }));
    }
    if state.users.by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request("A user with this email address already exists."));
    }

    user.email_address = email;
    user.is_email_address_verified = false;
    user.create_verify_email_address_token();
    let user = state.users.save(user).await?;
    state.mailer.send_verify_email(&user).await?;

    Ok(ApiResponse::success(EmailAddressStatus {
        is_verified: user.is_email_address_verified,
    }))
}

/**
 * GET /api/v1/users/verify-email-address?token= - Confirm an address (anonymous)
 *
 * Organizations administered by the user are verified along with the address.
 * Users without a password get a session token back so they can create one.
 */
pub async fn verify_email_address(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailAddressQuery>,
) -> ApiResult<Option<TokenResponse>> {
    let token = non_empty(query.token.as_deref()).ok_or_else(|| ApiError::not_found("Invalid Verify Email Address Token."))?;
    let mut user = state
        .users
        .by_verify_email_address_token(token)
        .await?
        .ok_or_else(|| ApiError::not_found("Invalid Verify Email Address Token."))?;
    if !user.has_valid_verify_email_address_token() {
        return Err(ApiError::bad_request("Verify Email Address Token has expired."));
    }

    user.mark_email_address_verified();
    let user = state.users.save(user).await?;
    for membership in user.memberships_with_admin_role() {
        state.organization_service.try_mark_verified(&membership.organization_id).await?;
    }

    if user.has_local_password() {
        return Ok(ApiResponse::success(None));
    }
    let organization_id = default_organization_id(&user);
    let token = state.user_token(&user.id, organization_id.as_deref()).await?;
    Ok(ApiResponse::success(Some(TokenResponse { token })))
}

/// GET /api/v1/users/:id/resend-verification-email
pub async fn resend_verification_email(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    ctx.require_user()?;
    let mut user = UserResource::new(&state, &ctx)
        .get_model(&id, false)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user '{}' not found", id)))?;

    if !user.is_email_address_verified {
        if !user.has_valid_verify_email_address_token() {
            user.create_verify_email_address_token();
            user = state.users.save(user).await?;
        }
        state.mailer.send_verify_email(&user).await?;
    }
    Ok(ApiResponse::success(()))
}

/// POST /api/v1/users/:id/admin-role - Grant admin in the selected organization
pub async fn add_admin_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    ctx.require_admin()?;
    let organization_id = ctx.require_organization()?;
    let resource = UserResource::new(&state, &ctx);
    let mut user = resource.managed_user(&id).await?;

    if user.added_membership_role(organization_id, roles::ADMIN) {
        let user = state.users.save(user).await?;
        resource.publish_membership_change(ChangeType::Saved, &user.id, organization_id);
    }
    Ok(ApiResponse::success(()))
}

/// DELETE /api/v1/users/:id/admin-role
pub async fn remove_admin_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    ctx.require_admin()?;
    let organization_id = ctx.require_organization()?;
    let resource = UserResource::new(&state, &ctx);
    let mut user = resource.managed_user(&id).await?;

    if user.removed_admin_membership_role(organization_id) {
        let user = state.users.save(user).await?;
        resource.publish_membership_change(ChangeType::Saved, &user.id, organization_id);
    }
    Ok(ApiResponse::no_content())
}

/// POST /api/v1/users/:id/global-admin-role
pub async fn add_global_admin_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    ctx.require_global_admin()?;
    let mut user = UserResource::new(&state, &ctx).managed_user(&id).await?;
    if user.added_global_admin_role() {
        let user = state.users.save(user).await?;
        info!("Granted global admin role to {}", user.email_address);
    }
    Ok(ApiResponse::success(()))
}

/// DELETE /api/v1/users/:id/global-admin-role
pub async fn remove_global_admin_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    ctx.require_global_admin()?;
    let mut user = UserResource::new(&state, &ctx).managed_user(&id).await?;
    if user.removed_global_admin_role() {
        let user = state.users.save(user).await?;
        info!("Revoked global admin role from {}", user.email_address);
    }
    Ok(ApiResponse::no_content())
}

/// POST /api/v1/users/:id/data/:key - The raw body becomes the value; JSON bodies are stored as JSON
pub async fn set_data(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, key)): Path<(String, String)>,
    body: String,
) -> ApiResult<Value> {
    ctx.require_user()?;
    let key = key.trim();
    if key.is_empty() || body.trim().is_empty() {
        return Err(ApiError::bad_request("A key and value are required."));
    }

    let resource = UserResource::new(&state, &ctx);
    let mut user = resource
        .get_model(&id, false)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user '{}' not found", id)))?;

    let value = serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body.trim().to_string()));
    user.data.insert(key.to_string(), value);
    let user = state.users.save(user).await?;
    Ok(ApiResponse::success(resource.view(&user)?))
}

/// DELETE /api/v1/users/:id/data/:key
pub async fn remove_data(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, key)): Path<(String, String)>,
) -> ApiResult<()> {
    ctx.require_user()?;
    let mut user = UserResource::new(&state, &ctx)
        .get_model(&id, false)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user '{}' not found", id)))?;

    if user.data.remove(key.trim()).is_none() {
        return Err(ApiError::not_found(format!("Data key '{}' not found", key)));
    }
    state.users.save(user).await?;
    Ok(ApiResponse::no_content())
}

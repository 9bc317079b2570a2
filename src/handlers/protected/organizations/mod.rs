// handlers/protected/organizations/mod.rs - /organizations handlers

use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::extract::{Json, Query};
use crate::api::controller::{parse_ids, CreateResource, ReadOnlyResource, RepositoryResource, VersionQuery};
use crate::api::paging::PageQuery;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::state::AppState;

pub mod invites;
pub mod resource;

pub use resource::{NewOrganization, OrganizationResource, UpdateOrganization, ViewOrganization};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/organizations", get(list).post(create))
        .route("/organizations/admin", get(admin_list))
        .route("/organizations/delete", post(delete_many))
        .route("/organizations/invites", get(invites::list).post(invites::create))
        .route("/organizations/invites/:invite", get(invites::get_by_token).delete(invites::revoke))
        .route("/organizations/invites/:invite/resend-invite", get(invites::resend))
        .route("/organizations/:id", get(get_by_id).patch(patch).put(put).delete(remove))
        .route("/organizations/:id/undelete", post(undelete))
}

#[derive(Debug, Deserialize)]
pub struct DeleteOrganizationsRequest {
    pub ids: Vec<String>,
}

/// GET /api/v1/organizations - Organizations the caller belongs to
pub async fn list(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> ApiResult<Value> {
    ctx.require_user()?;
    let resource = OrganizationResource::new(&state, &ctx);
    let organizations = state.organizations.by_ids(&ctx.associated_organization_ids()).await?;
    let views = organizations
        .iter()
        .map(|o| resource.view(o))
        .collect::<Result<Vec<Value>, ApiError>>()?;
    Ok(ApiResponse::success(Value::Array(views)))
}

/// GET /api/v1/organizations/admin - Every organization, paged (global admin)
pub async fn admin_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<PageQuery>,
    uri: Uri,
) -> ApiResult<Value> {
    ctx.require_global_admin()?;
    OrganizationResource::new(&state, &ctx).get_page(&query, &uri).await
}

/// GET /api/v1/organizations/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    OrganizationResource::new(&state, &ctx).get_by_id(&id).await
}

/// POST /api/v1/organizations - The caller becomes the admin of the new organization
pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<resource::NewOrganization>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    OrganizationResource::new(&state, &ctx).post(body).await
}

/// PATCH /api/v1/organizations/:id
pub async fn patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(version): Query<VersionQuery>,
    Json(changes): Json<Value>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    OrganizationResource::new(&state, &ctx).patch(&id, changes, version.version).await
}

/// PUT /api/v1/organizations/:id
pub async fn put(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(version): Query<VersionQuery>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    OrganizationResource::new(&state, &ctx).put(&id, body, version.version).await
}

/// DELETE /api/v1/organizations/:id - Accepts a comma separated id list
pub async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(ids): Path<String>,
) -> ApiResult<Value> {
    ctx.require_user()?;
    let resource = OrganizationResource::new(&state, &ctx);
    match parse_ids(&ids).as_slice() {
        [] => Err(ApiError::not_found("Not found")),
        [id] => resource.delete(id).await,
        many => {
            resource.delete_many(many).await?;
            Ok(ApiResponse::with_status(Value::Null, StatusCode::NO_CONTENT))
        }
    }
}

/// POST /api/v1/organizations/delete - Body `{ "ids": [...] }`
pub async fn delete_many(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<DeleteOrganizationsRequest>,
) -> ApiResult<()> {
    ctx.require_user()?;
    OrganizationResource::new(&state, &ctx).delete_many(&body.ids).await
}

/// POST /api/v1/organizations/:id/undelete (global admin)
pub async fn undelete(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    ctx.require_global_admin()?;
    OrganizationResource::new(&state, &ctx).undelete(&id).await
}

#[cfg(test)]
mod tests {
    use crate::testing::{seed_admin, seed_global_admin, seed_member, test_state, TestApp};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn creator_becomes_admin() {
        let state = test_state();
        let seeded = seed_member(&state, "member@example.com", None, false).await;
        let app = TestApp::new(state);

        let response = app
            .post("/api/v1/organizations", Some(&seeded.token), json!({ "name": "Second Org" }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        let id = response.data()["id"].as_str().unwrap().to_string();

        let user = app.state.users.select_404(&seeded.user.id).await.unwrap();
        assert!(user.is_admin(&id));

        let list = app.get("/api/v1/organizations", Some(&seeded.token)).await;
        assert_eq!(list.data().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn only_admins_rename() {
        let state = test_state();
        let admin = seed_admin(&state).await;
        let member = seed_member(&state, "member@example.com", Some(&admin.organization), false).await;
        let app = TestApp::new(state);
        let uri = format!("/api/v1/organizations/{}", admin.organization.id);
        let rename = json!([{ "op": "replace", "path": "/name", "value": "Renamed" }]);

        let denied = app.patch(&uri, Some(&member.token), rename.clone()).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);

        let ok = app.patch(&uri, Some(&admin.token), rename).await;
        assert_eq!(ok.status, StatusCode::OK);
        assert_eq!(ok.data()["name"], "Renamed");
    }

    #[tokio::test]
    async fn strangers_cannot_read_organizations() {
        let state = test_state();
        let admin = seed_admin(&state).await;
        let stranger = seed_member(&state, "stranger@example.com", None, true).await;
        let app = TestApp::new(state);

        let response = app
            .get(&format!("/api/v1/organizations/{}", admin.organization.id), Some(&stranger.token))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let admin_list = app.get("/api/v1/organizations/admin", Some(&admin.token)).await;
        assert_eq!(admin_list.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn delete_releases_members_and_undelete_restores() {
        let state = test_state();
        let root = seed_global_admin(&state).await;
        let admin = seed_admin(&state).await;
        let only_here = seed_member(&state, "only@example.com", Some(&admin.organization), false).await;
        let elsewhere = seed_member(&state, "elsewhere@example.com", Some(&admin.organization), false).await;
        let mut roaming = elsewhere.user.clone();
        roaming.added_membership_roles(&root.organization.id, &crate::auth::roles::user_scope());
        state.users.save(roaming).await.unwrap();
        let app = TestApp::new(state);

        let uri = format!("/api/v1/organizations/{}", admin.organization.id);
        let deleted = app.delete(&uri, Some(&admin.token)).await;
        assert_eq!(deleted.status, StatusCode::OK);
        assert_eq!(deleted.data()["is_deleted"], true);

        assert!(app.state.users.select_one(&only_here.user.id, false).await.unwrap().is_none());
        let kept = app.state.users.select_404(&elsewhere.user.id).await.unwrap();
        assert!(!kept.is_member_of(&admin.organization.id));
        let caller = app.state.users.select_404(&admin.user.id).await.unwrap();
        assert!(caller.memberships.is_empty());

        let restored = app
            .post(&format!("{}/undelete", uri), Some(&root.token), json!({}))
            .await;
        assert_eq!(restored.status, StatusCode::OK);
        assert_eq!(restored.data()["is_deleted"], false);
    }

    #[tokio::test]
    async fn invites_are_created_and_resolved() {
        let state = test_state();
        let admin = seed_admin(&state).await;
        let app = TestApp::new(state);

        let invalid = app
            .post("/api/v1/organizations/invites", Some(&admin.token), json!({ "role": "user" }))
            .await;
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

        let invited = app
            .post(
                "/api/v1/organizations/invites",
                Some(&admin.token),
                json!({ "email_address": "new@example.com", "full_name": "New Person" }),
            )
            .await;
        assert_eq!(invited.status, StatusCode::OK);
        assert_eq!(invited.data()["invited"], true);

        let organization = app.state.organizations.select_404(&admin.organization.id).await.unwrap();
        let token = organization.invites[0].token.clone();
        let details = app.get(&format!("/api/v1/organizations/invites/{}", token), None).await;
        assert_eq!(details.status, StatusCode::OK);
        assert_eq!(details.data()["organization_name"], "Acme");

        let revoked = app
            .delete("/api/v1/organizations/invites/new@example.com", Some(&admin.token))
            .await;
        assert_eq!(revoked.status, StatusCode::OK);
        let gone = app.get(&format!("/api/v1/organizations/invites/{}", token), None).await;
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn inviting_existing_user_adds_membership() {
        let state = test_state();
        let admin = seed_admin(&state).await;
        let other = seed_member(&state, "other@example.com", None, false).await;
        let app = TestApp::new(state);

        let response = app
            .post(
                "/api/v1/organizations/invites",
                Some(&admin.token),
                json!({ "email_address": "other@example.com", "role": "admin" }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.data()["added"], true);
        assert_eq!(response.data()["user_id"], other.user.id.as_str());

        let user = app.state.users.select_404(&other.user.id).await.unwrap();
        assert!(user.is_admin(&admin.organization.id));
    }
}

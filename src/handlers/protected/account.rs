// handlers/protected/account.rs - Credential management for the signed in user
//
// POST /auth/unlink/{provider}
// POST /auth/change-email-address
// POST /auth/change-password
// POST /auth/create-password
// GET  /auth/switch-organization?organization_id=

use axum::{
    extract::{Path, State},
    Extension,
};
use serde::Deserialize;
use tracing::info;

use crate::api::extract::{Json, Query};
use crate::auth::password::{is_valid_password, INVALID_PASSWORD_MESSAGE};
use crate::database::models::log_event::LogLevel;
use crate::database::models::{is_valid_email, LogEvent};
use crate::error::ApiError;
use crate::handlers::public::auth::{non_empty, TokenResponse};
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangeEmailAddressRequest {
    #[serde(alias = "email_address")]
    pub new_email_address: Option<String>,
    pub current_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePasswordRequest {
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchOrganizationQuery {
    pub organization_id: Option<String>,
}

/// POST /auth/unlink/{provider} - Detach an external login. The body is the provider user id.
pub async fn unlink(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(provider): Path<String>,
    body: String,
) -> ApiResult<()> {
    let user = ctx.current_user()?;
    let provider_user_id = body.trim().trim_matches('"').trim();
    if provider.trim().is_empty() || provider_user_id.is_empty() {
        return Err(ApiError::bad_request("Invalid Provider Name or Provider User Id."));
    }

    let mut user = user.clone();
    if !user.remove_oauth_account(&provider, provider_user_id) {
        return Err(ApiError::bad_request(
            "You must set a local password before removing your external login.",
        ));
    }
    let user = state.users.save(user).await?;
    info!("User {} unlinked a {} login", user.id, provider);
    Ok(ApiResponse::success(()))
}

/// POST /auth/change-email-address - Requires the current password when one is set
pub async fn change_email_address(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ChangeEmailAddressRequest>,
) -> ApiResult<()> {
    let mut user = ctx.current_user()?.clone();
    let email = non_empty(body.new_email_address.as_deref())
        .filter(|e| is_valid_email(e))
        .ok_or_else(|| ApiError::bad_request("Please specify a valid Email Address."))?
        .to_lowercase();

    if user.has_local_password() && !user.is_valid_password(body.current_password.as_deref().unwrap_or_default()) {
        return Err(ApiError::bad_request("The current password is incorrect."));
    }
    if user.email_address == email {
        return Ok(ApiResponse::success(()));
    }
    if state.users.by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request("A user with this email address already exists."));
    }

    user.email_address = email;
    user.is_email_address_verified = false;
    user.create_verify_email_address_token();
    let user = state.users.save(user).await?;
    state.mailer.send_verify_email(&user).await?;

    state
        .audit(
            LogEvent::new(LogLevel::Info, "auth", "Email address changed")
                .for_organization(ctx.selected_organization_id())
                .by_user(Some(&user.id)),
        )
        .await;
    Ok(ApiResponse::success(()))
}

/// POST /auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<()> {
    let mut user = ctx.current_user()?.clone();
    let password = body.password.as_deref().unwrap_or_default();
    if !is_valid_password(password) {
        return Err(ApiError::bad_request(INVALID_PASSWORD_MESSAGE));
    }
    if !user.is_valid_password(body.current_password.as_deref().unwrap_or_default()) {
        return Err(ApiError::bad_request("The current password is incorrect."));
    }

    user.set_password(password);
    let user = state.users.save(user).await?;
    state
        .audit(
            LogEvent::new(LogLevel::Info, "auth", "Password changed")
                .for_organization(ctx.selected_organization_id())
                .by_user(Some(&user.id)),
        )
        .await;
    Ok(ApiResponse::success(()))
}

/// POST /auth/create-password - For accounts created through an external login
pub async fn create_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreatePasswordRequest>,
) -> ApiResult<()> {
    let mut user = ctx.current_user()?.clone();
    if user.has_local_password() {
        return Err(ApiError::bad_request("The password has already been created."));
    }
    let password = body.password.as_deref().unwrap_or_default();
    if !is_valid_password(password) {
        return Err(ApiError::bad_request(INVALID_PASSWORD_MESSAGE));
    }

    user.set_password(password);
    state.users.save(user).await?;
    Ok(ApiResponse::success(()))
}

/// GET /auth/switch-organization - Session token scoped to another organization
pub async fn switch_organization(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<SwitchOrganizationQuery>,
) -> ApiResult<TokenResponse> {
    let user = ctx.current_user()?;
    let organization_id =
        non_empty(query.organization_id.as_deref()).ok_or_else(|| ApiError::bad_request("Invalid organizationId."))?;

    if !user.is_member_of(organization_id) && !user.is_global_admin() {
        return Err(ApiError::unauthorized("You are not a member of this organization."));
    }
    state
        .organizations
        .select_one(organization_id, true)
        .await?
        .filter(|o| !o.is_deleted)
        .ok_or_else(|| ApiError::bad_request("Invalid organizationId."))?;

    let token = state.user_token(&user.id, Some(organization_id)).await?;
    Ok(ApiResponse::success(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use crate::testing::{seed_admin, seed_member, test_state, TestApp, TEST_PASSWORD};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn change_password_checks_current_password() {
        let state = test_state();
        let seeded = seed_admin(&state).await;
        let app = TestApp::new(state);
        let token = Some(seeded.token.as_str());

        let wrong = app
            .post(
                "/api/v1/auth/change-password",
                token,
                json!({ "current_password": "nope-nope", "password": "Another123" }),
            )
            .await;
        assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
        assert_eq!(wrong.body["message"], "The current password is incorrect.");

        let ok = app
            .post(
                "/api/v1/auth/change-password",
                token,
                json!({ "current_password": TEST_PASSWORD, "password": "Another123" }),
            )
            .await;
        assert_eq!(ok.status, StatusCode::OK);
        let user = app.state.users.select_404(&seeded.user.id).await.unwrap();
        assert!(user.is_valid_password("Another123"));
    }

    #[tokio::test]
    async fn create_password_refuses_existing_password() {
        let state = test_state();
        let seeded = seed_admin(&state).await;
        let app = TestApp::new(state);
        let response = app
            .post("/api/v1/auth/create-password", Some(&seeded.token), json!({ "password": "Another123" }))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["message"], "The password has already been created.");
    }

    #[tokio::test]
    async fn unlink_needs_a_remaining_login() {
        let state = test_state();
        let seeded = seed_admin(&state).await;
        let mut user = seeded.user.clone();
        user.password = None;
        user.salt = None;
        user.add_oauth_account("github", "42", "octo");
        state.users.save(user).await.unwrap();

        let app = TestApp::new(state);
        let response = app
            .request(
                axum::http::Method::POST,
                "/api/v1/auth/unlink/github",
                Some(&seeded.token),
                Some(json!("42")),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.body["message"],
            "You must set a local password before removing your external login."
        );
    }

    #[tokio::test]
    async fn switch_organization_requires_membership() {
        let state = test_state();
        let seeded = seed_admin(&state).await;
        let other = seed_member(&state, "other@example.com", None, true).await;
        let app = TestApp::new(state);

        let denied = app
            .get(
                &format!("/api/v1/auth/switch-organization?organization_id={}", other.organization.id),
                Some(&seeded.token),
            )
            .await;
        assert_eq!(denied.status, StatusCode::UNAUTHORIZED);

        let missing = app.get("/api/v1/auth/switch-organization", Some(&seeded.token)).await;
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.body["message"], "Invalid organizationId.");

        let own = app
            .get(
                &format!("/api/v1/auth/switch-organization?organization_id={}", seeded.organization.id),
                Some(&seeded.token),
            )
            .await;
        assert_eq!(own.status, StatusCode::OK);
    }
}

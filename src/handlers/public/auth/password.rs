// handlers/public/auth/password.rs - Password reset handlers
//
// GET  /auth/forgot-password?email_address=
// GET  /auth/verify-password-reset-token?token=
// POST /auth/reset-password
// POST /auth/cancel-reset-password/{token}

use axum::extract::{Path, State};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::{default_organization_id, non_empty, verify_organization_of_admin, TokenResponse};
use crate::api::extract::{Json, Query};
use crate::auth::password::{is_valid_password, INVALID_PASSWORD_MESSAGE};
use crate::database::models::is_valid_email;
use crate::database::models::log_event::LogLevel;
use crate::database::models::LogEvent;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// A reset token younger than this is mailed again instead of replaced
const RESET_TOKEN_REUSE_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordQuery {
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetTokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password_reset_token: Option<String>,
    pub password: Option<String>,
}

/// GET /auth/forgot-password - Mail a reset link, or a notice when no account uses the address
pub async fn forgot_password(
    State(state): State<AppState>,
    Query(query): Query<ForgotPasswordQuery>,
) -> ApiResult<()> {
    let email = non_empty(query.email_address.as_deref())
        .filter(|e| is_valid_email(e))
        .ok_or_else(|| ApiError::bad_request("Please specify a valid Email Address."))?;

    let Some(mut user) = state.users.by_email(email).await? else {
        debug!("Password reset requested for unknown address {}", email);
        state.mailer.send_password_reset_email_not_found(email).await?;
        return Ok(ApiResponse::success(()));
    };

    let reusable = user.password_reset_token.is_some()
        && user
            .password_reset_token_created
            .is_some_and(|created| created > Utc::now() - Duration::hours(RESET_TOKEN_REUSE_HOURS));
    if reusable {
        user.password_reset_token_created = Some(Utc::now());
    } else {
        user.create_password_reset_token();
    }

    let user = state.users.save(user).await?;
    state.mailer.send_password_reset(&user).await?;
    state
        .audit(LogEvent::new(LogLevel::Info, "auth", "Password reset requested").by_user(Some(&user.id)))
        .await;
    Ok(ApiResponse::success(()))
}

/// GET /auth/verify-password-reset-token - 200 while the token can still be used
pub async fn verify_password_reset_token(
    State(state): State<AppState>,
    Query(query): Query<ResetTokenQuery>,
) -> ApiResult<()> {
    let token = non_empty(query.token.as_deref()).ok_or_else(|| ApiError::bad_request("Invalid Password Reset Token."))?;

    match state.users.by_password_reset_token(token).await? {
        Some(user) if user.has_valid_password_reset_token() => Ok(ApiResponse::success(())),
        _ => Err(ApiError::not_found("Invalid Password Reset Token.")),
    }
}

/// POST /auth/reset-password - Set a new password and start a session
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> ApiResult<TokenResponse> {
    let token = non_empty(body.password_reset_token.as_deref())
        .ok_or_else(|| ApiError::bad_request("Invalid Password Reset Token."))?;

    let mut user = state
        .users
        .by_password_reset_token(token)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid Password Reset Token."))?;
    if !user.has_valid_password_reset_token() {
        return Err(ApiError::bad_request("Password Reset Token has expired."));
    }

    let password = body.password.as_deref().unwrap_or_default();
    if !is_valid_password(password) {
        return Err(ApiError::bad_request(INVALID_PASSWORD_MESSAGE));
    }

    // Receiving the reset mail proves the address
    user.mark_email_address_verified();
    user.set_password(password);
    let user = state.users.save(user).await?;

    let organization_id = default_organization_id(&user);
    verify_organization_of_admin(&state, &user, organization_id.as_deref()).await?;

    info!("User {} reset their password", user.email_address);
    state
        .audit(
            LogEvent::new(LogLevel::Info, "auth", "Password reset")
                .for_organization(organization_id.as_deref())
                .by_user(Some(&user.id)),
        )
        .await;

    let token = state.user_token(&user.id, organization_id.as_deref()).await?;
    Ok(ApiResponse::success(TokenResponse { token }))
}

/// POST /auth/cancel-reset-password/{token} - Always succeeds
pub async fn cancel_reset_password(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<()> {
    if let Some(mut user) = state.users.by_password_reset_token(token.trim()).await? {
        user.reset_password_reset_token();
        state.users.save(user).await?;
    }
    Ok(ApiResponse::success(()))
}

#[cfg(test)]
mod tests {
    use crate::testing::{seed_admin, test_state, test_state_with, test_config, TestApp};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn reset_flow_issues_new_session() {
        let (state, _) = test_state_with(test_config());
        let seeded = seed_admin(&state).await;
        let app = TestApp::new(state);

        let response = app
            .get(&format!("/api/v1/auth/forgot-password?email_address={}", seeded.user.email_address), None)
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(app.state.mail_queue.stats().await.queued, 1);

        let user = app.state.users.select_404(&seeded.user.id).await.unwrap();
        let token = user.password_reset_token.clone().unwrap();

        let check = app
            .get(&format!("/api/v1/auth/verify-password-reset-token?token={}", token), None)
            .await;
        assert_eq!(check.status, StatusCode::OK);

        let short = app
            .post("/api/v1/auth/reset-password", None, json!({ "password_reset_token": token, "password": "short" }))
            .await;
        assert_eq!(short.status, StatusCode::BAD_REQUEST);

        let reset = app
            .post(
                "/api/v1/auth/reset-password",
                None,
                json!({ "password_reset_token": token, "password": "BrandNewPass1" }),
            )
            .await;
        assert_eq!(reset.status, StatusCode::OK);
        assert!(reset.data()["token"].is_string());

        let user = app.state.users.select_404(&seeded.user.id).await.unwrap();
        assert!(user.is_valid_password("BrandNewPass1"));
        assert!(user.password_reset_token.is_none());
    }

    #[tokio::test]
    async fn forgot_password_requires_valid_address() {
        let app = TestApp::new(test_state());
        let response = app.get("/api/v1/auth/forgot-password?email_address=nope", None).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["message"], "Please specify a valid Email Address.");
    }

    #[tokio::test]
    async fn unknown_reset_token_is_not_found() {
        let app = TestApp::new(test_state());
        let response = app.get("/api/v1/auth/verify-password-reset-token?token=missing", None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let cancel = app.post("/api/v1/auth/cancel-reset-password/missing", None, json!({})).await;
        assert_eq!(cancel.status, StatusCode::OK);
    }
}

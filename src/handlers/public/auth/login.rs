// handlers/public/auth/login.rs - POST /auth/login handler

use axum::extract::State;
use serde::Deserialize;
use tracing::{debug, info};

use super::{default_organization_id, non_empty, TokenResponse};
use crate::api::extract::Json;
use crate::database::models::log_event::LogLevel;
use crate::database::models::LogEvent;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/**
 * POST /auth/login - Exchange an email address and password for a session token
 *
 * The session starts in the user's first organization. Accounts without any
 * membership cannot sign in.
 */
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> ApiResult<TokenResponse> {
    let email = non_empty(body.email.as_deref()).ok_or_else(|| ApiError::bad_request("Email Address is required."))?;
    let password = body
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("Password is required."))?;

    let user = match state.users.by_email(email).await? {
        Some(user) if user.is_active && user.is_valid_password(password) => user,
        found => {
            debug!("Login failed for {}", email);
            state
                .audit(
                    LogEvent::new(LogLevel::Warn, "auth", "Login failed")
                        .by_user(found.as_ref().map(|u| u.id.as_str()))
                        .with_data("email_address", email),
                )
                .await;
            return Err(ApiError::unauthorized("Login failed"));
        }
    };

    let organization_id = default_organization_id(&user)
        .ok_or_else(|| ApiError::bad_request("You must belong to at least one organization."))?;

    info!("User {} logged in", user.email_address);
    state
        .audit(
            LogEvent::new(LogLevel::Info, "auth", "User logged in")
                .for_organization(Some(&organization_id))
                .by_user(Some(&user.id)),
        )
        .await;

    let token = state.user_token(&user.id, Some(&organization_id)).await?;
    Ok(ApiResponse::success(TokenResponse { token }))
}

// handlers/public/auth/signup.rs - POST /auth/signup and GET /auth/check-email-address/{email}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension,
};
use serde::Deserialize;
use tracing::info;

use super::{grant_global_admin_if_first_user, non_empty, store_user, TokenResponse};
use crate::api::extract::Json;
use crate::auth::password::{is_valid_password, INVALID_PASSWORD_MESSAGE};
use crate::database::models::log_event::LogLevel;
use crate::database::models::{LogEvent, Organization, User};
use crate::error::ApiError;
use crate::messaging::{Message, MEMBERSHIP_CHANGE_DELAY};
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::state::AppState;
use crate::types::ChangeType;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub organization_name: Option<String>,
    pub invite_token: Option<String>,
}

/**
 * POST /auth/signup - Create an account and return a session token
 *
 * With an `invite_token` the account joins the inviting organization, with an
 * `organization_name` it becomes the admin of a new one. Existing accounts may
 * sign up again to accept an invite or to create another organization when the
 * password matches.
 */
pub async fn signup(State(state): State<AppState>, Json(body): Json<SignupRequest>) -> ApiResult<TokenResponse> {
    if !state.config.settings.enable_account_creation {
        return Err(ApiError::bad_request(format!(
            "Sorry, {} is not accepting new accounts at this time.",
            state.config.settings.website_name
        )));
    }

    let email = non_empty(body.email.as_deref()).ok_or_else(|| ApiError::bad_request("Email address is required."))?;
    let password = non_empty(body.password.as_deref()).ok_or_else(|| ApiError::bad_request("Password is required."))?;
    let invite_token = non_empty(body.invite_token.as_deref());

    let mut user = match state.users.by_email(email).await? {
        Some(existing) => {
            if invite_token.is_none() && !existing.is_valid_password(password) {
                return Err(ApiError::bad_request("It looks like you already have an account."));
            }
            existing
        }
        None => {
            if !is_valid_password(password) {
                return Err(ApiError::bad_request(INVALID_PASSWORD_MESSAGE));
            }
            let name = non_empty(body.name.as_deref()).unwrap_or(email);
            let mut user = User::new(name, email);
            user.create_verify_email_address_token();
            user.set_password(password);
            grant_global_admin_if_first_user(&state, &mut user).await?;
            user
        }
    };

    let organization_id = if let Some(token) = invite_token {
        let (organization_id, stored) = state.organization_service.add_invited_user(token, user).await?;
        user = stored;
        Some(organization_id)
    } else if let Some(name) = non_empty(body.organization_name.as_deref()) {
        let organization = state.organizations.add(Organization::new(name)).await?;
        user.add_admin_membership(&organization.id);
        user = store_user(&state, user).await?;
        state.bus.publish_delayed(
            Message::UserMembershipChanged {
                change_type: ChangeType::Added,
                user_id: user.id.clone(),
                organization_id: organization.id.clone(),
            },
            MEMBERSHIP_CHANGE_DELAY,
        );
        Some(organization.id)
    } else {
        if user.id.is_empty() {
            user = state.users.add(user).await?;
        }
        None
    };

    if !user.is_email_address_verified {
        state.mailer.send_verify_email(&user).await?;
    }

    info!("User {} signed up", user.email_address);
    state
        .audit(
            LogEvent::new(LogLevel::Info, "auth", "User signed up")
                .for_organization(organization_id.as_deref())
                .by_user(Some(&user.id)),
        )
        .await;

    let token = state.user_token(&user.id, organization_id.as_deref()).await?;
    Ok(ApiResponse::success(TokenResponse { token }))
}

/// GET /auth/check-email-address/{email} - 204 when the address is free, 201 when taken
pub async fn check_email_address(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(email): Path<String>,
) -> Result<StatusCode, ApiError> {
    let email = email.trim();
    if email.is_empty() {
        return Ok(StatusCode::NO_CONTENT);
    }

    let is_own_address = ctx
        .user
        .as_ref()
        .is_some_and(|u| u.email_address.eq_ignore_ascii_case(email));
    if is_own_address || state.users.by_email(email).await?.is_some() {
        return Ok(StatusCode::CREATED);
    }
    Ok(StatusCode::NO_CONTENT)
}

// handlers/public/auth/oauth.rs - POST /auth/google and POST /auth/github handlers

use axum::{extract::State, Extension};
use serde::Deserialize;
use tracing::info;

use super::{
    default_organization_id, grant_global_admin_if_first_user, non_empty, store_user, verify_organization_of_admin,
    TokenResponse,
};
use crate::api::extract::Json;
use crate::auth::roles;
use crate::database::models::log_event::LogLevel;
use crate::database::models::{LogEvent, User};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::services::{OAuthProvider, OAuthUserInfo};
use crate::state::AppState;

/// Authorization code handed back by the provider's consent screen
#[derive(Debug, Deserialize)]
pub struct ExternalAuthInfo {
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub invite_token: Option<String>,
}

/// POST /auth/google - Sign in or link a Google account
pub async fn google(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(info): Json<ExternalAuthInfo>,
) -> ApiResult<TokenResponse> {
    external_login(&state, &ctx, OAuthProvider::Google, info).await
}

/// POST /auth/github - Sign in or link a GitHub account
pub async fn github(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(info): Json<ExternalAuthInfo>,
) -> ApiResult<TokenResponse> {
    external_login(&state, &ctx, OAuthProvider::GitHub, info).await
}

async fn external_login(
    state: &AppState,
    ctx: &RequestContext,
    provider: OAuthProvider,
    info: ExternalAuthInfo,
) -> ApiResult<TokenResponse> {
    let code = non_empty(info.code.as_deref()).ok_or_else(|| ApiError::not_found("Not found"))?;
    if !state.oauth.is_configured(provider) {
        return Err(ApiError::not_found("Not found"));
    }

    let user_info = state
        .oauth
        .get_user_info(provider, code, non_empty(info.redirect_uri.as_deref()))
        .await?;

    let (user, organization_id) = match ctx.user.as_ref() {
        Some(current) => (link_account(state, current, &user_info).await?, ctx.selected_organization_id().map(str::to_string)),
        None => sign_in(state, &user_info, non_empty(info.invite_token.as_deref())).await?,
    };

    info!("User {} authenticated with {}", user.email_address, provider.name());
    state
        .audit(
            LogEvent::new(LogLevel::Info, "auth", format!("User authenticated with {}", provider.name()))
                .for_organization(organization_id.as_deref())
                .by_user(Some(&user.id)),
        )
        .await;

    let token = state.user_token(&user.id, organization_id.as_deref()).await?;
    Ok(ApiResponse::success(TokenResponse { token }))
}

/// Attaches the external account to the signed in user, detaching it from any
/// other account first
async fn link_account(state: &AppState, current: &User, info: &OAuthUserInfo) -> Result<User, ApiError> {
    let provider = info.provider.name();
    if let Some(mut owner) = state.users.by_oauth(provider, &info.id).await? {
        if owner.id == current.id {
            return Ok(current.clone());
        }
        if !owner.remove_oauth_account(provider, &info.id) {
            return Err(ApiError::bad_request("Unable to process user info."));
        }
        state.users.save(owner).await?;
    }

    let mut user = state.users.select_404(&current.id).await?;
    user.add_oauth_account(provider, &info.id, info.email.as_deref().unwrap_or_default());
    Ok(state.users.save(user).await?)
}

/// Finds or creates the account behind the external identity
async fn sign_in(
    state: &AppState,
    info: &OAuthUserInfo,
    invite_token: Option<&str>,
) -> Result<(User, Option<String>), ApiError> {
    let provider = info.provider.name();

    if let Some(mut user) = state.users.by_oauth(provider, &info.id).await? {
        let organization_id = default_organization_id(&user);
        if !user.is_email_address_verified {
            user.mark_email_address_verified();
            user = state.users.save(user).await?;
            verify_organization_of_admin(state, &user, organization_id.as_deref()).await?;
        }
        return Ok((user, organization_id));
    }

    let email = info.email.as_deref().map(str::trim).unwrap_or_default();
    let existing = match email {
        "" => None,
        email => state.users.by_email(email).await?,
    };
    let mut user = match existing {
        Some(user) => user,
        None => {
            if !state.config.settings.enable_account_creation {
                return Err(ApiError::bad_request("Account Creation is currently disabled."));
            }
            let mut user = User::new(info.display_name(), email);
            user.roles.extend(roles::user_scope());
            grant_global_admin_if_first_user(state, &mut user).await?;
            user
        }
    };

    user.mark_email_address_verified();
    user.add_oauth_account(provider, &info.id, email);
    let user = store_user(state, user).await?;

    let (user, organization_id) = match invite_token {
        Some(token) => {
            let (organization_id, user) = state.organization_service.add_invited_user(token, user).await?;
            (user, Some(organization_id))
        }
        None => {
            let organization_id = default_organization_id(&user);
            (user, organization_id)
        }
    };

    verify_organization_of_admin(state, &user, organization_id.as_deref()).await?;
    Ok((user, organization_id))
}

#[cfg(test)]
mod tests {
    use crate::testing::{test_state, TestApp};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn unconfigured_provider_is_not_found() {
        let app = TestApp::new(test_state());
        let response = app.post("/api/v1/auth/google", None, json!({ "code": "abc" })).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let response = app.post("/api/v1/auth/github", None, json!({})).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}

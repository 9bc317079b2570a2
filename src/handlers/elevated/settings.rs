// handlers/elevated/settings.rs - GET /api/v1/settings handler

use axum::{extract::State, Extension};

use crate::config::AppConfig;
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::state::AppState;

/// GET /api/v1/settings - Effective configuration. Secrets never serialize.
pub async fn settings(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> ApiResult<AppConfig> {
    ctx.require_global_admin()?;
    Ok(ApiResponse::success(state.config.as_ref().clone()))
}

#[cfg(test)]
mod tests {
    use crate::testing::{seed_admin, seed_global_admin, test_config, test_state_with, TestApp};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn only_global_admins_read_settings_without_secrets() {
        let mut config = test_config();
        config.settings.smtp.password = Some("hunter2".into());
        config.settings.github.client_secret = Some("gh-secret".into());
        let (state, _) = test_state_with(config);
        let admin = seed_admin(&state).await;
        let root = seed_global_admin(&state).await;
        let app = TestApp::new(state);

        let denied = app.get("/api/v1/settings", Some(&admin.token)).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);

        let response = app.get("/api/v1/settings", Some(&root.token)).await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.body.to_string();
        assert!(!body.contains("hunter2"));
        assert!(!body.contains("gh-secret"));
        assert!(response.data()["settings"]["website_name"].is_string());
    }
}

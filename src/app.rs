// app.rs - Router assembly
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::api::controller::RESULT_COUNT;
use crate::config::SecurityConfig;
use crate::handlers::{elevated, protected, public};
use crate::middleware::throttle::{RATE_LIMIT, RATE_LIMIT_REMAINING};
use crate::middleware::{auth_middleware, require_https_middleware, throttle_middleware};
use crate::state::AppState;

pub const API_PREFIX: &str = "/api/v1";

const CORS_MAX_AGE_SECS: u64 = 24 * 60 * 60;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.security);

    let api = Router::new()
        .merge(auth_routes())
        .merge(protected::users::routes())
        .merge(protected::organizations::routes())
        .merge(protected::tokens::routes())
        .merge(protected::notifications::routes())
        .merge(protected::logs::routes())
        .merge(utility_routes());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest(API_PREFIX, api)
        .fallback(public::utility::fallback)
        // Outermost last: trace, cors, https, body limit, auth, throttle
        .layer(middleware::from_fn_with_state(state.clone(), throttle_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), require_https_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Browsers may call from the configured origins; `*` allows any origin
fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }

    let origins = if security.cors_origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::any()
    } else {
        let list: Vec<HeaderValue> = security
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin '{}'", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            header::ETAG,
            header::LINK,
            HeaderName::from_static(RESULT_COUNT),
            RATE_LIMIT,
            RATE_LIMIT_REMAINING,
        ])
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS))
}

fn auth_routes() -> Router<AppState> {
    use protected::account;
    use public::auth;

    Router::new()
        // Token acquisition
        .route("/auth/login", post(auth::login))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/google", post(auth::google))
        .route("/auth/github", post(auth::github))
        .route("/auth/check-email-address/:email", get(auth::check_email_address))
        // Account recovery
        .route("/auth/forgot-password", get(auth::forgot_password))
        .route("/auth/verify-password-reset-token", get(auth::verify_password_reset_token))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/cancel-reset-password/:token", post(auth::cancel_reset_password))
        // Signed in account
        .route("/auth/unlink/:provider", post(account::unlink))
        .route("/auth/change-email-address", post(account::change_email_address))
        .route("/auth/change-password", post(account::change_password))
        .route("/auth/create-password", post(account::create_password))
        .route("/auth/switch-organization", get(account::switch_organization))
}

fn utility_routes() -> Router<AppState> {
    use public::utility;

    Router::new()
        .route("/version", get(utility::version))
        .route("/notfound", get(utility::not_found))
        .route("/boom", get(utility::boom))
        .route("/settings", get(elevated::settings))
        .route("/metrics", get(elevated::metrics))
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": state.config.settings.website_name,
            "version": env!("CARGO_PKG_VERSION"),
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "endpoints": {
                "auth": "/api/v1/auth/* (login, signup, oauth, password recovery)",
                "users": "/api/v1/users (user)",
                "organizations": "/api/v1/organizations (user)",
                "tokens": "/api/v1/tokens (user, organization)",
                "notifications": "/api/v1/notifications (user, organization)",
                "logs": "/api/v1/logs (user, organization)",
                "admin": "/api/v1/settings, /api/v1/metrics (global admin)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": state.store.name(),
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Store health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "store unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "store": state.store.name(),
                    }
                })),
            )
        }
    }
}

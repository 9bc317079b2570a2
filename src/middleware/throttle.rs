// middleware/throttle.rs - Per caller request budget over a fixed window
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::debug;

use super::RequestContext;
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::AuthType;

pub const RATE_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

const FORWARDED_FOR: &str = "x-forwarded-for";
const EXCEEDED_MESSAGE: &str = "The allowed number of requests has been exceeded.";

/// Counts requests per caller in the cache. Over the limit the request is answered
/// with 409 without reaching a handler. Every response carries the rate limit headers.
/// Must run inside `auth_middleware` so the caller is known.
pub async fn throttle_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.config.security.api_throttle_limit;
    let period = state.config.security.api_throttle_period_secs.max(1);

    let identifier = caller_identifier(&request, connect_info.map(|ConnectInfo(addr)| addr));
    let window = Utc::now().timestamp().div_euclid(period as i64);
    let key = format!("api:{}:{}", identifier, window);
    let count = state
        .cache
        .increment(&key, 1, Some(Duration::from_secs(period)))
        .await
        .max(0) as u64;

    let mut response = if count > limit {
        debug!("Throttled {} after {} requests", identifier, count);
        ApiError::conflict(EXCEEDED_MESSAGE).into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(limit.saturating_sub(count)));
    response
}

/// Organization for API tokens, user id for signed in users, client address otherwise
fn caller_identifier(request: &Request, peer: Option<SocketAddr>) -> String {
    if let Some(ctx) = request.extensions().get::<RequestContext>() {
        match ctx.principal.auth_type {
            AuthType::Token => {
                if let Some(organization_id) = ctx.principal.organization_id.as_deref() {
                    return organization_id.to_string();
                }
            }
            AuthType::User => {
                if let Some(user_id) = ctx.user_id() {
                    return user_id.to_string();
                }
            }
            AuthType::Anonymous => {}
        }
    }
    client_ip(request.headers(), peer)
}

/// First `X-Forwarded-For` hop, then the peer address; loopback and unknown map to 127.0.0.1
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let ip = match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => String::new(),
    };
    if ip.is_empty() || ip == "::1" {
        "127.0.0.1".to_string()
    } else {
        ip
    }
}

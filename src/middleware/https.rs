// middleware/https.rs - Plain http is refused unless the request is local
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_FOR: &str = "x-forwarded-for";

/// With `security.require_https` set, GET and HEAD over http are redirected to the
/// https URL and other methods get 404. Localhost and `*.localtest.me` are exempt.
pub async fn require_https_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.security.require_https
        || is_https(&request)
        || is_local(request.headers(), connect_info.map(|ConnectInfo(addr)| addr))
    {
        return next.run(request).await;
    }

    let host = request.headers().get(header::HOST).and_then(|h| h.to_str().ok());
    match (request.method(), host) {
        (&Method::GET | &Method::HEAD, Some(host)) => {
            let path = request.uri().path_and_query().map(|p| p.as_str()).unwrap_or("/");
            let location = format!("https://{}{}", host, path);
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        _ => ApiError::not_found("HTTPS Required").into_response(),
    }
}

fn is_https(request: &Request) -> bool {
    request.uri().scheme_str() == Some("https")
        || request
            .headers()
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// Loopback peers count only when no proxy forwarded the request
fn is_local(headers: &HeaderMap, peer: Option<SocketAddr>) -> bool {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(host_name)
        .unwrap_or_default()
        .to_ascii_lowercase();
    if host == "localhost" || host.ends_with("localtest.me") {
        return true;
    }
    !headers.contains_key(FORWARDED_FOR) && peer.is_some_and(|addr| addr.ip().is_loopback())
}

/// Host header without the port; IPv6 literals keep their brackets
fn host_name(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_inclusive(']').next().unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}

// middleware/auth.rs - Resolves the caller of every request into a RequestContext
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::auth::roles;
use crate::auth::Principal;
use crate::database::models::{Organization, TokenType, User};
use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters that may carry a token, in lookup order
const TOKEN_QUERY_PARAMETERS: [&str; 3] = ["access_token", "api_key", "apikey"];

static DATA_IMPORT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"data-import/([a-zA-Z\d]{24,40})").expect("token path pattern compiles"));

/// Caller identity attached to every request
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub principal: Principal,
    pub user: Option<User>,
    pub organization: Option<Organization>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            principal: Principal::anonymous(),
            user: None,
            organization: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_authenticated()
    }

    /// 401 when anonymous, 403 when authenticated without the role
    pub fn require_role(&self, role: &str) -> Result<(), ApiError> {
        if !self.is_authenticated() {
            return Err(ApiError::unauthorized("Authentication required"));
        }
        if !self.principal.has_role(role) {
            return Err(ApiError::forbidden("Insufficient permissions"));
        }
        Ok(())
    }

    pub fn require_client(&self) -> Result<(), ApiError> {
        self.require_role(roles::CLIENT)
    }

    pub fn require_user(&self) -> Result<(), ApiError> {
        self.require_role(roles::USER)
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require_user()?;
        if !self.principal.is_admin() {
            return Err(ApiError::forbidden("Insufficient permissions"));
        }
        Ok(())
    }

    pub fn require_global_admin(&self) -> Result<(), ApiError> {
        self.require_role(roles::GLOBAL_ADMIN)
    }

    /// The signed in user, for endpoints that act on an account rather than a token
    pub fn current_user(&self) -> Result<&User, ApiError> {
        self.require_user()?;
        self.user
            .as_ref()
            .ok_or_else(|| ApiError::unauthorized("A user account is required"))
    }

    /// The selected organization id; 401 when there is none
    pub fn require_organization(&self) -> Result<&str, ApiError> {
        self.selected_organization_id()
            .ok_or_else(|| ApiError::unauthorized("An organization must be selected"))
    }

    pub fn selected_organization_id(&self) -> Option<&str> {
        self.organization.as_ref().map(|o| o.id.as_str())
    }

    pub fn is_global_admin(&self) -> bool {
        self.principal.is_global_admin()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn is_in_organization(&self, organization_id: &str) -> bool {
        if organization_id.is_empty() {
            return false;
        }
        match &self.user {
            Some(user) => user.is_member_of(organization_id),
            None => self.principal.organization_id.as_deref() == Some(organization_id),
        }
    }

    pub fn can_access_organization(&self, organization_id: &str) -> bool {
        self.is_in_organization(organization_id) || self.is_global_admin()
    }

    /// Organization ids the caller may read
    pub fn associated_organization_ids(&self) -> Vec<String> {
        match (&self.user, &self.principal.organization_id) {
            (Some(user), _) => user.organization_ids(),
            (None, Some(organization_id)) => vec![organization_id.clone()],
            (None, None) => vec![],
        }
    }
}

enum Credentials {
    Token(String),
    Login { email: String, password: String },
    Anonymous,
}

/// Authenticates the request and stores a `RequestContext` in its extensions.
/// Requests without credentials continue anonymously; bad credentials get 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credentials = extract_credentials(request.headers(), request.uri())?;
    let context = authenticate(&state, credentials).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn extract_credentials(headers: &HeaderMap, uri: &Uri) -> Result<Credentials, ApiError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| ApiError::unauthorized("Invalid Authorization header format"))?
            .trim();
        let (scheme, parameter) = value.split_once(' ').unwrap_or((value, ""));
        let parameter = parameter.trim();

        if scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token") {
            return Ok(token_or_anonymous(parameter));
        }
        if scheme.eq_ignore_ascii_case("basic") {
            return Ok(parse_basic(parameter));
        }
        debug!("Ignoring unsupported authorization scheme '{}'", scheme);
        return Ok(Credentials::Anonymous);
    }

    if let Some(query) = uri.query() {
        let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes()).into_owned().collect();
        for name in TOKEN_QUERY_PARAMETERS {
            if let Some((_, value)) = pairs.iter().find(|(key, v)| key == name && !v.trim().is_empty()) {
                return Ok(Credentials::Token(value.trim().to_string()));
            }
        }
    }

    if let Some(captures) = DATA_IMPORT_TOKEN.captures(uri.path()) {
        return Ok(Credentials::Token(captures[1].to_string()));
    }

    Ok(Credentials::Anonymous)
}

fn token_or_anonymous(token: &str) -> Credentials {
    if token.is_empty() {
        Credentials::Anonymous
    } else {
        Credentials::Token(token.to_string())
    }
}

/// `client:<token>`, `<token>:` or `<token>:x-oauth-basic` carry a token,
/// anything else is an email/password pair. Undecodable values are ignored.
fn parse_basic(parameter: &str) -> Credentials {
    let Some(decoded) = STANDARD
        .decode(parameter)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    else {
        debug!("Ignoring undecodable basic authorization header");
        return Credentials::Anonymous;
    };
    let (username, password) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));

    if username.eq_ignore_ascii_case("client") {
        return token_or_anonymous(password);
    }
    if password.is_empty() || password.eq_ignore_ascii_case("x-oauth-basic") {
        return token_or_anonymous(username);
    }
    Credentials::Login {
        email: username.to_string(),
        password: password.to_string(),
    }
}

async fn authenticate(state: &AppState, credentials: Credentials) -> Result<RequestContext, ApiError> {
    let (principal, user) = match credentials {
        Credentials::Anonymous => return Ok(RequestContext::anonymous()),
        Credentials::Login { email, password } => {
            let user = state
                .users
                .by_email(&email)
                .await?
                .filter(|u| u.is_active && u.is_valid_password(&password))
                .ok_or_else(|| {
                    debug!("Basic login failed for {}", email);
                    ApiError::unauthorized("Invalid credentials")
                })?;
            (Principal::from_user(&user, None), Some(user))
        }
        Credentials::Token(token) => {
            let token = state
                .tokens
                .select_one(&token, true)
                .await?
                .filter(|t| t.token_type == TokenType::Access)
                .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;
            if token.is_expired() {
                return Err(ApiError::unauthorized("Token has expired"));
            }

            match token.user_id.as_deref() {
                Some(user_id) => {
                    let user = state
                        .users
                        .select_one(user_id, true)
                        .await?
                        .filter(|u| u.is_active)
                        .ok_or_else(|| {
                            warn!("Token {} references missing user {}", token.id, user_id);
                            ApiError::unauthorized("Invalid token")
                        })?;
                    (Principal::from_user(&user, token.organization_id.as_deref()), Some(user))
                }
                None => (Principal::from_token(&token), None),
            }
        }
    };

    let organization = match principal.organization_id.as_deref() {
        Some(organization_id) => state
            .organizations
            .select_one(organization_id, true)
            .await?
            .filter(|o| !o.is_deleted),
        None => None,
    };

    Ok(RequestContext {
        principal,
        user,
        organization,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Token;
    use crate::testing::{seed_admin, test_state, TestApp, TEST_PASSWORD};
    use axum::body::Body;
    use axum::http::{HeaderValue, StatusCode};
    use chrono::{Duration, Utc};

    fn headers(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(authorization).unwrap());
        headers
    }

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
    }

    fn token_of(credentials: Credentials) -> Option<String> {
        match credentials {
            Credentials::Token(t) => Some(t),
            _ => None,
        }
    }

    #[test]
    fn bearer_and_token_schemes() {
        let uri: Uri = "/api/v1/users".parse().unwrap();
        let c = extract_credentials(&headers("Bearer abc"), &uri).unwrap();
        assert_eq!(token_of(c).as_deref(), Some("abc"));
        let c = extract_credentials(&headers("token xyz"), &uri).unwrap();
        assert_eq!(token_of(c).as_deref(), Some("xyz"));
    }

    #[test]
    fn basic_variants() {
        let uri: Uri = "/".parse().unwrap();
        let c = extract_credentials(&headers(&basic("client", "tok1")), &uri).unwrap();
        assert_eq!(token_of(c).as_deref(), Some("tok1"));
        let c = extract_credentials(&headers(&basic("tok2", "x-oauth-basic")), &uri).unwrap();
        assert_eq!(token_of(c).as_deref(), Some("tok2"));
        let c = extract_credentials(&headers(&basic("tok3", "")), &uri).unwrap();
        assert_eq!(token_of(c).as_deref(), Some("tok3"));

        match extract_credentials(&headers(&basic("a@example.com", "secret123")), &uri).unwrap() {
            Credentials::Login { email, password } => {
                assert_eq!(email, "a@example.com");
                assert_eq!(password, "secret123");
            }
            _ => panic!("expected login credentials"),
        }
        assert!(matches!(
            extract_credentials(&headers("Basic !!!"), &uri).unwrap(),
            Credentials::Anonymous
        ));
    }

    #[test]
    fn query_and_path_tokens() {
        let empty = HeaderMap::new();
        let uri: Uri = "/api/v1/x?api_key=k1&apikey=k2".parse().unwrap();
        assert_eq!(token_of(extract_credentials(&empty, &uri).unwrap()).as_deref(), Some("k1"));

        let uri: Uri = "/api/v1/x?access_token=&apikey=k2".parse().unwrap();
        assert_eq!(token_of(extract_credentials(&empty, &uri).unwrap()).as_deref(), Some("k2"));

        let path_token = "a".repeat(30);
        let uri: Uri = format!("/api/v1/data-import/{}", path_token).parse().unwrap();
        assert_eq!(token_of(extract_credentials(&empty, &uri).unwrap()), Some(path_token));

        let uri: Uri = "/api/v1/data-import/short".parse().unwrap();
        assert!(token_of(extract_credentials(&empty, &uri).unwrap()).is_none());
    }

    fn get_with(uri: &str, authorization: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, authorization)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let state = test_state();
        let seeded = seed_admin(&state).await;
        let mut token = state.tokens.select_404(&seeded.token).await.unwrap();
        token.expires_utc = Some(Utc::now() - Duration::minutes(1));
        state.tokens.save(token).await.unwrap();
        let app = TestApp::new(state);

        let response = app.get("/api/v1/users/me", Some(&seeded.token)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["message"], "Token has expired");
    }

    #[tokio::test]
    async fn tokens_of_deleted_users_are_rejected() {
        let state = test_state();
        let seeded = seed_admin(&state).await;
        state.users.remove(&seeded.user.id).await.unwrap();
        let app = TestApp::new(state);

        let response = app.get("/api/v1/users/me", Some(&seeded.token)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_tokens_do_not_authenticate() {
        let state = test_state();
        let seeded = seed_admin(&state).await;
        let mut refresh = Token::new("r".repeat(40), TokenType::Authentication);
        refresh.user_id = Some(seeded.user.id.clone());
        refresh.organization_id = Some(seeded.organization.id.clone());
        let refresh = state.tokens.add(refresh).await.unwrap();
        let app = TestApp::new(state);

        let response = app.get("/api/v1/users/me", Some(&refresh.id)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["message"], "Invalid token");

        let unknown = app.get("/api/v1/users/me", Some("no-such-token")).await;
        assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn basic_login_checks_the_password() {
        let state = test_state();
        let seeded = seed_admin(&state).await;
        let app = TestApp::new(state);

        let ok = app
            .send(get_with("/api/v1/users/me", &basic(&seeded.user.email_address, TEST_PASSWORD)))
            .await;
        assert_eq!(ok.status, StatusCode::OK);
        assert_eq!(ok.data()["id"], seeded.user.id.as_str());

        let wrong = app
            .send(get_with("/api/v1/users/me", &basic(&seeded.user.email_address, "not-the-password")))
            .await;
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

        let stranger = app
            .send(get_with("/api/v1/users/me", &basic("nobody@example.com", TEST_PASSWORD)))
            .await;
        assert_eq!(stranger.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn undecodable_basic_header_continues_anonymously() {
        let app = TestApp::new(test_state());

        let public = app.send(get_with("/api/v1/version", "Basic !!!")).await;
        assert_eq!(public.status, StatusCode::OK);

        let protected = app.send(get_with("/api/v1/users/me", "Basic !!!")).await;
        assert_eq!(protected.status, StatusCode::UNAUTHORIZED);
        assert_eq!(protected.body["message"], "Authentication required");
    }

    #[tokio::test]
    async fn deleted_token_organization_is_ignored() {
        let state = test_state();
        let seeded = seed_admin(&state).await;
        let mut organization = state.organizations.select_404(&seeded.organization.id).await.unwrap();
        organization.is_deleted = true;
        state.organizations.save(organization).await.unwrap();
        let app = TestApp::new(state);

        let me = app.get("/api/v1/users/me", Some(&seeded.token)).await;
        assert_eq!(me.status, StatusCode::OK);

        let scoped = app.get("/api/v1/notifications", Some(&seeded.token)).await;
        assert_eq!(scoped.status, StatusCode::UNAUTHORIZED);
        assert_eq!(scoped.body["message"], "An organization must be selected");
    }

    #[test]
    fn guards_distinguish_anonymous_from_forbidden() {
        let anonymous = RequestContext::anonymous();
        assert_eq!(anonymous.require_user().unwrap_err().status_code(), 401);
        assert_eq!(anonymous.require_organization().unwrap_err().status_code(), 401);

        let mut user = User::new("Jo", "jo@example.com");
        user.id = "u1".into();
        user.added_membership_roles("o1", &roles::user_scope());
        let context = RequestContext {
            principal: Principal::from_user(&user, None),
            user: Some(user),
            organization: None,
        };
        assert!(context.require_user().is_ok());
        assert_eq!(context.require_admin().unwrap_err().status_code(), 403);
        assert_eq!(context.require_global_admin().unwrap_err().status_code(), 403);
        assert!(context.can_access_organization("o1"));
        assert!(!context.can_access_organization("o2"));
    }
}

// testing/mod.rs - In-process fixtures for unit and router tests
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use crate::auth::roles;
use crate::cache::{CacheClient, InMemoryCacheClient};
use crate::config::{AppConfig, StorageProvider};
use crate::database::models::{Model, Organization, User};
use crate::database::{DocumentStore, MemoryStore, Repository, RepositoryOptions};
use crate::database::models::{LogEvent, Notification, Token};
use crate::mail::InMemoryMailSender;
use crate::messaging::MessageBus;
use crate::state::AppState;

pub const TEST_PASSWORD: &str = "Password123";

/// A repository over a fresh memory store
pub fn test_repository<T: Model>() -> Repository<T> {
    Repository::new(
        Arc::new(MemoryStore::new()),
        Arc::new(InMemoryCacheClient::new()),
        MessageBus::default(),
        RepositoryOptions::default(),
    )
}

/// Repositories sharing one store, cache and bus
pub struct TestRepositories {
    pub store: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn CacheClient>,
    pub bus: MessageBus,
    pub users: Repository<User>,
    pub organizations: Repository<Organization>,
    pub tokens: Repository<Token>,
    pub notifications: Repository<Notification>,
    pub logs: Repository<LogEvent>,
}

impl TestRepositories {
    pub fn new() -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn CacheClient> = Arc::new(InMemoryCacheClient::new());
        let bus = MessageBus::default();
        let options = RepositoryOptions::default();
        Self {
            users: Repository::new(store.clone(), cache.clone(), bus.clone(), options.clone()),
            organizations: Repository::new(store.clone(), cache.clone(), bus.clone(), options.clone()),
            tokens: Repository::new(store.clone(), cache.clone(), bus.clone(), options.clone()),
            notifications: Repository::new(store.clone(), cache.clone(), bus.clone(), options.clone()),
            logs: Repository::new(store.clone(), cache.clone(), bus.clone(), options),
            store,
            cache,
            bus,
        }
    }

    pub async fn add_verified_user(&self, full_name: &str, email: &str) -> User {
        let mut user = User::new(full_name, email);
        user.mark_email_address_verified();
        user.set_password(TEST_PASSWORD);
        self.users.add(user).await.unwrap()
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.storage.provider = StorageProvider::Memory;
    config.settings.allowed_outbound_addresses = vec!["example.com".into()];
    config
}

/// Memory backed state plus the outbox its mail would land in
pub fn test_state_with(config: AppConfig) -> (AppState, Arc<InMemoryMailSender>) {
    let outbox = Arc::new(InMemoryMailSender::new());
    let state = AppState::build(config, Arc::new(MemoryStore::new()), outbox.clone());
    (state, outbox)
}

pub fn test_state() -> AppState {
    test_state_with(test_config()).0
}

/// A user, their organization and a session token
pub struct Seeded {
    pub user: User,
    pub organization: Organization,
    pub token: String,
}

/// Verified user holding `scope` in a new organization
pub async fn seed_member(state: &AppState, email: &str, organization: Option<&Organization>, admin: bool) -> Seeded {
    let organization = match organization {
        Some(o) => o.clone(),
        None => state.organizations.add(Organization::new("Acme")).await.unwrap(),
    };
    let mut user = User::new(email.split('@').next().unwrap_or(email), email);
    user.mark_email_address_verified();
    user.set_password(TEST_PASSWORD);
    let scope = if admin { roles::admin_scope() } else { roles::user_scope() };
    user.added_membership_roles(&organization.id, &scope);
    let user = state.users.add(user).await.unwrap();
    let token = state.user_token(&user.id, Some(&organization.id)).await.unwrap();
    Seeded {
        user,
        organization,
        token,
    }
}

pub async fn seed_admin(state: &AppState) -> Seeded {
    seed_member(state, "admin@example.com", None, true).await
}

pub async fn seed_global_admin(state: &AppState) -> Seeded {
    let seeded = seed_member(state, "root@example.com", None, true).await;
    let mut user = seeded.user;
    user.added_global_admin_role();
    let user = state.users.save(user).await.unwrap();
    Seeded { user, ..seeded }
}

/// Drives a router in-process
pub struct TestApp {
    pub state: AppState,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `data` member of a success envelope
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

impl TestApp {
    pub fn new(state: AppState) -> Self {
        Self {
            router: crate::app::router(state.clone()),
            state,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Sends a prepared request, for tests that need their own headers
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, token, None).await
    }
}

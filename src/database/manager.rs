use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use super::models::ValidationErrors;
use crate::config::StorageConfig;
use crate::filter::error::FilterError;

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed")]
    Validation(ValidationErrors),

    #[error("Version conflict on {collection} '{id}'")]
    VersionConflict { collection: String, id: String },

    #[error("Duplicate document: {0}")]
    DuplicateDocument(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pools shared by every Postgres backed store, keyed by database URL
pub struct DatabaseManager {
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
}

impl DatabaseManager {
    fn instance() -> &'static DatabaseManager {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<DatabaseManager> = OnceLock::new();
        INSTANCE.get_or_init(|| DatabaseManager {
            pools: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Pool for the configured storage database
    pub async fn pool(storage: &StorageConfig) -> Result<PgPool, DatabaseError> {
        let url = storage
            .database_url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let url = Self::normalize_url(url)?;
        Self::instance()
            .get_pool(&url, storage.max_connections, storage.connection_timeout)
            .await
    }

    /// Get existing pool or create a new one lazily
    async fn get_pool(
        &self,
        url: &str,
        max_connections: u32,
        connection_timeout: u64,
    ) -> Result<PgPool, DatabaseError> {
        // Fast path: try read lock
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(url) {
                return Ok(pool.clone());
            }
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connection_timeout))
            .connect(url)
            .await?;

        {
            let mut pools = self.pools.write().await;
            pools.insert(url.to_string(), pool.clone());
        }

        info!("Created database pool for: {}", Self::redacted(url));
        Ok(pool)
    }

    fn normalize_url(url: &str) -> Result<String, DatabaseError> {
        let parsed = url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        match parsed.scheme() {
            "postgres" | "postgresql" => {}
            _ => return Err(DatabaseError::InvalidDatabaseUrl),
        }
        if parsed.path().trim_start_matches('/').is_empty() {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }
        Ok(parsed.into())
    }

    /// Database URL with the password removed, for logging
    fn redacted(url: &str) -> String {
        match url::Url::parse(url) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.into()
            }
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all() {
        let manager = Self::instance();
        let mut pools = manager.pools.write().await;
        for (url, pool) in pools.drain() {
            pool.close().await;
            info!("Closed database pool: {}", Self::redacted(&url));
        }
    }
}

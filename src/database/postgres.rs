use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;

use super::store::DocumentStore;
use super::DatabaseError;

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT        NOT NULL,
    id          TEXT        NOT NULL,
    data        JSONB       NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, id)
)"#;

const CREATE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS documents_data_idx ON documents USING GIN (data jsonb_path_ops)";

/// Document store backed by a single Postgres `documents` table
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the documents table and its containment index when missing
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX_SQL).execute(&self.pool).await?;
        info!("Document storage schema ready");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DatabaseError> {
        let row = sqlx::query_scalar::<_, Value>(
            "SELECT data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Value>, DatabaseError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query_scalar::<_, Value>(
            "SELECT data FROM documents WHERE collection = $1 AND id = ANY($2)",
        )
        .bind(collection)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find(&self, collection: &str, pattern: &Value) -> Result<Vec<Value>, DatabaseError> {
        let rows = sqlx::query_scalar::<_, Value>(
            "SELECT data FROM documents WHERE collection = $1 AND data @> $2 ORDER BY id",
        )
        .bind(collection)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count(&self, collection: &str, pattern: &Value) -> Result<u64, DatabaseError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM documents WHERE collection = $1 AND data @> $2",
        )
        .bind(collection)
        .bind(pattern)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.max(0) as u64)
    }

    async fn insert(&self, collection: &str, id: &str, document: Value) -> Result<(), DatabaseError> {
        let result = sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(id)
            .bind(&document)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(DatabaseError::DuplicateDocument(format!("{}/{}", collection, id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<i64>,
        document: Value,
    ) -> Result<bool, DatabaseError> {
        let result = match expected_version {
            Some(expected) => {
                sqlx::query(
                    "UPDATE documents SET data = $3, updated_at = now() \
                     WHERE collection = $1 AND id = $2 \
                     AND COALESCE((data->>'version')::bigint, 0) = $4",
                )
                .bind(collection)
                .bind(id)
                .bind(&document)
                .bind(expected)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "UPDATE documents SET data = $3, updated_at = now() \
                     WHERE collection = $1 AND id = $2",
                )
                .bind(collection)
                .bind(id)
                .bind(&document)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
        )
        .bind(collection)
        .bind(id)
        .bind(&document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, collection: &str, ids: &[String]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = ANY($2)")
            .bind(collection)
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

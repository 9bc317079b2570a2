use async_trait::async_trait;
use serde_json::Value;

use super::DatabaseError;

/// JSON document storage, one logical collection per model.
///
/// Documents are stored whole; `find` matches by containment: every key of an
/// object pattern must be contained in the document's value for that key, every
/// element of an array pattern must be contained in some element of the
/// document's array, and scalars must be equal.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DatabaseError>;

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Value>, DatabaseError>;

    async fn find(&self, collection: &str, pattern: &Value) -> Result<Vec<Value>, DatabaseError>;

    async fn count(&self, collection: &str, pattern: &Value) -> Result<u64, DatabaseError>;

    /// Fails with `DuplicateDocument` when the id is taken
    async fn insert(&self, collection: &str, id: &str, document: Value) -> Result<(), DatabaseError>;

    /// Replaces an existing document. When `expected_version` is set the stored
    /// `version` must equal it. Returns false when nothing was replaced.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<i64>,
        document: Value,
    ) -> Result<bool, DatabaseError>;

    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<(), DatabaseError>;

    async fn remove(&self, collection: &str, ids: &[String]) -> Result<u64, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

/// In-process equivalent of Postgres `jsonb @>`
pub fn json_contains(document: &Value, pattern: &Value) -> bool {
    match (document, pattern) {
        (Value::Object(doc), Value::Object(pat)) => pat
            .iter()
            .all(|(key, p)| doc.get(key).is_some_and(|d| json_contains(d, p))),
        (Value::Array(doc), Value::Array(pat)) => pat
            .iter()
            .all(|p| doc.iter().any(|d| json_contains(d, p))),
        // A scalar pattern matches an array holding it
        (Value::Array(doc), p) if !p.is_object() => doc.iter().any(|d| d == p),
        (d, p) => d == p,
    }
}

/// Version stored on a document, 0 when absent
pub fn document_version(document: &Value) -> i64 {
    document.get("version").and_then(Value::as_i64).unwrap_or(0)
}

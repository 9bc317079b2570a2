use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::store::{document_version, json_contains, DocumentStore};
use super::DatabaseError;

type Collection = BTreeMap<String, Value>;

/// Document store held in process memory. Used for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DatabaseError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Value>, DatabaseError> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(vec![]);
        };
        Ok(ids.iter().filter_map(|id| documents.get(id).cloned()).collect())
    }

    async fn find(&self, collection: &str, pattern: &Value) -> Result<Vec<Value>, DatabaseError> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(vec![]);
        };
        Ok(documents
            .values()
            .filter(|doc| json_contains(doc, pattern))
            .cloned()
            .collect())
    }

    async fn count(&self, collection: &str, pattern: &Value) -> Result<u64, DatabaseError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.values().filter(|doc| json_contains(doc, pattern)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert(&self, collection: &str, id: &str, document: Value) -> Result<(), DatabaseError> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();
        if documents.contains_key(id) {
            return Err(DatabaseError::DuplicateDocument(format!("{}/{}", collection, id)));
        }
        documents.insert(id.to_string(), document);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<i64>,
        document: Value,
    ) -> Result<bool, DatabaseError> {
        let mut collections = self.collections.write().await;
        let Some(existing) = collections.get_mut(collection).and_then(|c| c.get_mut(id)) else {
            return Ok(false);
        };
        if let Some(expected) = expected_version {
            if document_version(existing) != expected {
                return Ok(false);
            }
        }
        *existing = document;
        Ok(true)
    }

    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<(), DatabaseError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn remove(&self, collection: &str, ids: &[String]) -> Result<u64, DatabaseError> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| documents.remove(*id).is_some()).count() as u64)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = MemoryStore::new();
        store.insert("organization", "1", json!({"id": "1"})).await.unwrap();
        let err = store.insert("organization", "1", json!({"id": "1"})).await.unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateDocument(_)));
    }

    #[tokio::test]
    async fn update_checks_expected_version() {
        let store = MemoryStore::new();
        store
            .insert("organization", "1", json!({"id": "1", "version": 2}))
            .await
            .unwrap();

        let stale = store
            .update("organization", "1", Some(1), json!({"id": "1", "version": 2}))
            .await
            .unwrap();
        assert!(!stale);

        let ok = store
            .update("organization", "1", Some(2), json!({"id": "1", "version": 3}))
            .await
            .unwrap();
        assert!(ok);
        let doc = store.get("organization", "1").await.unwrap().unwrap();
        assert_eq!(doc["version"], 3);

        assert!(!store.update("organization", "missing", None, json!({})).await.unwrap());
    }

    #[tokio::test]
    async fn find_and_remove() {
        let store = MemoryStore::new();
        store.upsert("token", "a", json!({"organization_id": "o1"})).await.unwrap();
        store.upsert("token", "b", json!({"organization_id": "o2"})).await.unwrap();

        let found = store.find("token", &json!({"organization_id": "o1"})).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(store.count("token", &json!({})).await.unwrap(), 2);

        let removed = store.remove("token", &["a".into(), "zzz".into()]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("token", "a").await.unwrap().is_none());
    }
}

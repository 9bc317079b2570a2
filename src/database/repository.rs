use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::models::{new_object_id, Model};
use super::store::DocumentStore;
use super::DatabaseError;
use crate::cache::CacheClient;
use crate::filter::{Facets, Filter, FilterData};
use crate::messaging::{Message, MessageBus};
use crate::types::ChangeType;

#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    pub use_cache: bool,
    pub cache_ttl: Duration,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FindResults<T> {
    pub documents: Vec<T>,
    pub total: u64,
    pub has_more: bool,
    pub page: u32,
    pub facets: Facets,
}

impl<T> FindResults<T> {
    pub fn map<V>(self, f: impl FnMut(T) -> V) -> FindResults<V> {
        FindResults {
            documents: self.documents.into_iter().map(f).collect(),
            total: self.total,
            has_more: self.has_more,
            page: self.page,
            facets: self.facets,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CountResult {
    pub total: u64,
    #[serde(skip_serializing_if = "Facets::is_empty")]
    pub facets: Facets,
}

/// Typed access to one collection of a document store, with caching and change messages
pub struct Repository<T: Model> {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) cache: Arc<dyn CacheClient>,
    pub(crate) bus: MessageBus,
    options: RepositoryOptions,
    _phantom: PhantomData<T>,
}

impl<T: Model> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            bus: self.bus.clone(),
            options: self.options.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: Model> Repository<T> {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn CacheClient>,
        bus: MessageBus,
        options: RepositoryOptions,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            options,
            _phantom: PhantomData,
        }
    }

    pub fn collection(&self) -> &'static str {
        T::COLLECTION
    }

    fn cache_key(id: &str) -> String {
        format!("{}:{}", T::COLLECTION, id)
    }

    pub(crate) fn from_document(document: Value) -> Result<T, DatabaseError> {
        Ok(serde_json::from_value(document)?)
    }

    pub async fn select_one(&self, id: &str, use_cache: bool) -> Result<Option<T>, DatabaseError> {
        if id.trim().is_empty() {
            return Ok(None);
        }

        let use_cache = use_cache && self.options.use_cache;
        let key = Self::cache_key(id);
        if use_cache {
            if let Some(cached) = self.cache.get(&key).await {
                match serde_json::from_value(cached) {
                    Ok(model) => return Ok(Some(model)),
                    Err(e) => debug!("Discarding unreadable cache entry {}: {}", key, e),
                }
            }
        }

        let Some(document) = self.store.get(T::COLLECTION, id).await? else {
            return Ok(None);
        };
        if use_cache {
            self.cache
                .set(&key, document.clone(), Some(self.options.cache_ttl))
                .await;
        }
        Self::from_document(document).map(Some)
    }

    pub async fn select_404(&self, id: &str) -> Result<T, DatabaseError> {
        self.select_one(id, true)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("{} '{}' not found", T::COLLECTION, id)))
    }

    /// Models for the ids that exist, in the order given
    pub async fn select_ids(&self, ids: &[String], use_cache: bool) -> Result<Vec<T>, DatabaseError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        if use_cache && self.options.use_cache {
            let mut models = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(model) = self.select_one(id, true).await? {
                    models.push(model);
                }
            }
            return Ok(models);
        }

        let mut models = self
            .store
            .get_many(T::COLLECTION, ids)
            .await?
            .into_iter()
            .map(Self::from_document)
            .collect::<Result<Vec<T>, _>>()?;
        models.sort_by_key(|m| ids.iter().position(|id| id == m.id()));
        Ok(models)
    }

    async fn find_documents(&self, filter: &FilterData) -> Result<Vec<Value>, DatabaseError> {
        let pattern = filter.pattern.clone().unwrap_or_else(|| json!({}));
        let mut documents = self.store.find(T::COLLECTION, &pattern).await?;
        if T::SOFT_DELETE && !filter.include_deleted {
            documents.retain(|d| !d.get("is_deleted").and_then(Value::as_bool).unwrap_or(false));
        }
        Ok(documents)
    }

    pub async fn select_any(&self, filter: &FilterData) -> Result<FindResults<T>, DatabaseError> {
        self.select_any_where(filter, |_| true).await
    }

    /// Like `select_any`, with an extra predicate applied to raw documents before
    /// search terms and paging. Used for conditions containment cannot express.
    pub async fn select_any_where<F>(&self, filter: &FilterData, keep: F) -> Result<FindResults<T>, DatabaseError>
    where
        F: Fn(&Value) -> bool + Send,
    {
        let mut documents = self.find_documents(filter).await?;
        documents.retain(|d| keep(d));
        let mut query = Filter::new(T::COLLECTION)?;
        query.assign(filter)?;
        let result = query.apply(documents);

        let page = filter.page.unwrap_or(1).max(1);
        let returned = result.documents.len() as u64;
        let has_more = match filter.limit {
            Some(limit) => (page as u64 - 1) * limit as u64 + returned < result.total,
            None => false,
        };

        Ok(FindResults {
            documents: result
                .documents
                .into_iter()
                .map(Self::from_document)
                .collect::<Result<Vec<T>, _>>()?,
            total: result.total,
            has_more,
            page,
            facets: result.facets,
        })
    }

    /// Every document containing `pattern`
    pub async fn select_all(&self, pattern: Value) -> Result<Vec<T>, DatabaseError> {
        let filter = FilterData::default().with_pattern(pattern);
        Ok(self.select_any(&filter).await?.documents)
    }

    pub async fn find_first(&self, pattern: Value) -> Result<Option<T>, DatabaseError> {
        Ok(self.select_all(pattern).await?.into_iter().next())
    }

    pub async fn count(&self, filter: &FilterData) -> Result<CountResult, DatabaseError> {
        self.count_where(filter, |_| true).await
    }

    pub async fn count_where<F>(&self, filter: &FilterData, keep: F) -> Result<CountResult, DatabaseError>
    where
        F: Fn(&Value) -> bool + Send,
    {
        let mut documents = self.find_documents(filter).await?;
        documents.retain(|d| keep(d));
        let mut query = Filter::new(T::COLLECTION)?;
        query.assign(&FilterData {
            page: None,
            limit: None,
            sort: None,
            ..filter.clone()
        })?;
        let result = query.apply(documents);
        Ok(CountResult {
            total: result.total,
            facets: result.facets,
        })
    }

    pub async fn add(&self, mut model: T) -> Result<T, DatabaseError> {
        if model.id().is_empty() {
            model.set_id(new_object_id());
        }
        let now = Utc::now();
        model.set_created_utc(now);
        model.set_updated_utc(now);
        if T::VERSIONED {
            model.set_version(1);
        }
        model.normalize();
        model.validate().map_err(DatabaseError::Validation)?;

        let document = serde_json::to_value(&model)?;
        self.store.insert(T::COLLECTION, model.id(), document).await?;
        self.invalidate(&model).await;
        self.publish(&model, ChangeType::Added);
        debug!("Added {} {}", T::COLLECTION, model.id());
        Ok(model)
    }

    /// Saves with optimistic versioning: a versioned model must still carry the
    /// stored version, otherwise `VersionConflict`.
    pub async fn save(&self, mut model: T) -> Result<T, DatabaseError> {
        if model.id().is_empty() {
            return Err(DatabaseError::NotFound(format!("{} without id", T::COLLECTION)));
        }

        let expected_version = T::VERSIONED.then(|| model.version());
        if let Some(version) = expected_version {
            model.set_version(version + 1);
        }
        model.set_updated_utc(Utc::now());
        model.normalize();
        model.validate().map_err(DatabaseError::Validation)?;

        let document = serde_json::to_value(&model)?;
        let updated = self
            .store
            .update(T::COLLECTION, model.id(), expected_version, document)
            .await?;

        if !updated {
            let exists = self.store.get(T::COLLECTION, model.id()).await?.is_some();
            return Err(if exists {
                DatabaseError::VersionConflict {
                    collection: T::COLLECTION.to_string(),
                    id: model.id().to_string(),
                }
            } else {
                DatabaseError::NotFound(format!("{} '{}' not found", T::COLLECTION, model.id()))
            });
        }

        self.invalidate(&model).await;
        self.publish(&model, ChangeType::Saved);
        Ok(model)
    }

    pub async fn save_all(&self, models: Vec<T>) -> Result<Vec<T>, DatabaseError> {
        let mut saved = Vec::with_capacity(models.len());
        for model in models {
            saved.push(self.save(model).await?);
        }
        Ok(saved)
    }

    /// Hard delete. Returns false when the document did not exist.
    pub async fn remove(&self, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.remove_all(&[id.to_string()]).await? > 0)
    }

    pub async fn remove_all(&self, ids: &[String]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let existing = self.select_ids(ids, false).await?;
        let removed = self.store.remove(T::COLLECTION, ids).await?;
        for model in &existing {
            self.invalidate(model).await;
            self.publish(model, ChangeType::Removed);
        }
        Ok(removed)
    }

    /// Best effort: drop the primary and secondary cache keys of a model
    pub async fn invalidate(&self, model: &T) {
        let mut keys = model.secondary_cache_keys();
        keys.push(Self::cache_key(model.id()));
        self.cache.remove_all(&keys).await;
    }

    fn publish(&self, model: &T, change_type: ChangeType) {
        self.bus.publish(Message::EntityChanged {
            entity_type: T::COLLECTION.to_string(),
            id: model.id().to_string(),
            organization_id: model.organization_id().map(str::to_string),
            change_type,
        });
    }
}

// api/controller.rs - Generic read and write flows shared by the resource handlers
//
// A resource is a short lived value built per request from the shared state and the
// caller's RequestContext. Handlers construct one and call the flow they need; the
// hooks below let each resource narrow visibility, map views and guard writes.
use async_trait::async_trait;
use axum::http::Uri;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::paging::{check_window, get_limit, get_page, has_more_pages, link_header, PageQuery};
use super::permission::{ModelActionResults, PermissionResult};
use crate::database::models::Model;
use crate::database::{CountResult, FindResults, Repository};
use crate::error::ApiError;
use crate::filter::{facets::parse_facets, FilterData};
use crate::json_patch::{JsonPatcher, PatchDocument};
use crate::middleware::{ApiResponse, ApiResult, RequestContext};

/// Total match count of a page request
pub const RESULT_COUNT: &str = "x-result-count";

/// Search term that lets a global admin query outside the selected organization
pub const ORGANIZATION_FILTER: &str = "organization_id:";

pub fn has_organization_filter(search: Option<&str>) -> bool {
    search.is_some_and(|s| s.contains(ORGANIZATION_FILTER))
}

/// `?version=` on PATCH and PUT; a stale version fails the save with 409
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct VersionQuery {
    pub version: Option<i64>,
}

/// Removes `data` members whose keys start with `-` or `@`
pub fn remove_sensitive_data(view: &mut Value) {
    if let Some(data) = view.get_mut("data").and_then(Value::as_object_mut) {
        data.retain(|key, _| !key.starts_with('-') && !key.starts_with('@'));
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| {
        error!("Failed to serialize view: {}", e);
        ApiError::internal_server_error("Failed to serialize response data")
    })
}

#[async_trait]
pub trait ReadOnlyResource: Send + Sync {
    type Model: Model;
    type View: Serialize + Send;

    fn repository(&self) -> &Repository<Self::Model>;
    fn context(&self) -> &RequestContext;
    fn map_view(&self, model: &Self::Model) -> Self::View;

    /// Organization scoped models are only visible inside the selected organization
    fn is_visible(&self, model: &Self::Model) -> bool {
        if !Self::Model::ORGANIZATION_SCOPED {
            return true;
        }
        match (model.organization_id(), self.context().selected_organization_id()) {
            (Some(owner), Some(selected)) => owner == selected,
            _ => false,
        }
    }

    async fn get_model(&self, id: &str, use_cache: bool) -> Result<Option<Self::Model>, ApiError> {
        if id.trim().is_empty() {
            return Ok(None);
        }
        let model = self.repository().select_one(id, use_cache).await?;
        Ok(model.filter(|m| self.is_visible(m)))
    }

    async fn get_models(&self, ids: &[String], use_cache: bool) -> Result<Vec<Self::Model>, ApiError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let mut models = self.repository().select_ids(ids, use_cache).await?;
        models.retain(|m| self.is_visible(m));
        Ok(models)
    }

    /// Restrictions applied to every list and count query
    fn system_filter(&self, search: Option<&str>) -> FilterData {
        let filter = FilterData::default();
        if !Self::Model::ORGANIZATION_SCOPED {
            return filter;
        }
        if has_organization_filter(search) && self.context().is_global_admin() {
            return filter;
        }
        let organization_id = self.context().selected_organization_id().unwrap_or_default();
        filter.with_pattern(json!({ "organization_id": organization_id }))
    }

    /// Runs a list query. Resources backed by a specialised repository query override this.
    async fn find(&self, filter: FilterData) -> Result<FindResults<Self::Model>, ApiError> {
        Ok(self.repository().select_any(&filter).await?)
    }

    async fn count_matching(&self, filter: FilterData) -> Result<CountResult, ApiError> {
        Ok(self.repository().count(&filter).await?)
    }

    fn after_result_map(&self, view: &mut Value) {
        remove_sensitive_data(view);
    }

    /// Serialized view with sensitive data removed
    fn view(&self, model: &Self::Model) -> Result<Value, ApiError> {
        let mut value = to_json(&self.map_view(model))?;
        self.after_result_map(&mut value);
        Ok(value)
    }

    fn summary(&self, model: &Self::Model) -> Result<Value, ApiError> {
        self.view(model)
    }

    async fn get_by_id(&self, id: &str) -> ApiResult<Value> {
        let model = self
            .get_model(id, true)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("{} '{}' not found", Self::Model::COLLECTION, id)))?;
        Ok(ApiResponse::success(self.view(&model)?))
    }

    /// One page of results with `Link` and `X-Result-Count` headers
    async fn get_page(&self, query: &PageQuery, uri: &Uri) -> ApiResult<Value> {
        let page = get_page(query.page);
        let limit = get_limit(query.limit);
        check_window(page, limit)?;

        let search = query.search();
        let facets = match query.facet.as_deref() {
            Some(spec) => parse_facets(spec)?,
            None => vec![],
        };
        let mut filter = self
            .system_filter(search.as_deref())
            .with_query(search)
            .with_paging(page, limit);
        if let Some(sort) = query.sort.as_deref().filter(|s| !s.trim().is_empty()) {
            filter = filter.with_sort(sort);
        }
        filter.facets = facets;

        let results = self.find(filter).await?;
        debug!(
            "Found {} of {} {} documents on page {}",
            results.documents.len(),
            results.total,
            Self::Model::COLLECTION,
            page
        );

        let summary = query.is_summary();
        let has_more = if summary {
            results.has_more
        } else {
            has_more_pages(results.has_more, page, limit)
        };
        let views = results
            .documents
            .iter()
            .map(|m| if summary { self.summary(m) } else { self.view(m) })
            .collect::<Result<Vec<Value>, ApiError>>()?;

        let data = if query.facet.is_some() {
            json!({ "results": views, "facets": results.facets })
        } else {
            Value::Array(views)
        };

        let mut response = ApiResponse::success(data).header(RESULT_COUNT, results.total.to_string());
        if let Some(links) = link_header(uri.path(), uri.query(), page, has_more) {
            response = response.header("Link", links);
        }
        Ok(response)
    }

    async fn get_count(&self, query: &PageQuery) -> ApiResult<CountResult> {
        let search = query.search();
        let mut filter = self.system_filter(search.as_deref()).with_query(search);
        if let Some(spec) = query.facet.as_deref() {
            filter.facets = parse_facets(spec)?;
        }
        Ok(ApiResponse::success(self.count_matching(filter).await?))
    }
}

/// Write flows on top of `ReadOnlyResource`.
///
/// `UpdateModel` is the subset of fields a client may change. PATCH documents are
/// applied to the serialized `UpdateModel`, never to the stored document.
#[async_trait]
pub trait RepositoryResource: ReadOnlyResource {
    type UpdateModel: Serialize + DeserializeOwned + Send;

    fn to_update_model(&self, model: &Self::Model) -> Self::UpdateModel;
    fn apply_update_model(&self, update: Self::UpdateModel, model: &mut Self::Model);

    async fn can_update(&self, original: &Self::Model, modified: &Self::Model) -> Result<PermissionResult, ApiError> {
        if original.id() != modified.id() {
            return Ok(PermissionResult::deny_with_message("Id must match resource."));
        }
        if let Some(id) = original.organization_id() {
            if !self.context().can_access_organization(id) {
                return Ok(PermissionResult::deny_with_message("Invalid organization id specified."));
            }
        }
        if original.organization_id() != modified.organization_id() {
            return Ok(PermissionResult::deny_with_message("Invalid organization id specified."));
        }
        Ok(PermissionResult::allow())
    }

    async fn update_model(&self, modified: Self::Model) -> Result<Self::Model, ApiError> {
        Ok(self.repository().save(modified).await?)
    }

    async fn after_update(&self, modified: Self::Model, _original: &Self::Model) -> Result<Self::Model, ApiError> {
        Ok(modified)
    }

    async fn can_delete(&self, model: &Self::Model) -> Result<PermissionResult, ApiError> {
        match model.organization_id() {
            Some(id) if !self.context().can_access_organization(id) => {
                Ok(PermissionResult::deny_with_not_found(model.id()))
            }
            _ => Ok(PermissionResult::allow()),
        }
    }

    /// Soft deletes when the model supports it, otherwise removes
    async fn delete_models(&self, models: Vec<Self::Model>) -> Result<Vec<Self::Model>, ApiError> {
        if Self::Model::SOFT_DELETE {
            let models = models
                .into_iter()
                .map(|mut m| {
                    m.set_deleted(true);
                    m
                })
                .collect();
            return Ok(self.repository().save_all(models).await?);
        }
        let ids: Vec<String> = models.iter().map(|m| m.id().to_string()).collect();
        self.repository().remove_all(&ids).await?;
        Ok(models)
    }

    async fn after_delete(&self, _model: &Self::Model) -> Result<(), ApiError> {
        Ok(())
    }

    async fn undelete_models(&self, models: Vec<Self::Model>) -> Result<Vec<Self::Model>, ApiError> {
        let models = models
            .into_iter()
            .map(|mut m| {
                m.set_deleted(false);
                m
            })
            .collect();
        Ok(self.repository().save_all(models).await?)
    }

    async fn after_undelete(&self, _model: &Self::Model) -> Result<(), ApiError> {
        Ok(())
    }

    /// PATCH - applies a JSON Patch document to the update model
    async fn patch(&self, id: &str, changes: Value, version: Option<i64>) -> ApiResult<Value> {
        let original = self
            .get_model(id, false)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("{} '{}' not found", Self::Model::COLLECTION, id)))?;

        let changes = PatchDocument::from_value(changes)?;
        if changes.is_empty() {
            return Ok(ApiResponse::success(self.view(&original)?));
        }

        let mut modified = original.clone();
        if let Some(version) = version.filter(|_| Self::Model::VERSIONED) {
            modified.set_version(version);
        }

        let mut target = to_json(&self.to_update_model(&modified))?;
        JsonPatcher::new().patch(&mut target, &changes)?;
        let update: Self::UpdateModel = serde_json::from_value(target)
            .map_err(|e| ApiError::validation_error(format!("Invalid update: {}", e), None))?;
        self.apply_update_model(update, &mut modified);

        self.save_modified(original, modified).await
    }

    /// PUT - replaces the updatable fields with the body
    async fn put(&self, id: &str, body: Value, version: Option<i64>) -> ApiResult<Value> {
        let original = self
            .get_model(id, false)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("{} '{}' not found", Self::Model::COLLECTION, id)))?;

        // Fields missing from the body keep their current values
        let mut target = to_json(&self.to_update_model(&original))?;
        if let (Some(target), Value::Object(body)) = (target.as_object_mut(), body) {
            for (key, value) in body {
                if target.contains_key(&key) {
                    target.insert(key, value);
                }
            }
        }
        let update: Self::UpdateModel = serde_json::from_value(target)
            .map_err(|e| ApiError::validation_error(format!("Invalid update: {}", e), None))?;

        let mut modified = original.clone();
        self.apply_update_model(update, &mut modified);
        if let Some(version) = version.filter(|_| Self::Model::VERSIONED) {
            modified.set_version(version);
        }

        self.save_modified(original, modified).await
    }

    async fn save_modified(&self, original: Self::Model, modified: Self::Model) -> ApiResult<Value> {
        let permission = self.can_update(&original, &modified).await?;
        if !permission.allowed {
            return Err(permission.into());
        }

        let modified = self.update_model(modified).await?;
        let modified = self.after_update(modified, &original).await?;
        Ok(ApiResponse::success(self.view(&modified)?))
    }

    /// DELETE of a single document - returns the deleted view
    async fn delete(&self, id: &str) -> ApiResult<Value> {
        let model = self
            .get_model(id, false)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("{} '{}' not found", Self::Model::COLLECTION, id)))?;

        let permission = self.can_delete(&model).await?;
        if !permission.allowed {
            return Err(permission.into());
        }

        let deleted = self.delete_models(vec![model]).await?;
        for model in &deleted {
            self.after_delete(model).await?;
        }
        let model = deleted
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::internal_server_error("Delete returned no document"))?;
        Ok(ApiResponse::success(self.view(&model)?))
    }

    /// DELETE of many documents - 204, or 400 with per-id results when any failed
    async fn delete_many(&self, ids: &[String]) -> ApiResult<()> {
        let (items, results) = self.partition_permitted(ids).await?;
        let deleted = self.delete_models(items).await?;
        for model in &deleted {
            self.after_delete(model).await?;
        }
        finish_bulk(results, &deleted)
    }

    async fn undelete(&self, id: &str) -> ApiResult<Value> {
        if !Self::Model::SOFT_DELETE {
            return Err(ApiError::bad_request("This resource does not support undelete"));
        }
        let model = self
            .get_model(id, false)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("{} '{}' not found", Self::Model::COLLECTION, id)))?;

        let permission = self.can_delete(&model).await?;
        if !permission.allowed {
            return Err(permission.into());
        }

        let restored = self.undelete_models(vec![model]).await?;
        for model in &restored {
            self.after_undelete(model).await?;
        }
        let model = restored
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::internal_server_error("Undelete returned no document"))?;
        Ok(ApiResponse::success(self.view(&model)?))
    }

    async fn undelete_many(&self, ids: &[String]) -> ApiResult<()> {
        if !Self::Model::SOFT_DELETE {
            return Err(ApiError::bad_request("This resource does not support undelete"));
        }
        let (items, results) = self.partition_permitted(ids).await?;
        let restored = self.undelete_models(items).await?;
        for model in &restored {
            self.after_undelete(model).await?;
        }
        finish_bulk(results, &restored)
    }

    /// Splits `ids` into models the caller may delete and per-id failures.
    /// Errors when nothing is left to act on.
    async fn partition_permitted(&self, ids: &[String]) -> Result<(Vec<Self::Model>, ModelActionResults), ApiError> {
        let models = self.get_models(ids, false).await?;
        if models.is_empty() {
            return Err(ApiError::not_found("No matching documents were found"));
        }

        let mut results = ModelActionResults::default();
        for id in ids {
            if !models.iter().any(|m| m.id() == id) {
                results.add_not_found(id.clone());
            }
        }

        let mut items = Vec::with_capacity(models.len());
        for model in models {
            let permission = self.can_delete(&model).await?;
            if permission.allowed {
                items.push(model);
            } else {
                results.add_failure(permission.for_id(model.id()));
            }
        }

        if items.is_empty() {
            if results.failure.len() == 1 {
                let failure = results.failure.remove(0);
                return Err(failure.into());
            }
            return Err(ApiError::partial_failure("None of the documents could be processed", results));
        }
        Ok((items, results))
    }
}

/// Resources that accept new documents. `NewModel` is what a client may send.
#[async_trait]
pub trait CreateResource: RepositoryResource {
    type NewModel: DeserializeOwned + Send;

    fn map_new(&self, value: Self::NewModel) -> Result<Self::Model, ApiError>;

    async fn can_add(&self, model: &Self::Model) -> Result<PermissionResult, ApiError> {
        match model.organization_id() {
            Some(id) if Self::Model::ORGANIZATION_SCOPED && !self.context().can_access_organization(id) => {
                Ok(PermissionResult::deny_with_message("Invalid organization id specified."))
            }
            None if Self::Model::ORGANIZATION_SCOPED => {
                Ok(PermissionResult::deny_with_message("Invalid organization id specified."))
            }
            _ => Ok(PermissionResult::allow()),
        }
    }

    async fn add_model(&self, model: Self::Model) -> Result<Self::Model, ApiError> {
        Ok(self.repository().add(model).await?)
    }

    async fn after_add(&self, model: Self::Model) -> Result<Self::Model, ApiError> {
        Ok(model)
    }

    /// POST - 201 with the created view
    async fn post(&self, value: Self::NewModel) -> ApiResult<Value> {
        let mut model = self.map_new(value)?;
        if Self::Model::ORGANIZATION_SCOPED {
            if let Some(id) = self.context().selected_organization_id() {
                model.set_organization_id(id.to_string());
            }
        }

        let permission = self.can_add(&model).await?;
        if !permission.allowed {
            return Err(permission.into());
        }

        let model = self.add_model(model).await?;
        let model = self.after_add(model).await?;
        Ok(ApiResponse::created(self.view(&model)?))
    }
}

fn finish_bulk<M: Model>(mut results: ModelActionResults, processed: &[M]) -> ApiResult<()> {
    if !results.has_failures() {
        return Ok(ApiResponse::no_content());
    }
    for model in processed {
        results.add_success(model.id());
    }
    Err(ApiError::partial_failure("Some documents could not be processed", results))
}

/// Splits a comma separated id list
pub fn parse_ids(ids: &str) -> Vec<String> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

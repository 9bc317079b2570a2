use serde_json::{json, Value};

use crate::database::models::Notification;
use crate::database::repository::{FindResults, Repository};
use crate::database::DatabaseError;
use crate::filter::FilterData;

/// Addressed to the user, or to nobody in particular
fn visible_to(document: &Value, user_id: &str) -> bool {
    match document.get("user_id") {
        None | Some(Value::Null) => true,
        Some(Value::String(u)) => u.is_empty() || u == user_id,
        Some(_) => false,
    }
}

fn read_by(document: &Value, user_id: &str) -> bool {
    document
        .get("readers")
        .and_then(Value::as_array)
        .is_some_and(|readers| readers.iter().any(|r| r.as_str() == Some(user_id)))
}

impl Repository<Notification> {
    /// Newest first
    pub async fn accessible(
        &self,
        organization_id: &str,
        user_id: &str,
        filter: FilterData,
    ) -> Result<FindResults<Notification>, DatabaseError> {
        let filter = filter
            .with_pattern(json!({ "organization_id": organization_id }))
            .with_sort("-created_utc");
        self.select_any_where(&filter, |d| visible_to(d, user_id)).await
    }

    pub async fn unread_count(&self, organization_id: &str, user_id: &str) -> Result<u64, DatabaseError> {
        let filter = FilterData::default().with_pattern(json!({ "organization_id": organization_id }));
        let result = self
            .count_where(&filter, |d| visible_to(d, user_id) && !read_by(d, user_id))
            .await?;
        Ok(result.total)
    }

    pub async fn mark_read(&self, ids: &[String], user_id: &str) -> Result<Vec<Notification>, DatabaseError> {
        let mut notifications = self.select_ids(ids, false).await?;
        for notification in &mut notifications {
            notification.readers.insert(user_id.to_string());
        }
        self.save_all(notifications).await
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Model, ValidationErrors};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub organization_id: String,
    /// Empty for notifications addressed to the whole organization
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub readers: BTreeSet<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Notification {
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.user_id.as_deref().map_or(true, |u| u.is_empty() || u == user_id)
    }

    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.readers.contains(user_id)
    }
}

impl Model for Notification {
    const COLLECTION: &'static str = "notification";
    const ORGANIZATION_SCOPED: bool = true;

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }
    fn set_created_utc(&mut self, at: DateTime<Utc>) {
        self.created_utc = at;
    }
    fn set_updated_utc(&mut self, at: DateTime<Utc>) {
        self.updated_utc = at;
    }
    fn organization_id(&self) -> Option<&str> {
        Some(&self.organization_id)
    }
    fn set_organization_id(&mut self, organization_id: String) {
        self.organization_id = organization_id;
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.organization_id.is_empty() {
            errors.insert("organization_id".into(), "Please specify a valid organization id.".into());
        }
        if self.notification_type.trim().is_empty() {
            errors.insert("type".into(), "Please specify a notification type.".into());
        }
        if self.message.trim().is_empty() {
            errors.insert("message".into(), "Please specify a message.".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

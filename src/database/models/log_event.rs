use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Model;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Audit trail entry written by services for security relevant actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            organization_id: None,
            user_id: None,
            level,
            source: source.into(),
            message: message.into(),
            data: Map::new(),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn for_organization(mut self, organization_id: Option<&str>) -> Self {
        self.organization_id = organization_id.map(str::to_string);
        self
    }

    pub fn by_user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

impl Model for LogEvent {
    const COLLECTION: &'static str = "log";
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
        self.organization_id.as_deref()
    }
    fn set_organization_id(&mut self, organization_id: String) {
        self.organization_id = Some(organization_id);
    }
}

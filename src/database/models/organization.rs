use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{is_valid_email, Model, ValidationErrors};
use crate::auth::roles::RoleSet;

/// A pending membership offer, addressed by its token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invite {
    pub token: String,
    pub email_address: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub roles: RoleSet,
    #[serde(default)]
    pub added_by_user_id: Option<String>,
    pub date_added: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub invites: Vec<Invite>,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into().trim().to_string(),
            is_verified: false,
            invites: vec![],
            data: Map::new(),
            created_utc: now,
            updated_utc: now,
            version: 0,
            is_deleted: false,
        }
    }

    pub fn invite_by_email(&self, email_address: &str) -> Option<&Invite> {
        self.invites
            .iter()
            .find(|i| i.email_address.eq_ignore_ascii_case(email_address.trim()))
    }

    pub fn invite_by_token(&self, token: &str) -> Option<&Invite> {
        self.invites.iter().find(|i| i.token == token)
    }

    pub fn remove_invite_by_email(&mut self, email_address: &str) -> bool {
        let before = self.invites.len();
        self.invites
            .retain(|i| !i.email_address.eq_ignore_ascii_case(email_address.trim()));
        self.invites.len() != before
    }

    pub fn remove_invite_by_token(&mut self, token: &str) -> bool {
        let before = self.invites.len();
        self.invites.retain(|i| i.token != token);
        self.invites.len() != before
    }
}

impl Model for Organization {
    const COLLECTION: &'static str = "organization";
    const SOFT_DELETE: bool = true;
    const VERSIONED: bool = true;

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
    fn version(&self) -> i64 {
        self.version
    }
    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
    fn set_deleted(&mut self, deleted: bool) {
        self.is_deleted = deleted;
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.name.trim().is_empty() {
            errors.insert("name".into(), "Please specify a valid name.".into());
        }
        for (i, invite) in self.invites.iter().enumerate() {
            if !is_valid_email(&invite.email_address) {
                errors.insert(
                    format!("invites[{}].email_address", i),
                    "Please specify a valid email address.".into(),
                );
            }
            if invite.token.is_empty() {
                errors.insert(format!("invites[{}].token", i), "Invite token is required.".into());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Model, ValidationErrors};
use crate::auth::roles::RoleSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Authentication,
    Access,
}

/// An opaque credential. User session tokens carry a `user_id`;
/// organization API tokens do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default)]
    pub scopes: RoleSet,
    #[serde(default)]
    pub expires_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Token {
    pub fn new(id: String, token_type: TokenType) -> Self {
        let now = Utc::now();
        Self {
            id,
            organization_id: None,
            user_id: None,
            refresh: None,
            token_type,
            scopes: RoleSet::new(),
            expires_utc: None,
            notes: None,
            created_by: None,
            data: Map::new(),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_utc.is_some_and(|expires| expires < Utc::now())
    }
}

impl Model for Token {
    const COLLECTION: &'static str = "token";
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

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.id.trim().is_empty() {
            errors.insert("id".into(), "Please specify a valid token id.".into());
        }
        if self.user_id.is_none() && self.organization_id.is_none() {
            errors.insert("organization_id".into(), "Please specify a valid organization id.".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry() {
        let mut token = Token::new("abc".into(), TokenType::Access);
        assert!(!token.is_expired());
        token.expires_utc = Some(Utc::now() - Duration::minutes(1));
        assert!(token.is_expired());
    }

    #[test]
    fn api_tokens_need_an_organization() {
        let token = Token::new("abc".into(), TokenType::Access);
        assert!(token.validate().unwrap_err().contains_key("organization_id"));
    }

    #[test]
    fn serializes_type_field() {
        let token = Token::new("abc".into(), TokenType::Access);
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["type"], "access");
    }
}

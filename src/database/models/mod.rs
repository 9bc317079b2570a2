use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};

pub mod log_event;
pub mod notification;
pub mod organization;
pub mod token;
pub mod user;

pub use log_event::LogEvent;
pub use notification::Notification;
pub use organization::{Invite, Organization};
pub use token::{Token, TokenType};
pub use user::{Membership, OAuthAccount, User};

/// Field name to message
pub type ValidationErrors = HashMap<String, String>;

/// A persisted document.
///
/// The associated constants replace runtime capability checks: a model opts into
/// organization ownership, soft deletes and optimistic versioning by overriding them.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    const ORGANIZATION_SCOPED: bool = false;
    const SOFT_DELETE: bool = false;
    const VERSIONED: bool = false;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);

    fn created_utc(&self) -> DateTime<Utc>;
    fn set_created_utc(&mut self, at: DateTime<Utc>);
    fn set_updated_utc(&mut self, at: DateTime<Utc>);

    fn organization_id(&self) -> Option<&str> {
        None
    }
    fn set_organization_id(&mut self, _organization_id: String) {}

    fn version(&self) -> i64 {
        0
    }
    fn set_version(&mut self, _version: i64) {}

    fn is_deleted(&self) -> bool {
        false
    }
    fn set_deleted(&mut self, _deleted: bool) {}

    /// Normalization applied before every add and save
    fn normalize(&mut self) {}

    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }

    /// Secondary cache keys that must be dropped whenever this document changes
    fn secondary_cache_keys(&self) -> Vec<String> {
        vec![]
    }
}

/// 24 hex characters: seconds since epoch followed by random bytes
pub fn new_object_id() -> String {
    let seconds = Utc::now().timestamp() as u32;
    let random: [u8; 8] = rand::thread_rng().gen();
    let mut id = format!("{:08x}", seconds);
    for byte in random {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && EMAIL_REGEX.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_hex() {
        let id = new_object_id();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_object_id());
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("test@localhost.com"));
        assert!(is_valid_email(" Someone.Else@example.org "));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@example.com"));
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{is_valid_email, Model, ValidationErrors};
use crate::auth::password::{generate_salt, generate_token, hash_password};
use crate::auth::roles::{self, RoleSet};

const VERIFY_EMAIL_TOKEN_LIFETIME_DAYS: i64 = 30;
const PASSWORD_RESET_TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub organization_id: String,
    #[serde(default)]
    pub roles: RoleSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthAccount {
    pub provider: String,
    pub provider_user_id: String,
    pub username: String,
    #[serde(default)]
    pub extra_data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub full_name: String,
    pub email_address: String,
    #[serde(default = "default_true")]
    pub email_notifications_enabled: bool,
    #[serde(default)]
    pub is_email_address_verified: bool,
    #[serde(default)]
    pub verify_email_address_token: Option<String>,
    #[serde(default)]
    pub verify_email_address_token_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub salt: Option<String>,
    #[serde(default)]
    pub password_reset_token: Option<String>,
    #[serde(default)]
    pub password_reset_token_created: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub profile_image_path: Option<String>,
    #[serde(default)]
    pub roles: RoleSet,
    #[serde(default)]
    pub memberships: Vec<Membership>,
    #[serde(default)]
    pub o_auth_accounts: Vec<OAuthAccount>,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn new(full_name: impl Into<String>, email_address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            full_name: full_name.into(),
            email_address: email_address.into().trim().to_lowercase(),
            email_notifications_enabled: true,
            is_email_address_verified: false,
            verify_email_address_token: None,
            verify_email_address_token_created: None,
            password: None,
            salt: None,
            password_reset_token: None,
            password_reset_token_created: None,
            is_active: true,
            profile_image_path: None,
            roles: RoleSet::new(),
            memberships: vec![],
            o_auth_accounts: vec![],
            data: Map::new(),
            created_utc: now,
            updated_utc: now,
            version: 0,
        }
    }

    pub fn has_local_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn is_valid_password(&self, password: &str) -> bool {
        match (self.salt.as_deref(), self.password.as_deref()) {
            (Some(salt), Some(hash)) if !salt.is_empty() && !hash.is_empty() => {
                hash_password(password, salt) == hash
            }
            _ => false,
        }
    }

    pub fn set_password(&mut self, password: &str) {
        let salt = match self.salt.as_deref() {
            Some(salt) if !salt.is_empty() => salt.to_string(),
            _ => generate_salt(),
        };
        self.password = Some(hash_password(password, &salt));
        self.salt = Some(salt);
        self.reset_password_reset_token();
    }

    pub fn add_oauth_account(&mut self, provider: &str, provider_user_id: &str, username: &str) {
        self.o_auth_accounts.push(OAuthAccount {
            provider: provider.to_lowercase(),
            provider_user_id: provider_user_id.to_string(),
            username: username.to_string(),
            extra_data: BTreeMap::new(),
        });
    }

    /// Refuses to remove the last login method of an account without a password
    pub fn remove_oauth_account(&mut self, provider: &str, provider_user_id: &str) -> bool {
        if self.o_auth_accounts.len() <= 1 && !self.has_local_password() {
            return false;
        }
        let provider = provider.to_lowercase();
        self.o_auth_accounts
            .retain(|a| !(a.provider == provider && a.provider_user_id == provider_user_id));
        true
    }

    pub fn create_verify_email_address_token(&mut self) {
        self.verify_email_address_token = Some(generate_token());
        self.verify_email_address_token_created = Some(Utc::now());
    }

    pub fn has_valid_verify_email_address_token(&self) -> bool {
        self.verify_email_address_token_created
            .is_some_and(|created| created > Utc::now() - Duration::days(VERIFY_EMAIL_TOKEN_LIFETIME_DAYS))
    }

    pub fn mark_email_address_verified(&mut self) {
        self.is_email_address_verified = true;
        self.verify_email_address_token = None;
        self.verify_email_address_token_created = None;
    }

    pub fn create_password_reset_token(&mut self) {
        self.password_reset_token = Some(generate_token());
        self.password_reset_token_created = Some(Utc::now());
    }

    pub fn has_valid_password_reset_token(&self) -> bool {
        self.password_reset_token_created
            .is_some_and(|created| created > Utc::now() - Duration::hours(PASSWORD_RESET_TOKEN_LIFETIME_HOURS))
    }

    pub fn reset_password_reset_token(&mut self) {
        self.password_reset_token = None;
        self.password_reset_token_created = None;
    }

    pub fn is_global_admin(&self) -> bool {
        self.roles.contains(roles::GLOBAL_ADMIN)
    }

    pub fn membership(&self, organization_id: &str) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.organization_id == organization_id)
    }

    pub fn is_member_of(&self, organization_id: &str) -> bool {
        self.membership(organization_id).is_some()
    }

    pub fn is_admin(&self, organization_id: &str) -> bool {
        self.memberships_with_admin_role()
            .any(|m| m.organization_id == organization_id)
    }

    pub fn memberships_with_admin_role(&self) -> impl Iterator<Item = &Membership> {
        self.memberships.iter().filter(|m| m.roles.contains(roles::ADMIN))
    }

    pub fn organization_ids(&self) -> Vec<String> {
        self.memberships.iter().map(|m| m.organization_id.clone()).collect()
    }

    /// Adds the roles to the membership for `organization_id`, creating it when
    /// missing. Returns whether anything changed. The global role is never
    /// granted through a membership.
    pub fn added_membership_roles(&mut self, organization_id: &str, scope: &RoleSet) -> bool {
        if scope.contains(roles::GLOBAL_ADMIN) {
            return false;
        }

        let normalized: RoleSet = scope.iter().map(|r| r.to_lowercase()).collect();
        match self.memberships.iter_mut().find(|m| m.organization_id == organization_id) {
            None => {
                self.memberships.push(Membership {
                    organization_id: organization_id.to_string(),
                    roles: normalized,
                });
                true
            }
            Some(membership) => {
                let before = membership.roles.len();
                membership.roles.extend(normalized);
                membership.roles.len() != before
            }
        }
    }

    pub fn added_membership_role(&mut self, organization_id: &str, role: &str) -> bool {
        match roles::scope_for(role) {
            Some(scope) => self.added_membership_roles(organization_id, &scope),
            None => false,
        }
    }

    pub fn add_admin_membership(&mut self, organization_id: &str) -> bool {
        self.added_membership_roles(organization_id, &roles::admin_scope())
    }

    /// Drops the admin role from a membership, keeping user access
    pub fn removed_admin_membership_role(&mut self, organization_id: &str) -> bool {
        match self.memberships.iter_mut().find(|m| m.organization_id == organization_id) {
            Some(membership) if membership.roles.contains(roles::ADMIN) => {
                membership.roles = roles::user_scope();
                true
            }
            _ => false,
        }
    }

    pub fn remove_membership(&mut self, organization_id: &str) -> bool {
        let before = self.memberships.len();
        self.memberships.retain(|m| m.organization_id != organization_id);
        self.memberships.len() != before
    }

    pub fn added_global_admin_role(&mut self) -> bool {
        self.roles.insert(roles::GLOBAL_ADMIN.to_string())
    }

    pub fn removed_global_admin_role(&mut self) -> bool {
        self.roles.remove(roles::GLOBAL_ADMIN)
    }
}

impl Model for User {
    const COLLECTION: &'static str = "user";
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

    fn normalize(&mut self) {
        self.email_address = self.email_address.trim().to_lowercase();
        self.full_name = self.full_name.trim().to_string();
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.full_name.trim().is_empty() {
            errors.insert("full_name".into(), "Please specify a valid full name.".into());
        }
        if !is_valid_email(&self.email_address) {
            errors.insert("email_address".into(), "Please specify a valid email address.".into());
        }
        if !self.is_email_address_verified
            && (self.verify_email_address_token.as_deref().map_or(true, str::is_empty)
                || self.verify_email_address_token_created.is_none())
        {
            errors.insert(
                "verify_email_address_token".into(),
                "A verification token is required for unverified email addresses.".into(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn secondary_cache_keys(&self) -> Vec<String> {
        vec![format!("user:email:{}", self.email_address.to_lowercase())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let mut user = User::new("Test User", "Test@Example.com");
        user.create_verify_email_address_token();
        user
    }

    #[test]
    fn new_user_lowercases_email_and_validates() {
        let user = user();
        assert_eq!(user.email_address, "test@example.com");
        assert!(user.validate().is_ok());

        let mut unverified = User::new("", "bad");
        unverified.verify_email_address_token = None;
        let errors = unverified.validate().unwrap_err();
        assert!(errors.contains_key("full_name"));
        assert!(errors.contains_key("email_address"));
        assert!(errors.contains_key("verify_email_address_token"));
    }

    #[test]
    fn password_round_trip() {
        let mut user = user();
        assert!(!user.is_valid_password("Password123!"));
        user.set_password("Password123!");
        assert!(user.has_local_password());
        assert!(user.is_valid_password("Password123!"));
        assert!(!user.is_valid_password("password123!"));
    }

    #[test]
    fn membership_roles_are_merged() {
        let mut user = user();
        assert!(user.added_membership_role("org1", "user"));
        assert!(!user.added_membership_role("org1", "client"));
        assert!(!user.is_admin("org1"));
        assert!(user.add_admin_membership("org1"));
        assert!(user.is_admin("org1"));
        assert!(!user.added_membership_roles("org1", &roles::global_scope()));
        assert!(user.removed_admin_membership_role("org1"));
        assert!(!user.is_admin("org1"));
        assert!(user.remove_membership("org1"));
        assert!(user.memberships.is_empty());
    }

    #[test]
    fn oauth_account_removal_requires_another_login() {
        let mut user = user();
        user.add_oauth_account("GitHub", "42", "octocat");
        assert_eq!(user.o_auth_accounts[0].provider, "github");
        assert!(!user.remove_oauth_account("github", "42"));
        user.set_password("Password123!");
        assert!(user.remove_oauth_account("github", "42"));
        assert!(user.o_auth_accounts.is_empty());
    }

    #[test]
    fn token_expiration() {
        let mut user = user();
        assert!(user.has_valid_verify_email_address_token());
        user.verify_email_address_token_created = Some(Utc::now() - Duration::days(31));
        assert!(!user.has_valid_verify_email_address_token());

        user.create_password_reset_token();
        assert!(user.has_valid_password_reset_token());
        user.password_reset_token_created = Some(Utc::now() - Duration::hours(25));
        assert!(!user.has_valid_password_reset_token());
        user.reset_password_reset_token();
        assert!(user.password_reset_token.is_none());
    }

    #[test]
    fn verification_clears_token() {
        let mut user = user();
        user.mark_email_address_verified();
        assert!(user.is_email_address_verified);
        assert!(user.verify_email_address_token.is_none());
        assert!(user.validate().is_ok());
    }
}

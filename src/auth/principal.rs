use serde::Serialize;

use super::roles::{self, RoleSet};
use crate::database::models::{Token, User};
use crate::types::AuthType;

/// The authenticated caller of a request
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub auth_type: AuthType,
    pub name: String,
    /// User id or token id
    pub identifier: String,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub roles: RoleSet,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            auth_type: AuthType::Anonymous,
            name: String::new(),
            identifier: String::new(),
            user_id: None,
            organization_id: None,
            roles: RoleSet::new(),
        }
    }

    /// Roles are the user's global roles plus the roles of the membership in the
    /// selected organization, which defaults to the first membership
    pub fn from_user(user: &User, organization_id: Option<&str>) -> Self {
        let organization_id = organization_id
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| user.memberships.first().map(|m| m.organization_id.clone()));

        let mut granted: RoleSet = user.roles.clone();
        if let Some(membership) = organization_id.as_deref().and_then(|id| user.membership(id)) {
            granted.extend(membership.roles.iter().cloned());
        }
        let mut granted = roles::with_implied(granted);
        if granted.is_empty() {
            granted = roles::user_scope();
        }

        Self {
            auth_type: AuthType::User,
            name: user.email_address.clone(),
            identifier: user.id.clone(),
            user_id: Some(user.id.clone()),
            organization_id,
            roles: granted,
        }
    }

    /// Organization API token. Tokens bound to a user go through `from_user`.
    pub fn from_token(token: &Token) -> Self {
        let granted = if token.scopes.is_empty() {
            roles::client_scope()
        } else {
            roles::with_implied(token.scopes.clone())
        };

        Self {
            auth_type: AuthType::Token,
            name: token.id.clone(),
            identifier: token.id.clone(),
            user_id: None,
            organization_id: token.organization_id.clone(),
            roles: granted,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_type != AuthType::Anonymous
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_global_admin(&self) -> bool {
        self.has_role(roles::GLOBAL_ADMIN)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(roles::ADMIN) || self.is_global_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::TokenType;

    #[test]
    fn user_roles_merge_membership_roles() {
        let mut user = User::new("Admin", "admin@example.com");
        user.id = "u1".into();
        user.added_membership_roles("o1", &roles::user_scope());
        user.add_admin_membership("o2");

        let first = Principal::from_user(&user, None);
        assert_eq!(first.organization_id.as_deref(), Some("o1"));
        assert!(first.has_role(roles::USER));
        assert!(!first.is_admin());

        let second = Principal::from_user(&user, Some("o2"));
        assert!(second.is_admin());
        assert!(!second.is_global_admin());
    }

    #[test]
    fn global_admin_implies_user() {
        let mut user = User::new("Root", "root@example.com");
        user.added_global_admin_role();
        let principal = Principal::from_user(&user, None);
        assert!(principal.is_global_admin());
        assert!(principal.has_role(roles::USER));
        assert!(principal.has_role(roles::CLIENT));
        assert_eq!(principal.organization_id, None);
    }

    #[test]
    fn user_without_roles_gets_user_scope() {
        let user = User::new("Plain", "plain@example.com");
        assert_eq!(Principal::from_user(&user, None).roles, roles::user_scope());
    }

    #[test]
    fn token_scopes_default_to_client() {
        let mut token = Token::new("t".into(), TokenType::Access);
        token.organization_id = Some("o1".into());
        let principal = Principal::from_token(&token);
        assert_eq!(principal.auth_type, AuthType::Token);
        assert_eq!(principal.roles, roles::client_scope());

        token.scopes = ["user".to_string()].into_iter().collect();
        assert!(Principal::from_token(&token).has_role(roles::CLIENT));
    }
}

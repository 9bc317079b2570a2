use std::collections::BTreeSet;

pub const CLIENT: &str = "client";
pub const USER: &str = "user";
pub const ADMIN: &str = "admin";
pub const GLOBAL_ADMIN: &str = "global";

pub const ALL_SCOPES: [&str; 4] = [CLIENT, USER, ADMIN, GLOBAL_ADMIN];

pub type RoleSet = BTreeSet<String>;

fn set(roles: &[&str]) -> RoleSet {
    roles.iter().map(|r| r.to_string()).collect()
}

pub fn client_scope() -> RoleSet {
    set(&[CLIENT])
}

pub fn user_scope() -> RoleSet {
    set(&[CLIENT, USER])
}

pub fn admin_scope() -> RoleSet {
    set(&[CLIENT, USER, ADMIN])
}

pub fn global_scope() -> RoleSet {
    set(&ALL_SCOPES)
}

/// The role plus every role it implies, or `None` for an unknown role
pub fn scope_for(role: &str) -> Option<RoleSet> {
    match role.to_ascii_lowercase().as_str() {
        CLIENT => Some(client_scope()),
        USER => Some(user_scope()),
        ADMIN => Some(admin_scope()),
        GLOBAL_ADMIN => Some(global_scope()),
        _ => None,
    }
}

pub fn is_valid_scope(scope: &str) -> bool {
    ALL_SCOPES.contains(&scope)
}

/// `global` implies `user`, `user` implies `client`
pub fn with_implied(mut roles: RoleSet) -> RoleSet {
    if roles.contains(GLOBAL_ADMIN) {
        roles.insert(USER.to_string());
    }
    if roles.contains(USER) {
        roles.insert(CLIENT.to_string());
    }
    roles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_cumulative() {
        assert_eq!(scope_for("client").unwrap().len(), 1);
        assert_eq!(scope_for("USER").unwrap(), user_scope());
        assert!(scope_for("admin").unwrap().contains(USER));
        assert_eq!(scope_for("global").unwrap().len(), 4);
        assert!(scope_for("owner").is_none());
    }

    #[test]
    fn implied_roles() {
        let roles = with_implied(set(&[GLOBAL_ADMIN]));
        assert!(roles.contains(USER));
        assert!(roles.contains(CLIENT));
        assert!(!roles.contains(ADMIN));
    }
}

// handlers/public/auth/mod.rs - Public authentication handlers
//
// Endpoints that hand out session tokens or recover an account. None of them
// require a token; signup and the OAuth callbacks also accept a signed in caller.

use serde::Serialize;

use crate::database::models::User;
use crate::database::DatabaseError;
use crate::state::AppState;

pub mod login; // POST /auth/login
pub mod oauth; // POST /auth/google, POST /auth/github
pub mod password; // forgot, verify, reset and cancel password reset
pub mod signup; // POST /auth/signup, GET /auth/check-email-address/{email}

pub use login::login;
pub use oauth::{github, google};
pub use password::{cancel_reset_password, forgot_password, reset_password, verify_password_reset_token};
pub use signup::{check_email_address, signup};

/// Body returned by every endpoint that issues a session token
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// The organization a fresh session starts in
pub(crate) fn default_organization_id(user: &User) -> Option<String> {
    user.memberships.first().map(|m| m.organization_id.clone())
}

/// The very first account becomes the global administrator
pub(crate) async fn grant_global_admin_if_first_user(state: &AppState, user: &mut User) -> Result<(), DatabaseError> {
    if state.users.is_empty().await? {
        tracing::info!("Granting global admin role to first user {}", user.email_address);
        user.added_global_admin_role();
    }
    Ok(())
}

/// Adds new users, saves existing ones
pub(crate) async fn store_user(state: &AppState, user: User) -> Result<User, DatabaseError> {
    if user.id.is_empty() {
        state.users.add(user).await
    } else {
        state.users.save(user).await
    }
}

/// Verifies the organization once one of its admins has a verified address
pub(crate) async fn verify_organization_of_admin(
    state: &AppState,
    user: &User,
    organization_id: Option<&str>,
) -> Result<(), DatabaseError> {
    if let Some(organization_id) = organization_id {
        if user.is_email_address_verified && user.is_admin(organization_id) {
            state.organization_service.try_mark_verified(organization_id).await?;
        }
    }
    Ok(())
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

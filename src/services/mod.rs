pub mod cache_listener;
pub mod oauth;
pub mod organization_service;

pub use oauth::{OAuthClient, OAuthError, OAuthProvider, OAuthUserInfo};
pub use organization_service::{MembershipError, OrganizationService};

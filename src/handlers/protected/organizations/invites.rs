// handlers/protected/organizations/invites.rs - Organization invite handlers
//
// GET    /organizations/invites/:invite               (anonymous, by token)
// DELETE /organizations/invites/:invite               (admin, by email address)
// GET    /organizations/invites/:invite/resend-invite (admin, by email address)
// GET    /organizations/invites                       (admin)
// POST   /organizations/invites                       (admin)

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::api::extract::Json;
use crate::auth::password::generate_token;
use crate::auth::roles::{self, RoleSet};
use crate::database::models::{is_valid_email, Invite, User};
use crate::error::ApiError;
use crate::handlers::public::auth::non_empty;
use crate::messaging::{Message, MEMBERSHIP_CHANGE_DELAY};
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::state::AppState;
use crate::types::ChangeType;

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email_address: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

/// Invite as shown to the organization's admins; the token stays private
#[derive(Debug, Serialize)]
pub struct ViewInvite {
    pub email_address: String,
    pub full_name: Option<String>,
    pub roles: RoleSet,
    pub added_by_user_id: Option<String>,
    pub date_added: DateTime<Utc>,
}

impl From<&Invite> for ViewInvite {
    fn from(invite: &Invite) -> Self {
        Self {
            email_address: invite.email_address.clone(),
            full_name: invite.full_name.clone(),
            roles: invite.roles.clone(),
            added_by_user_id: invite.added_by_user_id.clone(),
            date_added: invite.date_added,
        }
    }
}

/// What the invitee sees before signing up
#[derive(Debug, Serialize)]
pub struct InviteDetails {
    pub organization_id: String,
    pub organization_name: String,
    pub email_address: String,
    pub full_name: Option<String>,
}

/// Roles the sender may hand out. Only global admins grant the global role and
/// only organization admins grant admin.
fn grantable_roles(sender: &User, organization_id: &str, requested: RoleSet) -> RoleSet {
    let is_admin = sender.is_admin(organization_id) || sender.is_global_admin();
    if requested.contains(roles::GLOBAL_ADMIN) && !sender.is_global_admin() {
        return if is_admin { roles::admin_scope() } else { roles::user_scope() };
    }
    if requested.contains(roles::ADMIN) && !is_admin {
        return roles::user_scope();
    }
    requested
}

/// GET /api/v1/organizations/invites/:token - Invite lookup for the signup page
pub async fn get_by_token(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<InviteDetails> {
    let token = token.trim();
    let organization = state
        .organizations
        .by_invite_token(token)
        .await?
        .filter(|o| !o.is_deleted)
        .ok_or_else(|| ApiError::not_found("Invite not found."))?;
    let invite = organization
        .invite_by_token(token)
        .ok_or_else(|| ApiError::not_found("Invite not found."))?;

    Ok(ApiResponse::success(InviteDetails {
        organization_id: organization.id.clone(),
        organization_name: organization.name.clone(),
        email_address: invite.email_address.clone(),
        full_name: invite.full_name.clone(),
    }))
}

/// GET /api/v1/organizations/invites - Pending invites of the selected organization
pub async fn list(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> ApiResult<Vec<ViewInvite>> {
    ctx.require_admin()?;
    let organization = state.organizations.select_404(ctx.require_organization()?).await?;
    Ok(ApiResponse::success(organization.invites.iter().map(ViewInvite::from).collect()))
}

/**
 * POST /api/v1/organizations/invites - Invite someone to the selected organization
 *
 * Existing accounts are added straight away and told by mail. Everyone else
 * gets an invite link; inviting the same address again reuses the pending invite.
 */
pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<InviteRequest>,
) -> ApiResult<Value> {
    ctx.require_admin()?;
    let organization_id = ctx.require_organization()?;
    let sender = ctx.current_user()?;

    let email = non_empty(body.email_address.as_deref())
        .filter(|e| is_valid_email(e))
        .map(str::to_lowercase)
        .ok_or_else(|| {
            let message = "Please specify a valid email address.";
            ApiError::validation_error(
                message,
                Some(HashMap::from([("email_address".to_string(), message.to_string())])),
            )
        })?;

    let role = non_empty(body.role.as_deref()).unwrap_or(roles::USER);
    let requested = roles::scope_for(role).ok_or_else(|| ApiError::bad_request("Invalid role specified."))?;
    let granted = grantable_roles(sender, organization_id, requested);

    let mut organization = state.organizations.select_404(organization_id).await?;

    if let Some(mut user) = state.users.by_email(&email).await? {
        // The global role lives on the user, never on a membership
        let changed = if granted.contains(roles::GLOBAL_ADMIN) {
            let global = user.added_global_admin_role();
            user.added_membership_roles(&organization.id, &roles::admin_scope()) || global
        } else {
            user.added_membership_roles(&organization.id, &granted)
        };
        if changed {
            user = state.users.save(user).await?;
            state.bus.publish_delayed(
                Message::UserMembershipChanged {
                    change_type: ChangeType::Added,
                    user_id: user.id.clone(),
                    organization_id: organization.id.clone(),
                },
                MEMBERSHIP_CHANGE_DELAY,
            );
            state
                .mailer
                .send_added_to_organization(sender, &organization, &user)
                .await?;
            info!("Added {} to organization {}", user.email_address, organization.id);
        }
        return Ok(ApiResponse::success(json!({
            "added": true,
            "user_id": user.id,
            "email_address": user.email_address,
        })));
    }

    if !state.config.settings.enable_account_invites {
        return Err(ApiError::bad_request("Account invites are currently disabled."));
    }

    let invite = match organization.invite_by_email(&email) {
        Some(invite) => invite.clone(),
        None => {
            let invite = Invite {
                token: generate_token(),
                email_address: email.clone(),
                full_name: non_empty(body.full_name.as_deref()).map(str::to_string),
                roles: granted,
                added_by_user_id: Some(sender.id.clone()),
                date_added: Utc::now(),
            };
            organization.invites.push(invite.clone());
            organization = state.organizations.save(organization).await?;
            invite
        }
    };

    state.mailer.send_invite(sender, &organization, &invite).await?;
    info!("Invited {} to organization {}", invite.email_address, organization.id);
    Ok(ApiResponse::success(json!({
        "invited": true,
        "email_address": invite.email_address,
    })))
}

/// GET /api/v1/organizations/invites/:email/resend-invite
pub async fn resend(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(email): Path<String>,
) -> ApiResult<()> {
    ctx.require_admin()?;
    let sender = ctx.current_user()?;
    let organization = state.organizations.select_404(ctx.require_organization()?).await?;
    let invite = organization
        .invite_by_email(&email)
        .ok_or_else(|| ApiError::not_found("Invite not found."))?;

    state.mailer.send_invite(sender, &organization, invite).await?;
    Ok(ApiResponse::success(()))
}

/// DELETE /api/v1/organizations/invites/:email - Succeeds whether or not the invite existed
pub async fn revoke(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(email): Path<String>,
) -> ApiResult<()> {
    ctx.require_admin()?;
    let mut organization = state.organizations.select_404(ctx.require_organization()?).await?;
    if organization.remove_invite_by_email(&email) {
        state.organizations.save(organization).await?;
    }
    Ok(ApiResponse::success(()))
}

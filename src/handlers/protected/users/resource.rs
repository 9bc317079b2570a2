// handlers/protected/users/resource.rs - User resource and its views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::controller::{ReadOnlyResource, RepositoryResource};
use crate::api::permission::PermissionResult;
use crate::auth::roles::RoleSet;
use crate::database::models::{Membership, Organization, User};
use crate::database::{FindResults, Repository};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::messaging::{Message, MEMBERSHIP_CHANGE_DELAY};
use crate::middleware::RequestContext;
use crate::state::AppState;
use crate::types::ChangeType;

/// What any caller allowed to see a user receives
#[derive(Debug, Clone, Serialize)]
pub struct ViewUser {
    pub id: String,
    pub full_name: String,
    pub email_address: String,
    pub email_notifications_enabled: bool,
    pub is_email_address_verified: bool,
    pub is_active: bool,
    pub profile_image_path: Option<String>,
    pub roles: RoleSet,
    pub memberships: Vec<Membership>,
    pub data: Map<String, Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub version: i64,
}

impl From<&User> for ViewUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            email_address: user.email_address.clone(),
            email_notifications_enabled: user.email_notifications_enabled,
            is_email_address_verified: user.is_email_address_verified,
            is_active: user.is_active,
            profile_image_path: user.profile_image_path.clone(),
            roles: user.roles.clone(),
            memberships: user.memberships.clone(),
            data: user.data.clone(),
            created_utc: user.created_utc,
            updated_utc: user.updated_utc,
            version: user.version,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ViewMembership {
    pub organization_id: String,
    pub organization_name: Option<String>,
    pub roles: RoleSet,
}

#[derive(Debug, Serialize)]
pub struct ViewOAuthAccount {
    pub provider: String,
    pub provider_user_id: String,
    pub username: String,
}

/// GET /users/me. `roles` are the roles of the current session.
#[derive(Debug, Serialize)]
pub struct ViewCurrentUser {
    pub id: String,
    pub full_name: String,
    pub email_address: String,
    pub email_notifications_enabled: bool,
    pub is_email_address_verified: bool,
    pub profile_image_path: Option<String>,
    pub roles: RoleSet,
    pub organization_id: Option<String>,
    pub has_local_password: bool,
    pub memberships: Vec<ViewMembership>,
    pub o_auth_accounts: Vec<ViewOAuthAccount>,
    pub data: Map<String, Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub version: i64,
}

impl ViewCurrentUser {
    pub fn new(user: &User, ctx: &RequestContext, organizations: &[Organization]) -> Self {
        let memberships = user
            .memberships
            .iter()
            .map(|m| ViewMembership {
                organization_id: m.organization_id.clone(),
                organization_name: organizations
                    .iter()
                    .find(|o| o.id == m.organization_id)
                    .map(|o| o.name.clone()),
                roles: m.roles.clone(),
            })
            .collect();

        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            email_address: user.email_address.clone(),
            email_notifications_enabled: user.email_notifications_enabled,
            is_email_address_verified: user.is_email_address_verified,
            profile_image_path: user.profile_image_path.clone(),
            roles: ctx.principal.roles.clone(),
            organization_id: ctx.selected_organization_id().map(str::to_string),
            has_local_password: user.has_local_password(),
            memberships,
            o_auth_accounts: user
                .o_auth_accounts
                .iter()
                .map(|a| ViewOAuthAccount {
                    provider: a.provider.clone(),
                    provider_user_id: a.provider_user_id.clone(),
                    username: a.username.clone(),
                })
                .collect(),
            data: user.data.clone(),
            created_utc: user.created_utc,
            updated_utc: user.updated_utc,
            version: user.version,
        }
    }
}

/// Fields a user may change through PATCH and PUT
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateUser {
    pub full_name: String,
    pub email_notifications_enabled: bool,
    #[serde(default)]
    pub profile_image_path: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

pub struct UserResource<'a> {
    pub state: &'a AppState,
    pub ctx: &'a RequestContext,
}

impl<'a> UserResource<'a> {
    pub fn new(state: &'a AppState, ctx: &'a RequestContext) -> Self {
        Self { state, ctx }
    }

    /// Admins manage users sharing the selected organization
    pub fn can_manage(&self, user: &User) -> bool {
        if self.ctx.is_global_admin() {
            return true;
        }
        self.ctx.principal.is_admin()
            && self
                .ctx
                .selected_organization_id()
                .is_some_and(|id| user.is_member_of(id))
    }

    /// Fetches a user the caller may manage, 404 otherwise
    pub async fn managed_user(&self, id: &str) -> Result<User, ApiError> {
        self.get_model(id, false)
            .await?
            .filter(|u| self.can_manage(u))
            .ok_or_else(|| ApiError::not_found(format!("user '{}' not found", id)))
    }

    pub fn publish_membership_change(&self, change_type: ChangeType, user_id: &str, organization_id: &str) {
        self.state.bus.publish_delayed(
            Message::UserMembershipChanged {
                change_type,
                user_id: user_id.to_string(),
                organization_id: organization_id.to_string(),
            },
            MEMBERSHIP_CHANGE_DELAY,
        );
    }
}

#[async_trait::async_trait]
impl<'a> ReadOnlyResource for UserResource<'a> {
    type Model = User;
    type View = ViewUser;

    fn repository(&self) -> &Repository<User> {
        &self.state.users
    }

    fn context(&self) -> &RequestContext {
        self.ctx
    }

    fn map_view(&self, model: &User) -> ViewUser {
        ViewUser::from(model)
    }

    fn is_visible(&self, model: &User) -> bool {
        self.ctx.user_id() == Some(model.id.as_str()) || self.can_manage(model)
    }

    async fn find(&self, filter: FilterData) -> Result<FindResults<User>, ApiError> {
        let organization_id = self.ctx.require_organization()?;
        Ok(self.state.users.by_organization(organization_id, filter).await?)
    }
}

#[async_trait::async_trait]
impl<'a> RepositoryResource for UserResource<'a> {
    type UpdateModel = UpdateUser;

    fn to_update_model(&self, model: &User) -> UpdateUser {
        UpdateUser {
            full_name: model.full_name.clone(),
            email_notifications_enabled: model.email_notifications_enabled,
            profile_image_path: model.profile_image_path.clone(),
            data: model.data.clone(),
        }
    }

    fn apply_update_model(&self, update: UpdateUser, model: &mut User) {
        model.full_name = update.full_name;
        model.email_notifications_enabled = update.email_notifications_enabled;
        model.profile_image_path = update.profile_image_path;
        model.data = update.data;
    }

    async fn can_delete(&self, model: &User) -> Result<PermissionResult, ApiError> {
        if !self.can_manage(model) {
            return Ok(PermissionResult::deny_with_not_found(model.id.clone()));
        }
        Ok(PermissionResult::allow())
    }

    async fn after_delete(&self, model: &User) -> Result<(), ApiError> {
        // Sessions of a deleted user must stop authenticating
        let tokens: Vec<String> = self
            .state
            .tokens
            .by_user_id(&model.id)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        if !tokens.is_empty() {
            self.state.tokens.remove_all(&tokens).await?;
        }

        for membership in &model.memberships {
            self.publish_membership_change(ChangeType::Removed, &model.id, &membership.organization_id);
        }
        Ok(())
    }
}

// handlers/protected/organizations/resource.rs - Organization resource and its views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::api::controller::{CreateResource, ReadOnlyResource, RepositoryResource};
use crate::api::permission::PermissionResult;
use crate::database::models::{Organization, User};
use crate::database::Repository;
use crate::error::ApiError;
use crate::messaging::{Message, MEMBERSHIP_CHANGE_DELAY};
use crate::middleware::RequestContext;
use crate::state::AppState;
use crate::types::ChangeType;

#[derive(Debug, Clone, Serialize)]
pub struct ViewOrganization {
    pub id: String,
    pub name: String,
    pub is_verified: bool,
    pub data: Map<String, Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub version: i64,
    pub is_deleted: bool,
}

impl From<&Organization> for ViewOrganization {
    fn from(organization: &Organization) -> Self {
        Self {
            id: organization.id.clone(),
            name: organization.name.clone(),
            is_verified: organization.is_verified,
            data: organization.data.clone(),
            created_utc: organization.created_utc,
            updated_utc: organization.updated_utc,
            version: organization.version,
            is_deleted: organization.is_deleted,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateOrganization {
    pub name: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

pub struct OrganizationResource<'a> {
    pub state: &'a AppState,
    pub ctx: &'a RequestContext,
}

impl<'a> OrganizationResource<'a> {
    pub fn new(state: &'a AppState, ctx: &'a RequestContext) -> Self {
        Self { state, ctx }
    }

    fn can_administer(&self, organization_id: &str) -> bool {
        if self.ctx.is_global_admin() {
            return true;
        }
        self.ctx.user.as_ref().is_some_and(|u| u.is_admin(organization_id))
    }

    fn publish_membership_change(&self, change_type: ChangeType, user_id: &str, organization_id: &str) {
        self.state.bus.publish_delayed(
            Message::UserMembershipChanged {
                change_type,
                user_id: user_id.to_string(),
                organization_id: organization_id.to_string(),
            },
            MEMBERSHIP_CHANGE_DELAY,
        );
    }

    /// Users whose only membership is this organization are removed, everyone
    /// else just loses the membership. The caller is never removed.
    async fn release_members(&self, organization: &Organization) -> Result<(), ApiError> {
        let caller = self.ctx.user_id();
        let members = self.state.users.all_by_organization(&organization.id).await?;

        let mut removed: Vec<String> = vec![];
        let mut updated: Vec<User> = vec![];
        for mut user in members {
            let only_membership = user.memberships.iter().all(|m| m.organization_id == organization.id);
            if only_membership && caller != Some(user.id.as_str()) {
                removed.push(user.id.clone());
            } else if user.remove_membership(&organization.id) {
                updated.push(user);
            }
        }

        if !removed.is_empty() {
            info!("Removing {} users with no other organization", removed.len());
            self.state.users.remove_all(&removed).await?;
        }
        for user in self.state.users.save_all(updated).await? {
            self.publish_membership_change(ChangeType::Removed, &user.id, &organization.id);
        }
        for user_id in &removed {
            self.publish_membership_change(ChangeType::Removed, user_id, &organization.id);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'a> ReadOnlyResource for OrganizationResource<'a> {
    type Model = Organization;
    type View = ViewOrganization;

    fn repository(&self) -> &Repository<Organization> {
        &self.state.organizations
    }

    fn context(&self) -> &RequestContext {
        self.ctx
    }

    fn map_view(&self, model: &Organization) -> ViewOrganization {
        ViewOrganization::from(model)
    }

    /// Members see their organizations; global admins also see deleted ones
    fn is_visible(&self, model: &Organization) -> bool {
        if self.ctx.is_global_admin() {
            return true;
        }
        !model.is_deleted && self.ctx.is_in_organization(&model.id)
    }
}

#[async_trait::async_trait]
impl<'a> RepositoryResource for OrganizationResource<'a> {
    type UpdateModel = UpdateOrganization;

    fn to_update_model(&self, model: &Organization) -> UpdateOrganization {
        UpdateOrganization {
            name: model.name.clone(),
            data: model.data.clone(),
        }
    }

    fn apply_update_model(&self, update: UpdateOrganization, model: &mut Organization) {
        model.name = update.name;
        model.data = update.data;
    }

    async fn can_update(&self, original: &Organization, modified: &Organization) -> Result<PermissionResult, ApiError> {
        if original.id != modified.id {
            return Ok(PermissionResult::deny_with_message("Id must match resource."));
        }
        if !self.can_administer(&original.id) {
            return Ok(PermissionResult::deny_with_status(
                "You must be an administrator of this organization.",
                403,
            ));
        }
        Ok(PermissionResult::allow())
    }

    async fn can_delete(&self, model: &Organization) -> Result<PermissionResult, ApiError> {
        if !self.ctx.can_access_organization(&model.id) {
            return Ok(PermissionResult::deny_with_not_found(model.id.clone()));
        }
        if !self.can_administer(&model.id) {
            return Ok(PermissionResult::deny_with_status(
                "You must be an administrator of this organization.",
                403,
            ));
        }
        Ok(PermissionResult::allow())
    }

    async fn delete_models(&self, models: Vec<Organization>) -> Result<Vec<Organization>, ApiError> {
        for organization in &models {
            self.release_members(organization).await?;
        }
        let models = models
            .into_iter()
            .map(|mut o| {
                o.is_deleted = true;
                o
            })
            .collect();
        Ok(self.state.organizations.save_all(models).await?)
    }

    async fn after_delete(&self, model: &Organization) -> Result<(), ApiError> {
        info!("Deleted organization {} ({})", model.name, model.id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'a> CreateResource for OrganizationResource<'a> {
    type NewModel = NewOrganization;

    fn map_new(&self, value: NewOrganization) -> Result<Organization, ApiError> {
        let mut organization = Organization::new(value.name);
        organization.data = value.data;
        Ok(organization)
    }

    async fn can_add(&self, _model: &Organization) -> Result<PermissionResult, ApiError> {
        if self.ctx.user.is_none() {
            return Ok(PermissionResult::deny_with_status("A user account is required", 401));
        }
        Ok(PermissionResult::allow())
    }

    /// The creator becomes the first admin
    async fn after_add(&self, model: Organization) -> Result<Organization, ApiError> {
        let user_id = self.ctx.current_user()?.id.clone();
        let mut user = self.state.users.select_404(&user_id).await?;
        if user.add_admin_membership(&model.id) {
            let user = self.state.users.save(user).await?;
            self.publish_membership_change(ChangeType::Added, &user.id, &model.id);
        }
        Ok(model)
    }
}

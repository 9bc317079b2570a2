// services/organization_service.rs - Invite acceptance and organization verification
use thiserror::Error;
use tracing::info;

use crate::auth::roles::{self, RoleSet};
use crate::database::models::{Organization, User};
use crate::database::{DatabaseError, Repository};
use crate::messaging::{Message, MessageBus, MEMBERSHIP_CHANGE_DELAY};
use crate::types::ChangeType;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Account invites are currently disabled.")]
    InvitesDisabled,
    #[error("An invite token is required.")]
    MissingInviteToken,
    #[error("The invite could not be found.")]
    InviteNotFound,
    #[error("The user that sent the invite was not found.")]
    InviterNotFound,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Clone)]
pub struct OrganizationService {
    organizations: Repository<Organization>,
    users: Repository<User>,
    bus: MessageBus,
    enable_account_invites: bool,
}

impl OrganizationService {
    pub fn new(
        organizations: Repository<Organization>,
        users: Repository<User>,
        bus: MessageBus,
        enable_account_invites: bool,
    ) -> Self {
        Self {
            organizations,
            users,
            bus,
            enable_account_invites,
        }
    }

    /// Accepts the invite behind `token` for `user`, adding the user when it is
    /// new. Returns the organization id and the stored user.
    pub async fn add_invited_user(&self, token: &str, mut user: User) -> Result<(String, User), MembershipError> {
        if !self.enable_account_invites {
            return Err(MembershipError::InvitesDisabled);
        }
        let token = token.trim();
        if token.is_empty() {
            return Err(MembershipError::MissingInviteToken);
        }

        let mut organization = self
            .organizations
            .by_invite_token(token)
            .await?
            .ok_or(MembershipError::InviteNotFound)?;
        let invite = organization
            .invite_by_token(token)
            .cloned()
            .ok_or(MembershipError::InviteNotFound)?;

        let mut save_user = false;
        if user.full_name == user.email_address {
            if let Some(full_name) = invite.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
                user.full_name = full_name.to_string();
                save_user = true;
            }
        }

        if !user.is_email_address_verified && user.email_address.eq_ignore_ascii_case(&invite.email_address) {
            user.mark_email_address_verified();
            save_user = true;
        }

        let granted = self
            .granted_roles(
                &organization,
                &invite.roles,
                invite.added_by_user_id.as_deref(),
                &mut user,
                &mut save_user,
            )
            .await?;
        let membership_added = user.added_membership_roles(&organization.id, &granted);
        save_user |= membership_added;

        let user = if user.id.is_empty() {
            self.users.add(user).await?
        } else if save_user {
            self.users.save(user).await?
        } else {
            user
        };

        organization.remove_invite_by_token(token);
        let organization = self.organizations.save(organization).await?;

        if membership_added {
            self.bus.publish_delayed(
                Message::UserMembershipChanged {
                    change_type: ChangeType::Added,
                    user_id: user.id.clone(),
                    organization_id: organization.id.clone(),
                },
                MEMBERSHIP_CHANGE_DELAY,
            );
        }
        info!("User {} accepted invite to organization {}", user.id, organization.id);
        Ok((organization.id, user))
    }

    /// Roles an invite may grant, given who sent it. Invites without a sender
    /// only grant user access.
    async fn granted_roles(
        &self,
        organization: &Organization,
        requested: &RoleSet,
        added_by_user_id: Option<&str>,
        user: &mut User,
        save_user: &mut bool,
    ) -> Result<RoleSet, MembershipError> {
        let Some(added_by_user_id) = added_by_user_id.filter(|id| !id.is_empty()) else {
            return Ok(roles::user_scope());
        };
        let added_by = self
            .users
            .select_one(added_by_user_id, true)
            .await?
            .ok_or(MembershipError::InviterNotFound)?;

        let requested_global = requested.iter().any(|r| r.eq_ignore_ascii_case(roles::GLOBAL_ADMIN));
        let requested_admin = requested.iter().any(|r| r.eq_ignore_ascii_case(roles::ADMIN));

        if requested_global {
            if added_by.is_global_admin() {
                *save_user |= user.added_global_admin_role();
                return Ok(roles::admin_scope());
            }
            if added_by.is_admin(&organization.id) {
                return Ok(roles::admin_scope());
            }
            return Ok(roles::user_scope());
        }

        if requested_admin && !added_by.is_admin(&organization.id) {
            return Ok(roles::user_scope());
        }

        if requested.is_empty() {
            Ok(roles::user_scope())
        } else {
            Ok(roles::with_implied(requested.iter().map(|r| r.to_lowercase()).collect()))
        }
    }

    /// Returns true when the organization was flipped to verified
    pub async fn try_mark_verified(&self, organization_id: &str) -> Result<bool, DatabaseError> {
        if organization_id.trim().is_empty() {
            return Ok(false);
        }
        let Some(mut organization) = self.organizations.select_one(organization_id, false).await? else {
            return Ok(false);
        };
        if organization.is_verified {
            return Ok(false);
        }
        organization.is_verified = true;
        self.organizations.save(organization).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Invite;
    use crate::testing::TestRepositories;
    use chrono::Utc;

    async fn setup(invite_roles: RoleSet) -> (TestRepositories, OrganizationService, Organization) {
        let repos = TestRepositories::new();
        let mut organization = Organization::new("Acme");
        organization.invites.push(Invite {
            token: "tok".into(),
            email_address: "new@example.com".into(),
            full_name: Some("New Person".into()),
            roles: invite_roles,
            added_by_user_id: None,
            date_added: Utc::now(),
        });
        let organization = repos.organizations.add(organization).await.unwrap();
        let service = OrganizationService::new(repos.organizations.clone(), repos.users.clone(), repos.bus.clone(), true);
        (repos, service, organization)
    }

    fn invitee() -> User {
        let mut user = User::new("new@example.com", "new@example.com");
        user.create_verify_email_address_token();
        user
    }

    #[tokio::test]
    async fn accepts_invite_and_verifies_matching_email() {
        let (repos, service, organization) = setup(roles::user_scope()).await;
        let (organization_id, user) = service.add_invited_user("tok", invitee()).await.unwrap();

        assert_eq!(organization_id, organization.id);
        assert!(!user.id.is_empty());
        assert_eq!(user.full_name, "New Person");
        assert!(user.is_email_address_verified);
        assert_eq!(user.membership(&organization.id).unwrap().roles, roles::user_scope());

        let stored = repos.organizations.select_404(&organization.id).await.unwrap();
        assert!(stored.invites.is_empty());
    }

    async fn set_inviter(repos: &TestRepositories, organization_id: &str, inviter: &User) {
        let mut org = repos.organizations.select_404(organization_id).await.unwrap();
        org.invites[0].added_by_user_id = Some(inviter.id.clone());
        repos.organizations.save(org).await.unwrap();
    }

    #[tokio::test]
    async fn admin_invite_from_non_admin_is_downgraded() {
        let (repos, service, organization) = setup(roles::admin_scope()).await;
        let mut inviter = repos.add_verified_user("Member", "member@example.com").await;
        inviter.added_membership_roles(&organization.id, &roles::user_scope());
        let inviter = repos.users.save(inviter).await.unwrap();
        set_inviter(&repos, &organization.id, &inviter).await;

        let (_, user) = service.add_invited_user("tok", invitee()).await.unwrap();
        assert!(user.is_member_of(&organization.id));
        assert!(!user.is_admin(&organization.id));
    }

    #[tokio::test]
    async fn admin_invite_from_admin_grants_admin() {
        let (repos, service, organization) = setup(roles::admin_scope()).await;
        let mut inviter = repos.add_verified_user("Owner", "owner@example.com").await;
        inviter.add_admin_membership(&organization.id);
        let inviter = repos.users.save(inviter).await.unwrap();
        set_inviter(&repos, &organization.id, &inviter).await;

        let (_, user) = service.add_invited_user("tok", invitee()).await.unwrap();
        assert!(user.is_admin(&organization.id));
        assert!(!user.is_global_admin());
    }

    #[tokio::test]
    async fn global_invite_from_global_admin_grants_global_role() {
        let (repos, service, organization) = setup(roles::global_scope()).await;
        let mut inviter = User::new("Root", "root@example.com");
        inviter.mark_email_address_verified();
        inviter.added_global_admin_role();
        let inviter = repos.users.add(inviter).await.unwrap();

        set_inviter(&repos, &organization.id, &inviter).await;

        let (_, user) = service.add_invited_user("tok", invitee()).await.unwrap();
        assert!(user.is_global_admin());
        assert!(user.is_admin(&organization.id));
    }

    #[tokio::test]
    async fn rejects_missing_and_unknown_tokens() {
        let (_repos, service, _) = setup(roles::user_scope()).await;
        assert!(matches!(
            service.add_invited_user(" ", invitee()).await,
            Err(MembershipError::MissingInviteToken)
        ));
        assert!(matches!(
            service.add_invited_user("nope", invitee()).await,
            Err(MembershipError::InviteNotFound)
        ));
    }

    #[tokio::test]
    async fn disabled_invites_are_rejected() {
        let repos = TestRepositories::new();
        let service = OrganizationService::new(repos.organizations.clone(), repos.users.clone(), repos.bus.clone(), false);
        assert!(matches!(
            service.add_invited_user("tok", invitee()).await,
            Err(MembershipError::InvitesDisabled)
        ));
    }

    #[tokio::test]
    async fn marks_organization_verified_once() {
        let (_repos, service, organization) = setup(roles::user_scope()).await;
        assert!(service.try_mark_verified(&organization.id).await.unwrap());
        assert!(!service.try_mark_verified(&organization.id).await.unwrap());
        assert!(!service.try_mark_verified("").await.unwrap());
    }
}

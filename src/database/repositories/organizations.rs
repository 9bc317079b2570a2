use serde_json::json;

use crate::database::models::Organization;
use crate::database::repository::Repository;
use crate::database::DatabaseError;

impl Repository<Organization> {
    pub async fn by_invite_token(&self, token: &str) -> Result<Option<Organization>, DatabaseError> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        self.find_first(json!({ "invites": [{ "token": token }] })).await
    }

    /// Live organizations among `ids`
    pub async fn by_ids(&self, ids: &[String]) -> Result<Vec<Organization>, DatabaseError> {
        let mut organizations = self.select_ids(ids, true).await?;
        organizations.retain(|o| !o.is_deleted);
        Ok(organizations)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::auth::roles;
    use crate::database::models::{Invite, Organization};
    use crate::testing::test_repository;

    #[tokio::test]
    async fn finds_by_invite_token_and_skips_deleted() {
        let repo = test_repository::<Organization>();
        let mut org = Organization::new("Acme");
        org.invites.push(Invite {
            token: "invite-token".into(),
            email_address: "new@example.com".into(),
            full_name: None,
            roles: roles::user_scope(),
            added_by_user_id: None,
            date_added: Utc::now(),
        });
        let org = repo.add(org).await.unwrap();
        let mut gone = Organization::new("Gone");
        gone.is_deleted = true;
        let gone = repo.add(gone).await.unwrap();

        assert_eq!(repo.by_invite_token("invite-token").await.unwrap().unwrap().id, org.id);
        assert!(repo.by_invite_token("").await.unwrap().is_none());

        let live = repo.by_ids(&[org.id.clone(), gone.id.clone()]).await.unwrap();
        assert_eq!(live.len(), 1);
    }
}

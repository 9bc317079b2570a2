use serde_json::{json, Value};

use crate::database::models::User;
use crate::database::repository::{FindResults, Repository};
use crate::database::DatabaseError;
use crate::filter::FilterData;

impl Repository<User> {
    /// Email lookups cache the user id under `user:email:{email}`
    pub async fn by_email(&self, email_address: &str) -> Result<Option<User>, DatabaseError> {
        let email_address = email_address.trim().to_lowercase();
        if email_address.is_empty() {
            return Ok(None);
        }

        let key = format!("user:email:{}", email_address);
        if let Some(Value::String(id)) = self.cache.get(&key).await {
            if let Some(user) = self.select_one(&id, true).await? {
                if user.email_address == email_address {
                    return Ok(Some(user));
                }
            }
            self.cache.remove(&key).await;
        }

        let user = self
            .find_first(json!({ "email_address": email_address }))
            .await?;
        if let Some(user) = &user {
            self.cache.set(&key, Value::String(user.id.clone()), None).await;
        }
        Ok(user)
    }

    pub async fn by_verify_email_address_token(&self, token: &str) -> Result<Option<User>, DatabaseError> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        self.find_first(json!({ "verify_email_address_token": token })).await
    }

    pub async fn by_password_reset_token(&self, token: &str) -> Result<Option<User>, DatabaseError> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        self.find_first(json!({ "password_reset_token": token })).await
    }

    pub async fn by_oauth(&self, provider: &str, provider_user_id: &str) -> Result<Option<User>, DatabaseError> {
        if provider_user_id.is_empty() {
            return Ok(None);
        }
        self.find_first(json!({
            "o_auth_accounts": [{
                "provider": provider.to_lowercase(),
                "provider_user_id": provider_user_id
            }]
        }))
        .await
    }

    /// Users holding a membership in the organization
    pub async fn by_organization(
        &self,
        organization_id: &str,
        filter: FilterData,
    ) -> Result<FindResults<User>, DatabaseError> {
        let filter = filter.with_pattern(json!({
            "memberships": [{ "organization_id": organization_id }]
        }));
        self.select_any(&filter).await
    }

    pub async fn all_by_organization(&self, organization_id: &str) -> Result<Vec<User>, DatabaseError> {
        self.select_all(json!({
            "memberships": [{ "organization_id": organization_id }]
        }))
        .await
    }

    pub async fn is_empty(&self) -> Result<bool, DatabaseError> {
        Ok(self.count(&FilterData::default()).await?.total == 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::test_repository;
    use crate::database::models::User;

    fn user(email: &str) -> User {
        let mut user = User::new("Test User", email);
        user.create_verify_email_address_token();
        user
    }

    #[tokio::test]
    async fn finds_by_email_case_insensitively() {
        let repo = test_repository::<User>();
        assert!(repo.is_empty().await.unwrap());
        let added = repo.add(user("Someone@Example.com")).await.unwrap();

        let found = repo.by_email("SOMEONE@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, added.id);
        // Second lookup goes through the cached id
        assert!(repo.by_email("someone@example.com").await.unwrap().is_some());
        assert!(repo.by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn email_change_is_not_served_from_cache() {
        let repo = test_repository::<User>();
        let added = repo.add(user("old@example.com")).await.unwrap();
        repo.by_email("old@example.com").await.unwrap();

        let mut changed = added.clone();
        changed.email_address = "new@example.com".into();
        repo.save(changed).await.unwrap();

        assert!(repo.by_email("old@example.com").await.unwrap().is_none());
        assert!(repo.by_email("new@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn finds_by_membership_and_oauth() {
        let repo = test_repository::<User>();
        let mut member = user("member@example.com");
        member.add_admin_membership("org1");
        member.add_oauth_account("GitHub", "42", "octo");
        repo.add(member).await.unwrap();
        repo.add(user("other@example.com")).await.unwrap();

        let members = repo.all_by_organization("org1").await.unwrap();
        assert_eq!(members.len(), 1);
        assert!(repo.by_oauth("github", "42").await.unwrap().is_some());
        assert!(repo.by_oauth("google", "42").await.unwrap().is_none());
    }
}

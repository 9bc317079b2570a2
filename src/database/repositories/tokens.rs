use chrono::{Duration, Utc};
use serde_json::json;

use crate::auth::password::generate_token;
use crate::database::models::{Token, TokenType};
use crate::database::repository::{FindResults, Repository};
use crate::database::DatabaseError;
use crate::filter::FilterData;

impl Repository<Token> {
    /// Organization API tokens: access tokens not bound to a user
    pub async fn api_tokens(
        &self,
        organization_id: &str,
        filter: FilterData,
    ) -> Result<FindResults<Token>, DatabaseError> {
        let filter = filter.with_pattern(json!({
            "organization_id": organization_id,
            "type": "access",
            "user_id": null
        }));
        self.select_any(&filter).await
    }

    pub async fn by_user_id(&self, user_id: &str) -> Result<Vec<Token>, DatabaseError> {
        self.select_all(json!({ "user_id": user_id })).await
    }

    pub async fn by_refresh(&self, refresh: &str) -> Result<Option<Token>, DatabaseError> {
        if refresh.is_empty() {
            return Ok(None);
        }
        self.find_first(json!({ "refresh": refresh })).await
    }

    /// Reuses the user's unexpired token for the organization, otherwise issues one
    /// valid for `expiry_hours`
    pub async fn get_or_create_user_token(
        &self,
        user_id: &str,
        organization_id: Option<&str>,
        expiry_hours: u64,
    ) -> Result<Token, DatabaseError> {
        let now = Utc::now();
        let existing = self
            .by_user_id(user_id)
            .await?
            .into_iter()
            .find(|t| t.organization_id.as_deref() == organization_id && t.expires_utc.is_some_and(|e| e > now));
        if let Some(token) = existing {
            return Ok(token);
        }

        let mut token = Token::new(generate_token(), TokenType::Access);
        token.user_id = Some(user_id.to_string());
        token.organization_id = organization_id.map(str::to_string);
        token.created_by = Some(user_id.to_string());
        token.expires_utc = Some(now + Duration::hours(expiry_hours as i64));
        self.add(token).await
    }
}

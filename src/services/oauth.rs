// services/oauth.rs - Authorization code exchange with external identity providers
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{AppSettings, OAuthProviderSettings};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USER_INFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";
const USER_AGENT: &str = concat!("orgbase-api/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth provider '{0}' is not configured")]
    ProviderNotConfigured(String),
    #[error("Unknown OAuth provider '{0}'")]
    UnknownProvider(String),
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider did not return an access token")]
    MissingAccessToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    pub fn name(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
        }
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::GitHub),
            other => Err(OAuthError::UnknownProvider(other.to_string())),
        }
    }
}

/// Identity reported by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthUserInfo {
    pub provider: OAuthProvider,
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl OAuthUserInfo {
    /// Falls back to the email address when the provider has no name
    pub fn display_name(&self) -> String {
        self.full_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct GoogleUser {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    google: OAuthProviderSettings,
    github: OAuthProviderSettings,
}

impl OAuthClient {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            google: settings.google.clone(),
            github: settings.github.clone(),
        }
    }

    fn settings(&self, provider: OAuthProvider) -> &OAuthProviderSettings {
        match provider {
            OAuthProvider::Google => &self.google,
            OAuthProvider::GitHub => &self.github,
        }
    }

    pub fn is_configured(&self, provider: OAuthProvider) -> bool {
        self.settings(provider).is_configured()
    }

    pub async fn get_user_info(
        &self,
        provider: OAuthProvider,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<OAuthUserInfo, OAuthError> {
        let settings = self.settings(provider);
        let (Some(client_id), Some(client_secret)) = (settings.client_id.as_deref(), settings.client_secret.as_deref())
        else {
            return Err(OAuthError::ProviderNotConfigured(provider.name().to_string()));
        };
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(OAuthError::ProviderNotConfigured(provider.name().to_string()));
        }

        let token_url = match provider {
            OAuthProvider::Google => GOOGLE_TOKEN_URL,
            OAuthProvider::GitHub => GITHUB_TOKEN_URL,
        };
        let mut form = vec![
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "authorization_code"),
        ];
        if let Some(redirect_uri) = redirect_uri {
            form.push(("redirect_uri", redirect_uri));
        }

        let token: AccessTokenResponse = self
            .http
            .post(token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let access_token = token.access_token.ok_or(OAuthError::MissingAccessToken)?;
        debug!("Exchanged {} authorization code", provider.name());

        match provider {
            OAuthProvider::Google => self.google_user(&access_token).await,
            OAuthProvider::GitHub => self.github_user(&access_token).await,
        }
    }

    async fn google_user(&self, access_token: &str) -> Result<OAuthUserInfo, OAuthError> {
        let user: GoogleUser = self
            .http
            .get(GOOGLE_USER_INFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let full_name = user.name.or_else(|| {
            let joined = [user.given_name, user.family_name]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        });
        Ok(OAuthUserInfo {
            provider: OAuthProvider::Google,
            id: user.sub,
            email: user.email,
            full_name,
        })
    }

    async fn github_user(&self, access_token: &str) -> Result<OAuthUserInfo, OAuthError> {
        let user: GitHubUser = self
            .http
            .get(GITHUB_USER_URL)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Private addresses are only listed by the emails endpoint
        let email = match user.email {
            Some(email) => Some(email),
            None => {
                let emails: Vec<GitHubEmail> = self
                    .http
                    .get(GITHUB_EMAILS_URL)
                    .bearer_auth(access_token)
                    .header(reqwest::header::USER_AGENT, USER_AGENT)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                emails
                    .into_iter()
                    .filter(|e| e.verified)
                    .max_by_key(|e| e.primary)
                    .map(|e| e.email)
            }
        };

        Ok(OAuthUserInfo {
            provider: OAuthProvider::GitHub,
            id: user.id.to_string(),
            email,
            full_name: user.name.or(Some(user.login)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn parses_provider_names() {
        assert_eq!("Google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
        assert_eq!("github".parse::<OAuthProvider>().unwrap().name(), "github");
        assert!("facebook".parse::<OAuthProvider>().is_err());
    }

    #[tokio::test]
    async fn unconfigured_provider_is_rejected_without_network() {
        let client = OAuthClient::new(&AppConfig::development().settings);
        assert!(!client.is_configured(OAuthProvider::Google));
        let err = client
            .get_user_info(OAuthProvider::Google, "code", None)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::ProviderNotConfigured(_)));
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let info = OAuthUserInfo {
            provider: OAuthProvider::GitHub,
            id: "42".into(),
            email: Some("dev@example.com".into()),
            full_name: Some(" ".into()),
        };
        assert_eq!(info.display_name(), "dev@example.com");
    }
}

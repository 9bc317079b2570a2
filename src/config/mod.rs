use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
    pub settings: AppSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub require_https: bool,
    pub enable_audit_logging: bool,
    pub user_token_expiry_hours: u64,
    /// Requests each caller may make per throttle period
    pub api_throttle_limit: u64,
    pub api_throttle_period_secs: u64,
}

/// Effectively unlimited unless `API_THROTTLE_LIMIT` is set
pub const DEFAULT_API_THROTTLE_LIMIT: u64 = i32::MAX as u64;
pub const DEFAULT_API_THROTTLE_PERIOD_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageProvider {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "inmemory" => Ok(StorageProvider::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StorageProvider::Postgres),
            other => Err(format!("unknown storage provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_cache: bool,
    pub cache_ttl_secs: u64,
    pub mail_queue_retries: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthProviderSettings {
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
}

impl OAuthProviderSettings {
    pub fn is_configured(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Application level switches and outbound integration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub website_name: String,
    pub app_url: String,
    pub enable_account_creation: bool,
    pub enable_account_invites: bool,
    pub mail_from: String,
    pub test_email_address: String,
    pub allowed_outbound_addresses: Vec<String>,
    pub smtp: SmtpSettings,
    pub google: OAuthProviderSettings,
    pub github: OAuthProviderSettings,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Ok(v) = env::var("API_HOST") {
            self.api.host = v;
        }
        if let Some(v) = env::var("ORGBASE_API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("SECURITY_REQUIRE_HTTPS") {
            self.security.require_https = v.parse().unwrap_or(self.security.require_https);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_AUDIT_LOGGING") {
            self.security.enable_audit_logging = v.parse().unwrap_or(self.security.enable_audit_logging);
        }
        if let Ok(v) = env::var("SECURITY_USER_TOKEN_EXPIRY_HOURS") {
            self.security.user_token_expiry_hours = v.parse().unwrap_or(self.security.user_token_expiry_hours);
        }
        if let Ok(v) = env::var("API_THROTTLE_LIMIT") {
            self.security.api_throttle_limit = v.parse().unwrap_or(self.security.api_throttle_limit);
        }
        if let Ok(v) = env::var("API_THROTTLE_PERIOD_SECS") {
            self.security.api_throttle_period_secs = v.parse().unwrap_or(self.security.api_throttle_period_secs);
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_PROVIDER") {
            self.storage.provider = v.parse().unwrap_or(self.storage.provider);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.storage.database_url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.storage.max_connections = v.parse().unwrap_or(self.storage.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.storage.connection_timeout = v.parse().unwrap_or(self.storage.connection_timeout);
        }
        if let Ok(v) = env::var("STORAGE_ENABLE_CACHE") {
            self.storage.enable_cache = v.parse().unwrap_or(self.storage.enable_cache);
        }
        if let Ok(v) = env::var("STORAGE_CACHE_TTL_SECS") {
            self.storage.cache_ttl_secs = v.parse().unwrap_or(self.storage.cache_ttl_secs);
        }
        if let Ok(v) = env::var("MAIL_QUEUE_RETRIES") {
            self.storage.mail_queue_retries = v.parse().unwrap_or(self.storage.mail_queue_retries);
        }

        // Application settings
        if let Ok(v) = env::var("WEBSITE_NAME") {
            self.settings.website_name = v;
        }
        if let Ok(v) = env::var("APP_URL") {
            self.settings.app_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("ENABLE_ACCOUNT_CREATION") {
            self.settings.enable_account_creation = v.parse().unwrap_or(self.settings.enable_account_creation);
        }
        if let Ok(v) = env::var("ENABLE_ACCOUNT_INVITES") {
            self.settings.enable_account_invites = v.parse().unwrap_or(self.settings.enable_account_invites);
        }
        if let Ok(v) = env::var("MAIL_FROM") {
            self.settings.mail_from = v;
        }
        if let Ok(v) = env::var("TEST_EMAIL_ADDRESS") {
            self.settings.test_email_address = v;
        }
        if let Ok(v) = env::var("ALLOWED_OUTBOUND_ADDRESSES") {
            self.settings.allowed_outbound_addresses = v
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // SMTP
        if let Ok(v) = env::var("SMTP_HOST") {
            self.settings.smtp.enabled = !v.is_empty();
            self.settings.smtp.host = v;
        }
        if let Ok(v) = env::var("SMTP_PORT") {
            self.settings.smtp.port = v.parse().unwrap_or(self.settings.smtp.port);
        }
        if let Ok(v) = env::var("SMTP_USER") {
            self.settings.smtp.user = Some(v);
        }
        if let Ok(v) = env::var("SMTP_PASSWORD") {
            self.settings.smtp.password = Some(v);
        }

        // OAuth providers
        if let Ok(v) = env::var("GOOGLE_APP_ID") {
            self.settings.google.client_id = Some(v);
        }
        if let Ok(v) = env::var("GOOGLE_APP_SECRET") {
            self.settings.google.client_secret = Some(v);
        }
        if let Ok(v) = env::var("GITHUB_APP_ID") {
            self.settings.github.client_id = Some(v);
        }
        if let Ok(v) = env::var("GITHUB_APP_SECRET") {
            self.settings.github.client_secret = Some(v);
        }

        self
    }

    fn base_settings() -> AppSettings {
        AppSettings {
            website_name: "Orgbase".to_string(),
            app_url: "http://localhost:5173".to_string(),
            enable_account_creation: true,
            enable_account_invites: true,
            mail_from: "Orgbase <noreply@localhost>".to_string(),
            test_email_address: "test@localhost".to_string(),
            allowed_outbound_addresses: vec!["localhost".to_string()],
            smtp: SmtpSettings {
                enabled: false,
                host: String::new(),
                port: 587,
                user: None,
                password: None,
            },
            google: OAuthProviderSettings::default(),
            github: OAuthProviderSettings::default(),
        }
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                require_https: false,
                enable_audit_logging: true,
                user_token_expiry_hours: 24 * 7, // 1 week
                api_throttle_limit: DEFAULT_API_THROTTLE_LIMIT,
                api_throttle_period_secs: DEFAULT_API_THROTTLE_PERIOD_SECS,
            },
            storage: StorageConfig {
                provider: StorageProvider::Memory,
                database_url: None,
                max_connections: 10,
                connection_timeout: 30,
                enable_cache: true,
                cache_ttl_secs: 300,
                mail_queue_retries: 2,
            },
            settings: Self::base_settings(),
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                require_https: true,
                enable_audit_logging: true,
                user_token_expiry_hours: 24 * 7,
                api_throttle_limit: DEFAULT_API_THROTTLE_LIMIT,
                api_throttle_period_secs: DEFAULT_API_THROTTLE_PERIOD_SECS,
            },
            storage: StorageConfig {
                provider: StorageProvider::Postgres,
                database_url: None,
                max_connections: 20,
                connection_timeout: 10,
                enable_cache: true,
                cache_ttl_secs: 300,
                mail_queue_retries: 2,
            },
            settings: AppSettings {
                app_url: "https://staging.example.com".to_string(),
                ..Self::base_settings()
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                require_https: true,
                enable_audit_logging: true,
                user_token_expiry_hours: 24 * 30,
                api_throttle_limit: DEFAULT_API_THROTTLE_LIMIT,
                api_throttle_period_secs: DEFAULT_API_THROTTLE_PERIOD_SECS,
            },
            storage: StorageConfig {
                provider: StorageProvider::Postgres,
                database_url: None,
                max_connections: 50,
                connection_timeout: 5,
                enable_cache: true,
                cache_ttl_secs: 900,
                mail_queue_retries: 2,
            },
            settings: AppSettings {
                app_url: "https://app.example.com".to_string(),
                allowed_outbound_addresses: vec![],
                ..Self::base_settings()
            },
        }
    }

    /// Outbound mail is filtered against the allow list outside production
    pub fn restricts_outbound_mail(&self) -> bool {
        self.environment != Environment::Production
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert!(config.settings.enable_account_creation);
        assert!(config.restricts_outbound_mail());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.storage.provider, StorageProvider::Postgres);
        assert!(config.security.require_https);
        assert!(!config.restricts_outbound_mail());
    }

    #[test]
    fn test_storage_provider_parse() {
        assert_eq!("Memory".parse::<StorageProvider>(), Ok(StorageProvider::Memory));
        assert_eq!("postgresql".parse::<StorageProvider>(), Ok(StorageProvider::Postgres));
        assert!("redis".parse::<StorageProvider>().is_err());
    }

    #[test]
    fn test_settings_serialization_hides_secrets() {
        let mut config = AppConfig::development();
        config.settings.smtp.password = Some("hunter2".to_string());
        config.settings.google.client_secret = Some("shh".to_string());
        let value = serde_json::to_value(&config.settings).unwrap();
        assert!(value["smtp"].get("password").is_none());
        assert!(value["google"].get("client_secret").is_none());
    }
}

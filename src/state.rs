// state.rs - Shared application state handed to every handler
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::{CacheClient, InMemoryCacheClient};
use crate::config::{AppConfig, StorageProvider};
use crate::database::models::{LogEvent, Notification, Organization, Token, User};
use crate::database::{DatabaseError, DatabaseManager, DocumentStore, MemoryStore, PostgresStore, Repository, RepositoryOptions};
use crate::mail::{InMemoryMailSender, MailError, MailMessage, MailSender, Mailer, SmtpMailSender, WhitelistMailSender};
use crate::messaging::MessageBus;
use crate::queue::{InMemoryQueue, Queue};
use crate::services::{OAuthClient, OrganizationService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn CacheClient>,
    pub bus: MessageBus,
    pub users: Repository<User>,
    pub organizations: Repository<Organization>,
    pub tokens: Repository<Token>,
    pub notifications: Repository<Notification>,
    pub logs: Repository<LogEvent>,
    pub organization_service: OrganizationService,
    pub mail_queue: Arc<dyn Queue<MailMessage>>,
    pub mail_sender: Arc<dyn MailSender>,
    pub mailer: Mailer,
    pub oauth: OAuthClient,
    pub started_utc: DateTime<Utc>,
}

impl AppState {
    /// Opens the configured store and assembles the state around it
    pub async fn connect(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.storage.provider {
            StorageProvider::Memory => {
                info!("Using in-memory document store");
                Arc::new(MemoryStore::new())
            }
            StorageProvider::Postgres => {
                let pool = DatabaseManager::pool(&config.storage).await?;
                let store = PostgresStore::new(pool);
                store.ensure_schema().await?;
                info!("Using PostgreSQL document store");
                Arc::new(store)
            }
        };
        let mail_sender = Self::default_mail_sender(&config)?;
        Ok(Self::build(config, store, mail_sender))
    }

    /// SMTP when configured, otherwise an in-memory outbox. Outside production
    /// the sender only delivers to allowed addresses.
    pub fn default_mail_sender(config: &AppConfig) -> Result<Arc<dyn MailSender>, MailError> {
        let settings = &config.settings;
        let sender: Arc<dyn MailSender> = if settings.smtp.enabled {
            info!("Delivering mail through {}:{}", settings.smtp.host, settings.smtp.port);
            Arc::new(SmtpMailSender::new(&settings.smtp, settings.mail_from.clone())?)
        } else {
            Arc::new(InMemoryMailSender::new())
        };

        if config.restricts_outbound_mail() {
            Ok(Arc::new(WhitelistMailSender::new(sender, settings)))
        } else {
            Ok(sender)
        }
    }

    pub fn build(config: AppConfig, store: Arc<dyn DocumentStore>, mail_sender: Arc<dyn MailSender>) -> Self {
        let cache: Arc<dyn CacheClient> = Arc::new(InMemoryCacheClient::new());
        let bus = MessageBus::default();
        let options = RepositoryOptions {
            use_cache: config.storage.enable_cache,
            cache_ttl: Duration::from_secs(config.storage.cache_ttl_secs),
        };

        let users = Repository::new(store.clone(), cache.clone(), bus.clone(), options.clone());
        let organizations = Repository::new(store.clone(), cache.clone(), bus.clone(), options.clone());
        let tokens = Repository::new(store.clone(), cache.clone(), bus.clone(), options.clone());
        let notifications = Repository::new(store.clone(), cache.clone(), bus.clone(), options.clone());
        let logs = Repository::new(store.clone(), cache.clone(), bus.clone(), options);

        let organization_service = OrganizationService::new(
            organizations.clone(),
            users.clone(),
            bus.clone(),
            config.settings.enable_account_invites,
        );

        let mail_queue: Arc<dyn Queue<MailMessage>> =
            Arc::new(InMemoryQueue::new("mail", config.storage.mail_queue_retries));
        let mailer = Mailer::new(&config.settings, mail_queue.clone());
        let oauth = OAuthClient::new(&config.settings);

        Self {
            config: Arc::new(config),
            store,
            cache,
            bus,
            users,
            organizations,
            tokens,
            notifications,
            logs,
            organization_service,
            mail_queue,
            mail_sender,
            mailer,
            oauth,
            started_utc: Utc::now(),
        }
    }

    /// Session token for a user in an organization
    pub async fn user_token(&self, user_id: &str, organization_id: Option<&str>) -> Result<String, DatabaseError> {
        let token = self
            .tokens
            .get_or_create_user_token(user_id, organization_id, self.config.security.user_token_expiry_hours)
            .await?;
        Ok(token.id)
    }

    /// Writes an audit entry when audit logging is enabled
    pub async fn audit(&self, event: LogEvent) {
        if self.config.security.enable_audit_logging {
            self.logs.record(event).await;
        }
    }
}

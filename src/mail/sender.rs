// mail/sender.rs - Delivery backends for queued mail
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{MailError, MailMessage};
use crate::config::{AppSettings, SmtpSettings};

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// SMTP delivery through lettre's async transport
pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    default_from: String,
}

impl SmtpMailSender {
    pub fn new(smtp: &SmtpSettings, default_from: impl Into<String>) -> Result<Self, MailError> {
        // Port 25 is plain relay, anything else negotiates STARTTLS
        let mut builder = if smtp.port == 25 {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
        };
        builder = builder.port(smtp.port);
        if let (Some(user), Some(password)) = (&smtp.user, &smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            default_from: default_from.into(),
        })
    }

    fn build_message(&self, message: MailMessage) -> Result<Message, MailError> {
        if message.recipient_count() == 0 {
            return Err(MailError::NoRecipients);
        }

        let from = message.from.as_deref().unwrap_or(&self.default_from);
        let mut builder = Message::builder()
            .from(from.parse::<Mailbox>()?)
            .subject(message.subject);
        for address in &message.to {
            builder = builder.to(address.parse::<Mailbox>()?);
        }
        for address in &message.cc {
            builder = builder.cc(address.parse::<Mailbox>()?);
        }
        for address in &message.bcc {
            builder = builder.bcc(address.parse::<Mailbox>()?);
        }

        let built = match message.html_body {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(message.text_body, html))?,
            None => builder.header(ContentType::TEXT_PLAIN).body(message.text_body)?,
        };
        Ok(built)
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let email = self.build_message(message)?;
        self.transport.send(email).await?;
        Ok(())
    }
}

/// Keeps the most recent messages in memory instead of delivering them
pub struct InMemoryMailSender {
    capacity: usize,
    recent: Mutex<VecDeque<MailMessage>>,
    total_sent: AtomicU64,
}

impl InMemoryMailSender {
    pub const DEFAULT_CAPACITY: usize = 25;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            recent: Mutex::new(VecDeque::new()),
            total_sent: AtomicU64::new(0),
        }
    }

    pub async fn recent_messages(&self) -> Vec<MailMessage> {
        self.recent.lock().await.iter().cloned().collect()
    }

    pub async fn last_message(&self) -> Option<MailMessage> {
        self.recent.lock().await.back().cloned()
    }

    pub fn total_sent(&self) -> u64 {
        self.total_sent.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryMailSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailSender for InMemoryMailSender {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        debug!("Captured mail to {:?}: {}", message.to, message.subject);
        let mut recent = self.recent.lock().await;
        recent.push_back(message);
        while recent.len() > self.capacity {
            recent.pop_front();
        }
        self.total_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Drops recipients outside the allow list and redirects the message to the
/// test address. Used outside production.
pub struct WhitelistMailSender {
    inner: Arc<dyn MailSender>,
    allowed: Vec<String>,
    test_address: String,
}

impl WhitelistMailSender {
    pub fn new(inner: Arc<dyn MailSender>, settings: &AppSettings) -> Self {
        Self {
            inner,
            allowed: settings
                .allowed_outbound_addresses
                .iter()
                .map(|a| a.to_lowercase())
                .collect(),
            test_address: settings.test_email_address.clone(),
        }
    }

    fn is_allowed(&self, address: &str) -> bool {
        let address = address.to_lowercase();
        self.allowed.iter().any(|a| address.contains(a.as_str()))
    }

    fn drain_invalid(&self, addresses: &mut BTreeSet<String>) -> Vec<String> {
        let invalid: Vec<String> = addresses.iter().filter(|a| !self.is_allowed(a)).cloned().collect();
        for address in &invalid {
            addresses.remove(address);
        }
        invalid
    }

    pub fn clean(&self, message: &mut MailMessage) {
        let mut invalid = self.drain_invalid(&mut message.to);
        invalid.extend(self.drain_invalid(&mut message.cc));
        invalid.extend(self.drain_invalid(&mut message.bcc));
        if invalid.is_empty() {
            return;
        }

        let removed = invalid.join(", ");
        if invalid.len() <= 3 {
            message.subject = format!("[{}] {}", removed, message.subject);
        }
        message.add_to(&self.test_address);
        info!("Redirected mail to {}; original recipients: {}", self.test_address, removed);
    }
}

#[async_trait]
impl MailSender for WhitelistMailSender {
    async fn send(&self, mut message: MailMessage) -> Result<(), MailError> {
        self.clean(&mut message);
        self.inner.send(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn whitelist(inner: Arc<InMemoryMailSender>) -> WhitelistMailSender {
        let mut settings = AppConfig::development().settings;
        settings.allowed_outbound_addresses = vec!["@example.com".into()];
        settings.test_email_address = "qa@example.com".into();
        WhitelistMailSender::new(inner, &settings)
    }

    #[tokio::test]
    async fn in_memory_sender_keeps_recent_messages() {
        let sender = InMemoryMailSender::with_capacity(2);
        for i in 0..3 {
            sender
                .send(MailMessage::new("a@example.com", format!("m{}", i), "body"))
                .await
                .unwrap();
        }
        let recent = sender.recent_messages().await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].subject, "m1");
        assert_eq!(sender.total_sent(), 3);
    }

    #[tokio::test]
    async fn whitelist_redirects_blocked_recipients() {
        let inner = Arc::new(InMemoryMailSender::new());
        let sender = whitelist(inner.clone());

        let mut message = MailMessage::new("Someone@Gmail.com", "Welcome", "body");
        message.add_to("ok@example.com");
        sender.send(message).await.unwrap();

        let delivered = inner.last_message().await.unwrap();
        assert_eq!(delivered.subject, "[someone@gmail.com] Welcome");
        assert!(delivered.to.contains("ok@example.com"));
        assert!(delivered.to.contains("qa@example.com"));
        assert!(!delivered.to.contains("someone@gmail.com"));
    }

    #[tokio::test]
    async fn whitelist_leaves_allowed_mail_untouched() {
        let inner = Arc::new(InMemoryMailSender::new());
        let sender = whitelist(inner.clone());
        sender
            .send(MailMessage::new("ok@example.com", "Hello", "body"))
            .await
            .unwrap();
        let delivered = inner.last_message().await.unwrap();
        assert_eq!(delivered.subject, "Hello");
        assert_eq!(delivered.to.len(), 1);
    }

    #[test]
    fn many_blocked_recipients_keep_subject() {
        let sender = whitelist(Arc::new(InMemoryMailSender::new()));
        let mut message = MailMessage::new("a@x.com", "Report", "body");
        for address in ["b@x.com", "c@x.com", "d@x.com"] {
            message.add_to(address);
        }
        sender.clean(&mut message);
        assert_eq!(message.subject, "Report");
        assert_eq!(message.to.len(), 1);
    }
}

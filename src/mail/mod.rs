// mail/mod.rs - Outbound mail: composition, queueing and delivery
pub mod job;
pub mod mailer;
pub mod message;
pub mod sender;

use thiserror::Error;

use crate::queue::QueueError;

pub use job::MailMessageJob;
pub use mailer::Mailer;
pub use message::MailMessage;
pub use sender::{InMemoryMailSender, MailSender, SmtpMailSender, WhitelistMailSender};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Message has no recipients")]
    NoRecipients,
    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Unable to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A queued outbound message. Addresses are stored lowercased so sets stay
/// case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub to: BTreeSet<String>,
    #[serde(default)]
    pub cc: BTreeSet<String>,
    #[serde(default)]
    pub bcc: BTreeSet<String>,
    #[serde(default)]
    pub from: Option<String>,
    pub subject: String,
    pub text_body: String,
    #[serde(default)]
    pub html_body: Option<String>,
}

impl MailMessage {
    pub fn new(to: &str, subject: impl Into<String>, text_body: impl Into<String>) -> Self {
        let mut message = Self {
            subject: subject.into(),
            text_body: text_body.into(),
            ..Default::default()
        };
        message.add_to(to);
        message
    }

    pub fn add_to(&mut self, address: &str) {
        let address = address.trim().to_lowercase();
        if !address.is_empty() {
            self.to.insert(address);
        }
    }

    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

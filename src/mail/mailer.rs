// mail/mailer.rs - Composes account mails and queues them for delivery
use std::sync::Arc;
use tracing::debug;

use super::{MailError, MailMessage};
use crate::config::AppSettings;
use crate::database::models::{Invite, Organization, User};
use crate::queue::Queue;

#[derive(Clone)]
pub struct Mailer {
    queue: Arc<dyn Queue<MailMessage>>,
    website_name: String,
    app_url: String,
    from: String,
}

impl Mailer {
    pub fn new(settings: &AppSettings, queue: Arc<dyn Queue<MailMessage>>) -> Self {
        Self {
            queue,
            website_name: settings.website_name.clone(),
            app_url: settings.app_url.trim_end_matches('/').to_string(),
            from: settings.mail_from.clone(),
        }
    }

    /// Skipped when the user has no reset token
    pub async fn send_password_reset(&self, user: &User) -> Result<(), MailError> {
        let Some(token) = user.password_reset_token.as_deref() else {
            return Ok(());
        };
        let body = format!(
            "Hi {},\n\nWe received a request to reset your {} password. Follow the link below to choose a new one:\n\n{}/reset-password/{}\n\nThe link expires in 24 hours. If you did not request a reset you can ignore this message.",
            user.full_name, self.website_name, self.app_url, token
        );
        self.queue_message(&user.email_address, format!("{} Password Reset", self.website_name), body)
            .await
    }

    pub async fn send_password_reset_email_not_found(&self, email_address: &str) -> Result<(), MailError> {
        let body = format!(
            "Someone asked to reset the {} password for {}, but no account uses this address.\n\nIf you meant to sign up, visit {}/signup.",
            self.website_name, email_address, self.app_url
        );
        self.queue_message(email_address, format!("{} Password Reset", self.website_name), body)
            .await
    }

    pub async fn send_verify_email(&self, user: &User) -> Result<(), MailError> {
        let Some(token) = user.verify_email_address_token.as_deref() else {
            return Ok(());
        };
        let body = format!(
            "Hi {},\n\nPlease confirm your email address for {}:\n\n{}/verify?token={}",
            user.full_name, self.website_name, self.app_url, token
        );
        self.queue_message(&user.email_address, format!("{} Account Confirmation", self.website_name), body)
            .await
    }

    pub async fn send_invite(&self, sender: &User, organization: &Organization, invite: &Invite) -> Result<(), MailError> {
        let body = format!(
            "{} has invited you to join the \"{}\" organization on {}.\n\nAccept the invite here:\n\n{}/signup?token={}",
            sender.full_name, organization.name, self.website_name, self.app_url, invite.token
        );
        self.queue_message(
            &invite.email_address,
            format!("{} Invite", self.website_name),
            body,
        )
        .await
    }

    pub async fn send_added_to_organization(
        &self,
        sender: &User,
        organization: &Organization,
        user: &User,
    ) -> Result<(), MailError> {
        let body = format!(
            "Hi {},\n\n{} has added you to the \"{}\" organization on {}.\n\n{}/",
            user.full_name, sender.full_name, organization.name, self.website_name, self.app_url
        );
        self.queue_message(
            &user.email_address,
            format!("{} Added To Organization", self.website_name),
            body,
        )
        .await
    }

    async fn queue_message(&self, to: &str, subject: String, text_body: String) -> Result<(), MailError> {
        let mut message = MailMessage::new(to, subject, text_body);
        if message.recipient_count() == 0 {
            return Err(MailError::NoRecipients);
        }
        message.from = Some(self.from.clone());
        let id = self.queue.enqueue(message).await?;
        debug!("Queued mail {} to {}", id, to);
        Ok(())
    }
}

// mail/job.rs - Background worker draining the mail queue
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, trace};

use super::{MailError, MailMessage, MailSender};
use crate::queue::Queue;

const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct MailMessageJob {
    queue: Arc<dyn Queue<MailMessage>>,
    sender: Arc<dyn MailSender>,
}

impl MailMessageJob {
    pub fn new(queue: Arc<dyn Queue<MailMessage>>, sender: Arc<dyn MailSender>) -> Self {
        Self { queue, sender }
    }

    /// Processes at most one message. Returns whether one was dequeued.
    pub async fn run_once(&self, timeout: Duration) -> Result<bool, MailError> {
        let Some(entry) = self.queue.dequeue(timeout).await? else {
            return Ok(false);
        };
        trace!("Processing mail message '{}'", entry.id);

        match self.sender.send(entry.value.clone()).await {
            Ok(()) => {
                info!(
                    "Sent message: to={} subject=\"{}\"",
                    entry.value.to.iter().cloned().collect::<Vec<_>>().join(","),
                    entry.value.subject
                );
                self.queue.complete(&entry).await?;
            }
            Err(e) => {
                error!("Unable to send mail message '{}' (attempt {}): {}", entry.id, entry.attempts, e);
                self.queue.abandon(entry).await?;
            }
        }
        Ok(true)
    }

    /// Runs until `shutdown` flips to true. The flag is checked between messages so a
    /// send in progress always finishes and is completed or abandoned.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!("Mail job started on queue '{}'", self.queue.name());
        // A dropped sender also stops the job
        while !*shutdown.borrow() && shutdown.has_changed().is_ok() {
            if let Err(e) = self.run_once(DEQUEUE_TIMEOUT).await {
                error!("Mail job error: {}", e);
            }
        }
        info!("Mail job stopped");
    }
}

// messaging/mod.rs - In-process change notifications
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::ChangeType;

/// Delay applied to membership change messages so readers see the saved user
pub const MEMBERSHIP_CHANGE_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum Message {
    EntityChanged {
        #[serde(rename = "type")]
        entity_type: String,
        id: String,
        organization_id: Option<String>,
        change_type: ChangeType,
    },
    UserMembershipChanged {
        change_type: ChangeType,
        user_id: String,
        organization_id: String,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::EntityChanged { .. } => "entity_changed",
            Message::UserMembershipChanged { .. } => "user_membership_changed",
        }
    }
}

/// Broadcast channel shared by publishers and subscribers
#[derive(Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<Message>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Messages without subscribers are dropped
    pub fn publish(&self, message: Message) {
        debug!(
            message = message.kind(),
            subscriber_count = self.tx.receiver_count(),
            "MessageBus publish"
        );
        let _ = self.tx.send(message);
    }

    pub fn publish_delayed(&self, message: Message, delay: Duration) {
        let bus = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bus.publish(message);
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(256)
    }
}

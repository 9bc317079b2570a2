// services/cache_listener.rs - Drops cached users when their memberships change
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheClient;
use crate::database::models::{Model, User};
use crate::messaging::{Message, MessageBus};

/// Spawns the listener. It ends when every publisher is dropped.
pub fn spawn(bus: &MessageBus, cache: Arc<dyn CacheClient>) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(Message::UserMembershipChanged { user_id, organization_id, .. }) => {
                    debug!("Membership of user {} in {} changed", user_id, organization_id);
                    cache.remove(&format!("{}:{}", User::COLLECTION, user_id)).await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    // Anything could have changed, start cold
                    warn!("Cache listener skipped {} messages, clearing cached users", skipped);
                    cache.remove_by_prefix(&format!("{}:", User::COLLECTION)).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheClient;
    use crate::types::ChangeType;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn membership_change_evicts_user() {
        let bus = MessageBus::default();
        let cache = Arc::new(InMemoryCacheClient::new());
        cache.set("user:u1", json!({"id": "u1"}), None).await;
        cache.set("user:u2", json!({"id": "u2"}), None).await;
        let _listener = spawn(&bus, cache.clone());

        bus.publish(Message::UserMembershipChanged {
            change_type: ChangeType::Added,
            user_id: "u1".into(),
            organization_id: "o1".into(),
        });

        for _ in 0..50 {
            if cache.get("user:u1").await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(cache.get("user:u1").await.is_none());
        assert!(cache.get("user:u2").await.is_some());
    }
}

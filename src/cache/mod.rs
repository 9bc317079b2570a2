// cache/mod.rs - Key/value cache used by repositories
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    /// Returns true when the key existed
    async fn remove(&self, key: &str) -> bool;

    async fn remove_all(&self, keys: &[String]) -> usize {
        let mut removed = 0;
        for key in keys {
            if self.remove(key).await {
                removed += 1;
            }
        }
        removed
    }

    async fn remove_by_prefix(&self, prefix: &str) -> usize;

    /// Adds `amount` to a counter and returns the new value. A missing or expired
    /// counter starts from zero and expires after `ttl`; an existing one keeps its expiry.
    async fn increment(&self, key: &str, amount: i64, ttl: Option<Duration>) -> i64;
}

struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process local cache with per-entry expiry
#[derive(Default)]
pub struct InMemoryCacheClient {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }
}

#[async_trait]
impl CacheClient for InMemoryCacheClient {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Expired: drop it
        self.entries.write().await.remove(key);
        None
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    async fn remove_by_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    async fn increment(&self, key: &str, amount: i64, ttl: Option<Duration>) -> i64 {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                let value = entry.value.as_i64().unwrap_or_default().saturating_add(amount);
                entry.value = Value::from(value);
                value
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    CacheEntry {
                        value: Value::from(amount),
                        expires_at: ttl.map(|ttl| now + ttl),
                    },
                );
                amount
            }
        }
    }
}

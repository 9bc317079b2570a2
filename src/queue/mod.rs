// queue/mod.rs - Work queue with retry via abandon
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::warn;

use crate::database::models::new_object_id;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue entry {0} is not in progress")]
    UnknownEntry(String),
}

#[derive(Debug, Clone)]
pub struct QueueEntry<T> {
    pub id: String,
    pub value: T,
    /// Number of times this entry has been dequeued
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: u64,
    pub working: u64,
    pub dead_letter: u64,
    pub enqueued: u64,
    pub dequeued: u64,
    pub completed: u64,
    pub abandoned: u64,
}

#[async_trait]
pub trait Queue<T: Send + 'static>: Send + Sync {
    fn name(&self) -> &str;

    async fn enqueue(&self, value: T) -> Result<String, QueueError>;

    /// Waits up to `timeout` for an entry
    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry<T>>, QueueError>;

    async fn complete(&self, entry: &QueueEntry<T>) -> Result<(), QueueError>;

    /// Re-queues the entry, or dead-letters it once its retries are used up
    async fn abandon(&self, entry: QueueEntry<T>) -> Result<(), QueueError>;

    async fn stats(&self) -> QueueStats;
}

struct QueueState<T> {
    queued: VecDeque<QueueEntry<T>>,
    working: Vec<String>,
    dead_letter: Vec<QueueEntry<T>>,
}

pub struct InMemoryQueue<T> {
    name: String,
    retries: u32,
    state: Mutex<QueueState<T>>,
    notify: Notify,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    completed: AtomicU64,
    abandoned: AtomicU64,
}

impl<T> InMemoryQueue<T> {
    pub fn new(name: impl Into<String>, retries: u32) -> Self {
        Self {
            name: name.into(),
            retries,
            state: Mutex::new(QueueState {
                queued: VecDeque::new(),
                working: vec![],
                dead_letter: vec![],
            }),
            notify: Notify::new(),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
        }
    }

    async fn try_dequeue(&self) -> Option<QueueEntry<T>>
    where
        T: Clone,
    {
        let mut state = self.state.lock().await;
        let mut entry = state.queued.pop_front()?;
        entry.attempts += 1;
        state.working.push(entry.id.clone());
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        Some(entry)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Queue<T> for InMemoryQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, value: T) -> Result<String, QueueError> {
        let id = new_object_id();
        {
            let mut state = self.state.lock().await;
            state.queued.push_back(QueueEntry {
                id: id.clone(),
                value,
                attempts: 0,
            });
        }
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        Ok(id)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry<T>>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so an enqueue in between is not missed
            let notified = self.notify.notified();
            if let Some(entry) = self.try_dequeue().await {
                return Ok(Some(entry));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn complete(&self, entry: &QueueEntry<T>) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let position = state
            .working
            .iter()
            .position(|id| *id == entry.id)
            .ok_or_else(|| QueueError::UnknownEntry(entry.id.clone()))?;
        state.working.swap_remove(position);
        self.completed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn abandon(&self, entry: QueueEntry<T>) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            let position = state
                .working
                .iter()
                .position(|id| *id == entry.id)
                .ok_or_else(|| QueueError::UnknownEntry(entry.id.clone()))?;
            state.working.swap_remove(position);
            self.abandoned.fetch_add(1, Ordering::Relaxed);

            if entry.attempts > self.retries {
                warn!(
                    queue = %self.name,
                    entry_id = %entry.id,
                    attempts = entry.attempts,
                    "Queue entry exceeded retries, moving to dead letter"
                );
                state.dead_letter.push(entry);
                return Ok(());
            }
            state.queued.push_back(entry);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            queued: state.queued.len() as u64,
            working: state.working.len() as u64,
            dead_letter: state.dead_letter.len() as u64,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn dequeue_times_out_when_empty() {
        let queue: InMemoryQueue<String> = InMemoryQueue::new("mail", 2);
        let entry = queue.dequeue(Duration::from_millis(20)).await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn waiting_consumer_is_woken() {
        let queue = Arc::new(InMemoryQueue::<String>::new("mail", 2));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue("hello".into()).await.unwrap();

        let entry = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(entry.value, "hello");
        assert_eq!(entry.attempts, 1);
        queue.complete(&entry).await.unwrap();

        let stats = queue.stats().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.working, 0);
    }

    #[tokio::test]
    async fn abandoned_entries_retry_then_dead_letter() {
        let queue: InMemoryQueue<String> = InMemoryQueue::new("mail", 2);
        queue.enqueue("flaky".into()).await.unwrap();

        for attempt in 1..=3 {
            let entry = queue
                .dequeue(Duration::from_millis(50))
                .await
                .unwrap()
                .expect("entry should be requeued");
            assert_eq!(entry.attempts, attempt);
            queue.abandon(entry).await.unwrap();
        }

        assert!(queue.dequeue(Duration::from_millis(20)).await.unwrap().is_none());
        let stats = queue.stats().await;
        assert_eq!(stats.dead_letter, 1);
        assert_eq!(stats.abandoned, 3);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn completing_unknown_entry_fails() {
        let queue: InMemoryQueue<String> = InMemoryQueue::new("mail", 2);
        let entry = QueueEntry { id: "x".into(), value: "v".into(), attempts: 1 };
        assert!(matches!(queue.complete(&entry).await, Err(QueueError::UnknownEntry(_))));
    }
}

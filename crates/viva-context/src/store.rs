//! Checkpoint storage for conversation transcripts
//!
//! Persistence itself is a collaborator concern; the pipeline only defines
//! the interface it consumes plus an in-memory implementation for tests
//! and single-process embedders.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use viva_ai::Message;

use crate::error::Result;

/// Checkpoint storage keyed by conversation thread id.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Persist the full transcript for a thread, replacing any prior
    /// checkpoint.
    async fn persist(&self, thread_id: &str, messages: &[Message]) -> Result<()>;

    /// Load the checkpointed transcript for a thread, if one exists.
    async fn load(&self, thread_id: &str) -> Result<Option<Vec<Message>>>;
}

/// In-memory transcript store.
#[derive(Default)]
pub struct MemoryStore {
    threads: Mutex<HashMap<String, Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
    async fn persist(&self, thread_id: &str, messages: &[Message]) -> Result<()> {
        self.threads
            .lock()
            .insert(thread_id.to_string(), messages.to_vec());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Vec<Message>>> {
        Ok(self.threads.lock().get(thread_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persist_and_load() {
        let store = MemoryStore::new();
        let messages = vec![Message::user("q1"), Message::assistant(vec![])];
        store.persist("thread-1", &messages).await.unwrap();

        let loaded = store.load("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id(), messages[0].id());
    }

    #[tokio::test]
    async fn test_load_missing_thread() {
        let store = MemoryStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_replaces() {
        let store = MemoryStore::new();
        store.persist("t", &[Message::user("a")]).await.unwrap();
        store
            .persist("t", &[Message::user("b"), Message::user("c")])
            .await
            .unwrap();
        let loaded = store.load("t").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].text(), "b");
    }
}

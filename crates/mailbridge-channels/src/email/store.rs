//! Bookkeeping of message IDs the channel has already handled.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Records which messages were processed and which were answered.
#[async_trait]
pub trait ProcessedStore: Send + Sync {
    /// Whether `id` was already handed to the agent.
    async fn is_processed(&self, id: &str) -> bool;

    /// Remember that `id` was handed to the agent.
    async fn mark_processed(&self, id: &str);

    /// Remember that a reply to `id` was sent.
    async fn mark_responded(&self, id: &str);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Marks {
    processed: bool,
    responded: bool,
}

/// In-memory [`ProcessedStore`]; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryProcessedStore {
    marks: Mutex<HashMap<String, Marks>>,
}

impl MemoryProcessedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a reply to `id` was recorded.
    pub async fn is_responded(&self, id: &str) -> bool {
        self.marks
            .lock()
            .await
            .get(id)
            .is_some_and(|m| m.responded)
    }
}

#[async_trait]
impl ProcessedStore for MemoryProcessedStore {
    async fn is_processed(&self, id: &str) -> bool {
        self.marks
            .lock()
            .await
            .get(id)
            .is_some_and(|m| m.processed)
    }

    async fn mark_processed(&self, id: &str) {
        self.marks
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .processed = true;
    }

    async fn mark_responded(&self, id: &str) {
        let mut marks = self.marks.lock().await;
        let entry = marks.entry(id.to_string()).or_default();
        // Answering a message implies it was processed.
        entry.processed = true;
        entry.responded = true;
    }
}

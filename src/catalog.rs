//! Per-user catalog of completed video records.
//!
//! The catalog is an injected store interface so the volatile in-memory map
//! can be swapped for persistent backing storage without touching the
//! pipeline. Records live for the lifetime of the process only.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::VideoRecord;

/// Append/list store for completed video records, keyed by user id
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Append a record under the owning user, preserving insertion order
    async fn append(&self, user_id: &str, record: VideoRecord);

    /// All records for a user, oldest first; empty for unknown users
    async fn list(&self, user_id: &str) -> Vec<VideoRecord>;
}

/// Process-lifetime catalog backed by an in-memory map
#[derive(Default)]
pub struct InMemoryCatalog {
    records: RwLock<HashMap<String, Vec<VideoRecord>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoCatalog for InMemoryCatalog {
    async fn append(&self, user_id: &str, record: VideoRecord) {
        let mut records = self.records.write().await;
        records.entry(user_id.to_string()).or_default().push(record);
    }

    async fn list(&self, user_id: &str) -> Vec<VideoRecord> {
        let records = self.records.read().await;
        records.get(user_id).cloned().unwrap_or_default()
    }
}

//! Persistence contracts and their SQLite implementations
//!
//! The orchestrators only ever see the traits defined here. All three
//! SQLite stores share one pool opened by [`db::open`].

pub mod checkpoint;
pub mod db;
pub mod memory;
pub mod session;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Checkpoint;

pub use checkpoint::SqliteCheckpointStore;
pub use memory::SqliteMemoryStore;
pub use session::SqliteSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// A consolidated long-term memory.
///
/// Immutable once written, except for `sentiment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub partition_key: String,
    pub row_key: String,
    pub input: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    /// Entries written for a failed completion carry no answer.
    pub fn has_answer(&self) -> bool {
        !self.response.is_empty()
    }
}

/// Per-identity message history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub identity: String,
    pub messages: Vec<String>,
}

/// Durable store of consolidated memories.
///
/// Row keys are unique: inserting an existing row key is a no-op, which
/// makes re-sending a consolidation batch safe.
#[async_trait]
pub trait LongTermStore: Send + Sync {
    async fn insert_batch(&self, entries: &[MemoryEntry]) -> Result<(), StoreError>;

    /// Entries whose input contains `substring`, most recent first.
    async fn query(&self, substring: &str) -> Result<Vec<MemoryEntry>, StoreError>;

    async fn tag_sentiment(&self, row_key: &str, sentiment: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, identity: &str, message: &str) -> Result<(), StoreError>;

    /// Messages in append order. Unknown identities yield an empty list.
    async fn get(&self, identity: &str) -> Result<Vec<String>, StoreError>;
}

/// Durable orchestrator snapshots, one per instance.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, instance_id: &str, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    async fn load(&self, instance_id: &str) -> Result<Option<Checkpoint>, StoreError>;
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid datetime '{}': {}", s, e)))
}

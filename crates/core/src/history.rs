//! Persisted chat history — the external store the coach appends to.
//!
//! Stores return records newest first with a limit; consumers re-order them
//! chronologically for display via [`load_recent`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;
use crate::message::{Message, Role};

/// One persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for ChatRecord {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
            timestamp: msg.timestamp,
        }
    }
}

impl From<ChatRecord> for Message {
    fn from(record: ChatRecord) -> Self {
        let msg = match record.role {
            Role::User => Message::user(record.content),
            Role::Assistant => Message::assistant(record.content),
        };
        msg.at(record.timestamp)
    }
}

/// Append-only chat history.
///
/// Implementations: in-memory, SQLite.
#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Append one record.
    async fn append(&self, record: ChatRecord) -> std::result::Result<(), MemoryError>;

    /// The latest `limit` records, newest first.
    async fn latest(&self, limit: usize) -> std::result::Result<Vec<ChatRecord>, MemoryError>;

    /// Total stored records.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;
}

/// The latest `limit` records, oldest first.
pub async fn load_recent(
    store: &dyn ChatHistoryStore,
    limit: usize,
) -> std::result::Result<Vec<ChatRecord>, MemoryError> {
    let mut records = store.latest(limit).await?;
    records.reverse();
    Ok(records)
}

//! In-memory backends — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::sync::Arc;
use stridecoach_core::error::MemoryError;
use stridecoach_core::history::{ChatHistoryStore, ChatRecord};
use stridecoach_core::memory::{FixedProfile, MemoryStore, SessionMemoryEntry};
use tokio::sync::RwLock;

/// Session memory held in a Vec. Lost when the process exits.
pub struct InMemorySessionMemory {
    profile: FixedProfile,
    entries: Arc<RwLock<Vec<SessionMemoryEntry>>>,
}

impl InMemorySessionMemory {
    pub fn new(profile: FixedProfile) -> Self {
        Self {
            profile,
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Seed with existing entries (oldest first).
    pub fn with_entries(mut self, entries: Vec<SessionMemoryEntry>) -> Self {
        self.entries = Arc::new(RwLock::new(entries));
        self
    }
}

#[async_trait]
impl MemoryStore for InMemorySessionMemory {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, kind: &str, content: &str) -> Result<SessionMemoryEntry, MemoryError> {
        let entry = SessionMemoryEntry::new(kind, content);
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn recent(&self, k: usize) -> Result<Vec<SessionMemoryEntry>, MemoryError> {
        let entries = self.entries.read().await;
        let start = entries.len().saturating_sub(k);
        Ok(entries[start..].to_vec())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }

    fn fixed_profile(&self) -> &FixedProfile {
        &self.profile
    }
}

/// Chat history held in a Vec.
pub struct InMemoryChatHistory {
    records: Arc<RwLock<Vec<ChatRecord>>>,
}

impl InMemoryChatHistory {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryChatHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatHistoryStore for InMemoryChatHistory {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, record: ChatRecord) -> Result<(), MemoryError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn latest(&self, limit: usize) -> Result<Vec<ChatRecord>, MemoryError> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stridecoach_core::memory::kind;
    use stridecoach_core::message::{Message, Role};

    fn profile() -> FixedProfile {
        FixedProfile {
            runner_since: "early 2025".into(),
            sessions_per_week: 3,
            race_name: "Barcelona Half Marathon".into(),
            race_date: NaiveDate::from_ymd_opt(2027, 2, 14).unwrap(),
            race_distance_km: 21.0975,
            target_time: "1:34:56".into(),
            safety_rule: "weekly load progression 10-15% max".into(),
        }
    }

    #[tokio::test]
    async fn append_then_recent_returns_oldest_first() {
        let mem = InMemorySessionMemory::new(profile());
        for i in 0..7 {
            mem.append(kind::CHAT, &format!("turn {i}")).await.unwrap();
        }

        let recent = mem.recent(5).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 2", "turn 3", "turn 4", "turn 5", "turn 6"]);
        assert_eq!(mem.count().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn recent_on_empty_store() {
        let mem = InMemorySessionMemory::new(profile());
        assert!(mem.recent(5).await.unwrap().is_empty());
        assert_eq!(mem.fixed_profile().sessions_per_week, 3);
    }

    #[tokio::test]
    async fn chat_history_latest_is_newest_first() {
        let history = InMemoryChatHistory::new();
        history.append(ChatRecord::from(&Message::user("How far today?"))).await.unwrap();
        history.append(ChatRecord::from(&Message::assistant("8 km easy"))).await.unwrap();

        let latest = history.latest(1).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].role, Role::Assistant);
        assert_eq!(history.count().await.unwrap(), 2);
    }
}

//! Memory trait — the two tiers of coach memory.
//!
//! - [`FixedProfile`]: long-lived runner facts and the race objective. Set
//!   once, read-only from the orchestrator's point of view.
//! - [`SessionMemoryEntry`]: an append-only log of summarized prior turns.
//!   Storage is unbounded; only the rendering is bounded (most recent K).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// Long-lived runner facts and the target event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedProfile {
    /// When the runner started running (free text, e.g. "early 2025")
    pub runner_since: String,

    /// Preferred number of sessions per week
    pub sessions_per_week: u32,

    /// Target event name
    pub race_name: String,

    /// Target event date
    pub race_date: NaiveDate,

    /// Target event distance
    pub race_distance_km: f64,

    /// Target finishing time, `H:MM:SS` or `MM:SS`
    pub target_time: String,

    /// Safety rule the coach must honor
    pub safety_rule: String,
}

impl FixedProfile {
    /// Target finishing time in seconds, if `target_time` parses.
    pub fn target_seconds(&self) -> Option<u64> {
        parse_clock(&self.target_time)
    }

    /// Required race pace in minutes per km.
    pub fn required_pace_min_km(&self) -> Option<f64> {
        let secs = self.target_seconds()?;
        (self.race_distance_km > 0.0).then(|| secs as f64 / 60.0 / self.race_distance_km)
    }

    /// Days from `today` until the race (negative once it has passed).
    pub fn days_left(&self, today: NaiveDate) -> i64 {
        (self.race_date - today).num_days()
    }
}

/// Parse `H:MM:SS` or `MM:SS` into seconds.
pub fn parse_clock(text: &str) -> Option<u64> {
    let parts: Vec<u64> = text
        .trim()
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [h, m, s] if *m < 60 && *s < 60 => Some(h * 3600 + m * 60 + s),
        [m, s] if *s < 60 => Some(m * 60 + s),
        _ => None,
    }
}

/// Kinds of session memory entries written by the orchestrator.
pub mod kind {
    pub const CHAT: &str = "chat";
    pub const NOTE: &str = "note";
}

/// One summarized prior interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMemoryEntry {
    pub timestamp: DateTime<Utc>,

    /// Free-form tag (e.g. "chat", "note")
    pub kind: String,

    pub content: String,
}

impl SessionMemoryEntry {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: kind.into(),
            content: content.into(),
        }
    }
}

/// The Memory Store.
///
/// Implementations: in-memory (tests, ephemeral sessions) and an append-only
/// JSONL file.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Append an entry stamped with the current time.
    async fn append(&self, kind: &str, content: &str) -> std::result::Result<SessionMemoryEntry, MemoryError>;

    /// The last `k` entries, oldest first.
    async fn recent(&self, k: usize) -> std::result::Result<Vec<SessionMemoryEntry>, MemoryError>;

    /// Total stored entries.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;

    /// The fixed profile block data.
    fn fixed_profile(&self) -> &FixedProfile;
}

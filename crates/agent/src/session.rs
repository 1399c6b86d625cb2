//! Session state and turn results.
//!
//! The caller owns a [`SessionState`] and moves it into each turn; the
//! orchestrator hands it back inside the [`TurnReport`]. Holding it by value
//! is what keeps a conversation to one in-flight turn.

use crate::classify::{TurnErrorKind, TurnFailure};
use crate::context::words::truncate_chars;
use serde::{Deserialize, Serialize};
use stridecoach_core::history::ChatRecord;
use stridecoach_core::message::{Conversation, Message};

/// Characters kept from each side of an exchange in its memory summary.
pub const SUMMARY_PREVIEW_CHARS: usize = 100;

/// Everything a conversation carries between turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub conversation: Conversation,
    /// Every capability run in this session, in order.
    pub functions_log: Vec<String>,
    pub turns_completed: u32,
    pub last_failure: Option<TurnErrorKind>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from persisted chat history (oldest first).
    pub fn resume(records: Vec<ChatRecord>) -> Self {
        let mut conversation = Conversation::new();
        for record in records {
            conversation.push(Message::from(record));
        }
        Self {
            conversation,
            ..Self::default()
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.conversation.is_empty()
    }
}

/// A capability failure that was fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFault {
    pub name: String,
    pub kind: TurnErrorKind,
    pub message: String,
}

/// A successful turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnAnswer {
    pub text: String,
    /// Capabilities run during this turn, in execution order.
    pub functions_executed: Vec<String>,
    /// Model calls made.
    pub iterations: u32,
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_faults: Vec<ToolFault>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TurnOutcome {
    Answered(TurnAnswer),
    Failed(TurnFailure),
}

impl TurnOutcome {
    pub fn answer(&self) -> Option<&TurnAnswer> {
        match self {
            Self::Answered(answer) => Some(answer),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TurnFailure> {
        match self {
            Self::Answered(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// The session handed back after a turn, plus how the turn ended.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub session: SessionState,
    pub outcome: TurnOutcome,
}

/// One-line memory summary of an exchange.
pub fn summarize_exchange(user: &str, assistant: &str, functions: &[String]) -> String {
    let mut summary = format!(
        "Q: {} | A: {}",
        preview(user),
        preview(assistant)
    );
    if !functions.is_empty() {
        summary.push_str(&format!(" | functions: {}", functions.join(", ")));
    }
    summary
}

fn preview(text: &str) -> String {
    truncate_chars(text.trim(), SUMMARY_PREVIEW_CHARS, "...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use stridecoach_core::message::Role;

    #[test]
    fn resume_restores_order_and_roles() {
        let t0 = Utc::now() - Duration::minutes(5);
        let records = vec![
            ChatRecord { role: Role::User, content: "How was my week?".into(), timestamp: t0 },
            ChatRecord {
                role: Role::Assistant,
                content: "Solid: 32 km over 3 runs.".into(),
                timestamp: t0 + Duration::seconds(4),
            },
        ];
        let session = SessionState::resume(records);

        assert!(!session.is_fresh());
        assert_eq!(session.conversation.len(), 2);
        assert_eq!(session.conversation.messages[0].role, Role::User);
        assert_eq!(session.conversation.messages[1].timestamp, t0 + Duration::seconds(4));
        assert_eq!(session.turns_completed, 0);
    }

    #[test]
    fn summary_previews_both_sides() {
        let long_answer = "a".repeat(250);
        let summary = summarize_exchange("  plan my week  ", &long_answer, &[]);
        assert!(summary.starts_with("Q: plan my week | A: aaa"));
        assert!(summary.ends_with("..."));
        assert_eq!(summary.len(), "Q: plan my week | A: ".len() + 100 + 3);
    }

    #[test]
    fn summary_lists_functions() {
        let summary = summarize_exchange(
            "how am I doing?",
            "Trending well.",
            &["get_weekly_stats".into(), "analyze_performance_trends".into()],
        );
        assert_eq!(
            summary,
            "Q: how am I doing? | A: Trending well. | functions: get_weekly_stats, analyze_performance_trends"
        );
    }
}

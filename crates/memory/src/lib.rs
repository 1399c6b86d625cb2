//! Memory backends for StrideCoach.
//!
//! Two concerns live here:
//! - Session memory (`MemoryStore`): the append-only log of summarized turns
//!   plus the fixed runner profile. Backends: in-memory and JSONL file.
//! - Chat history (`ChatHistoryStore`): the persisted conversation.
//!   Backends: in-memory and SQLite.

pub mod in_memory;
pub mod file_backend;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::{InMemoryChatHistory, InMemorySessionMemory};
pub use file_backend::FileSessionMemory;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteChatHistory;

use std::sync::Arc;
use stridecoach_core::error::MemoryError;
use stridecoach_core::history::ChatHistoryStore;

/// Open the chat history backend named by configuration.
///
/// `"memory"` keeps history for the lifetime of the process; `"sqlite"`
/// persists it at `path`.
pub async fn open_chat_history(
    backend: &str,
    path: &std::path::Path,
) -> Result<Arc<dyn ChatHistoryStore>, MemoryError> {
    match backend {
        "memory" => Ok(Arc::new(InMemoryChatHistory::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let url = format!("sqlite://{}", path.display());
            Ok(Arc::new(SqliteChatHistory::new(&url).await?))
        }
        other => Err(MemoryError::Storage(format!(
            "unsupported history backend '{other}' (path {})",
            path.display()
        ))),
    }
}

//! File-based session memory — persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded `SessionMemoryEntry`. Entries are loaded on
//! open and every append is written straight to the end of the file, so the
//! log survives restarts and stays human-inspectable.
//!
//! Default location: `~/.stridecoach/session_memory.jsonl`

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stridecoach_core::error::MemoryError;
use stridecoach_core::memory::{FixedProfile, MemoryStore, SessionMemoryEntry};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A file-backed session memory using JSONL (one JSON object per line).
pub struct FileSessionMemory {
    path: PathBuf,
    profile: FixedProfile,
    entries: Arc<RwLock<Vec<SessionMemoryEntry>>>,
}

impl FileSessionMemory {
    /// Open the log at `path`.
    ///
    /// If the file exists, entries are loaded from it. Otherwise the store
    /// starts empty and the file is created on first append.
    pub fn open(path: impl Into<PathBuf>, profile: FixedProfile) -> Self {
        let path = path.into();
        let entries = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = entries.len(), "Session memory loaded");
        Self {
            path,
            profile,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<SessionMemoryEntry> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<SessionMemoryEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted session memory line");
                    None
                }
            })
            .collect()
    }

    fn append_line(&self, entry: &SessionMemoryEntry) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let line = serde_json::to_string(entry)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize entry: {e}")))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MemoryError::Storage(format!("Failed to open memory file: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl MemoryStore for FileSessionMemory {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, kind: &str, content: &str) -> Result<SessionMemoryEntry, MemoryError> {
        let entry = SessionMemoryEntry::new(kind, content);
        // Hold the write lock across the file write so lines never interleave.
        let mut entries = self.entries.write().await;
        self.append_line(&entry)?;
        entries.push(entry.clone());
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

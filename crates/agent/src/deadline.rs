//! Wall-clock deadlines for remote calls.
//!
//! The orchestrator owns every deadline. Work runs as its own task so an
//! elapsed deadline can abort it; a late result is dropped with the task.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeadlineError {
    #[error("deadline of {0:?} exceeded")]
    Elapsed(Duration),

    /// The unit of work panicked or was cancelled.
    #[error("call aborted: {0}")]
    Aborted(String),
}

/// A reusable time limit for one kind of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    limit: Duration,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Run `work` to completion or until the limit passes, whichever is
    /// first. On expiry the task is aborted.
    pub async fn run<F, T>(&self, work: F) -> Result<T, DeadlineError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut handle = tokio::spawn(work);
        match tokio::time::timeout(self.limit, &mut handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(join_error)) => Err(DeadlineError::Aborted(join_error.to_string())),
            Err(_) => {
                handle.abort();
                warn!(limit_ms = self.limit.as_millis() as u64, "Deadline exceeded, call abandoned");
                Err(DeadlineError::Elapsed(self.limit))
            }
        }
    }
}

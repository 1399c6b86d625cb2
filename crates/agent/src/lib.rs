//! The coaching turn orchestrator.
//!
//! Each user utterance runs one bounded loop:
//!
//! 1. **Assemble** the context package (profile, history, KPIs, memory)
//! 2. **Call the model** under a wall-clock deadline
//! 3. **If function calls**: run the whole batch, feed results back, go to 2
//! 4. **If text**: commit the exchange to history and session memory
//!
//! Anything else ends the turn with a classified [`TurnFailure`] that names
//! a recovery. A failed turn never touches the conversation.

pub mod classify;
pub mod context;
pub mod deadline;
pub mod greeting;
pub mod loop_runner;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use classify::{Diagnostic, Recovery, TurnErrorKind, TurnFailure};
pub use context::{AssemblyInput, AssemblyMetadata, ContextAssembler, ContextBudget, ContextPackage, count_words};
pub use deadline::{Deadline, DeadlineError};
pub use greeting::contextual_greeting;
pub use loop_runner::{DEFAULT_SYSTEM_PROMPT, TurnOrchestrator};
pub use session::{SessionState, ToolFault, TurnAnswer, TurnOutcome, TurnReport};

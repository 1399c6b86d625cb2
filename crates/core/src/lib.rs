//! # StrideCoach Core
//!
//! Domain types, traits, and error definitions for the StrideCoach running
//! coach. This crate defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/in-memory implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod memory;
pub mod history;
pub mod training;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role, Conversation, ConversationId};
pub use provider::{
    Candidate, FunctionCall, FunctionResult, ModelInput, ModelRequest, ModelResponse, Provider,
    RequestedCall, ResponsePart, SafetyRating, ToolDescriptor, ToolRound, Usage,
};
pub use tool::{Capability, CapabilityRegistry, Invocation, InvocationFailure, UNKNOWN_FUNCTION};
pub use memory::{FixedProfile, MemoryStore, SessionMemoryEntry};
pub use history::{ChatHistoryStore, ChatRecord, load_recent};
pub use training::{
    Activity, CreatedPlan, Lap, NewPlan, NewWorkout, PlanStatus, PlannedWorkout, RunnerProfile,
    Split, TrainingPlan, TrainingStore, WorkoutChanges, WorkoutStatus,
};
pub use event::{DomainEvent, EventBus};

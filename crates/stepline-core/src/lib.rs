//! Core types for the stepline workflow engine.
//!
//! This crate holds everything that has no knowledge of workflow sequencing.
//! Store authors and activity libraries should depend on it directly.
//!
//! # Core Types
//!
//! - [`Activity`] - A validated, retryable, timeout-bounded unit of work
//! - [`ActivityResult`] - Outcome of one activity execution
//! - [`ActivityContext`] - Input, memory snapshot, and position handed to a run
//! - [`Session`] - Durable execution state of one workflow run
//! - [`Store`] - Pluggable session persistence, with [`InMemoryStore`]
//!
//! # Extension Points
//!
//! - [`ActivityHandler`] - The work an activity performs
//! - [`ActivityHooks`] - Lifecycle callbacks (on_success, on_failure, on_complete)
//! - [`Validator`] - Input/output checks, with [`ObjectSchema`] as a simple implementation

mod activity;
mod context;
mod error;
mod retry;
mod session;
mod store;
mod validate;

pub use activity::{
    Activity, ActivityHandler, ActivityHooks, ActivityResult, FnHandler, ToolCallSuggestion,
    ATTEMPTS_KEY, EXECUTION_TIME_KEY,
};
pub use context::{ActivityContext, ActivityName, ExecutionMetadata};
pub use error::{
    ActivityError, FieldIssue, HookType, StoreError, ValidationError, WorkflowError,
};
pub use retry::{ActivityConfig, RetryPolicy, RetryPolicyError};
pub use session::{
    BranchDecision, CleanupOptions, Memory, Session, SessionFilter, SessionStatus,
    SessionUpdate, StepExecution, StoreStats, INPUT_MEMORY_KEY,
};
pub use store::{InMemoryStore, Store};
pub use validate::{JsonType, ObjectSchema, Validator};

#[doc(hidden)]
pub mod serde_helpers {
    pub use crate::retry::{duration_millis, option_duration_millis};
}

//! A resumable, session-backed step workflow engine for Rust.
//!
//! A [`Workflow`] is an ordered list of [`Step`]s. Each call to
//! [`Workflow::start`] or [`Workflow::continue_session`] runs one step,
//! persists its output in the session memory, and returns a
//! [`WorkflowResponse`] with ranked suggestions for what to call next.
//!
//! # Example
//!
//! ```rust
//! use stepline::prelude::*;
//! use serde_json::json;
//!
//! async fn add(ctx: ActivityContext) -> Result<ActivityResult, ActivityError> {
//!     let a = ctx.input()["a"].as_i64().ok_or("a must be an integer")?;
//!     let b = ctx.input()["b"].as_i64().ok_or("b must be an integer")?;
//!     Ok(ActivityResult::ok(json!({ "value": a + b })))
//! }
//!
//! async fn double(ctx: ActivityContext) -> Result<ActivityResult, ActivityError> {
//!     let value = ctx.input()["value"].as_i64().ok_or("value must be an integer")?;
//!     Ok(ActivityResult::ok(json!({ "value": value * 2 })))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), WorkflowError> {
//!     let workflow = Workflow::builder("math")
//!         .step(Activity::from_fn("add", add))
//!         .step(Activity::from_fn("double", double))
//!         .build()?;
//!
//!     let first = workflow.start(json!({"a": 2, "b": 3})).await?;
//!     let done = workflow.continue_session(first.session_id()).await?;
//!     assert!(done.is_completed());
//!     Ok(())
//! }
//! ```

mod response;
mod session;
mod step;
mod workflow;

// Re-export core types
pub use stepline_core::*;

pub use response::{
    CompletionResponse, FailureResponse, NextStep, Progress, SessionSnapshot, StepResponse,
    WorkflowResponse,
};
pub use session::{IdGenerator, SessionManager, SessionManagerConfig, UuidGenerator};
pub use step::{Branch, BranchParams, BranchPredicate, Condition, InputMapper, Step};
pub use workflow::{
    Workflow, WorkflowBuilder, WorkflowConfig, WorkflowHooks, BRANCH_PRIORITY, CONTINUE_PRIORITY,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Activity, ActivityConfig, ActivityContext, ActivityError, ActivityHandler, ActivityHooks,
        ActivityResult, Branch, RetryPolicy, Session, SessionManager, SessionStatus, Step, Store,
        ToolCallSuggestion, Workflow, WorkflowBuilder, WorkflowError, WorkflowHooks,
        WorkflowResponse,
    };
}

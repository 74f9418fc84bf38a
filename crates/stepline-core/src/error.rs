//! Error types for activities, stores, and workflows.

use crate::session::SessionStatus;
use std::fmt;
use thiserror::Error;

/// The lifecycle hook that failed.
///
/// Hook failures are logged and never change the outcome they observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    /// The `on_success` hook.
    OnSuccess,
    /// The `on_failure` hook.
    OnFailure,
    /// The `on_complete` hook, which runs after either of the above.
    OnComplete,
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookType::OnSuccess => write!(f, "on_success"),
            HookType::OnFailure => write!(f, "on_failure"),
            HookType::OnComplete => write!(f, "on_complete"),
        }
    }
}

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Dotted path of the offending field. Empty for the root value.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldIssue {
    /// Creates a new issue for `path`.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Returned by a [`Validator`](crate::Validator) when a value does not match.
///
/// # Examples
///
/// ```
/// use stepline_core::{FieldIssue, ValidationError};
///
/// let error = ValidationError::new(vec![
///     FieldIssue::new("a", "expected number"),
///     FieldIssue::new("b", "is required"),
/// ]);
/// assert_eq!(error.to_string(), "a: expected number; b: is required");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Every problem found, in discovery order.
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// Creates an error from a list of issues.
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    /// Creates an error with a single root-level message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(vec![FieldIssue::new("", message)])
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{}", joined)
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while running an activity.
///
/// These never escape [`Activity::execute`](crate::Activity::execute); they are
/// folded into a failed [`ActivityResult`](crate::ActivityResult).
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ActivityError {
    /// The activity's own logic reported an error.
    #[error("{0}")]
    Failed(String),

    /// The input did not pass the configured input validator.
    #[error("Input validation failed: {0}")]
    InvalidInput(ValidationError),

    /// The produced data did not pass the configured output validator.
    #[error("Output validation failed: {0}")]
    InvalidOutput(ValidationError),

    /// The run did not finish within the configured timeout.
    #[error("Activity timed out after {millis}ms")]
    Timeout {
        /// The configured timeout in milliseconds.
        millis: u128,
    },

    /// The run panicked.
    #[error("Activity panicked: {0}")]
    Panicked(String),
}

impl ActivityError {
    /// Shorthand for [`ActivityError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<String> for ActivityError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for ActivityError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Errors returned by a [`Store`](crate::Store).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// No session with this id exists.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A session with this id already exists.
    #[error("Session already exists: {0}")]
    SessionExists(String),

    /// The session already reached a terminal status and can no longer
    /// change.
    #[error("Session '{session_id}' is already {status}")]
    SessionClosed {
        /// The session that was addressed.
        session_id: String,
        /// The terminal status it is in.
        status: SessionStatus,
    },

    /// The backing storage failed.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors raised by the workflow orchestrator.
///
/// Domain failures (an activity failing) are reported as responses, not
/// errors. This enum covers caller and integration mistakes and persistence
/// failures.
///
/// # Non-Exhaustive
///
/// Always include a wildcard arm when matching:
///
/// ```
/// use stepline_core::WorkflowError;
///
/// fn describe(error: &WorkflowError) -> String {
///     match error {
///         WorkflowError::SessionNotFound(id) => format!("no session {}", id),
///         WorkflowError::InvalidStatus { status, .. } => format!("bad status {}", status),
///         _ => error.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// The workflow definition is invalid.
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),

    /// The referenced session does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The requested operation is not valid in the session's current status.
    #[error("Cannot {action} workflow in status: {status}")]
    InvalidStatus {
        /// The operation that was attempted.
        action: &'static str,
        /// The status the session was in.
        status: SessionStatus,
    },

    /// A step index outside the workflow's step list was requested.
    #[error("Step index {index} is out of range for workflow with {total} steps")]
    StepOutOfRange {
        /// The requested index.
        index: usize,
        /// The number of steps in the workflow.
        total: usize,
    },

    /// The step already ran in this session, or the session has moved past
    /// it.
    #[error("Step {index} cannot run again, session is at step {current_step}")]
    StepAlreadyRun {
        /// The requested index.
        index: usize,
        /// The session's current step.
        current_step: usize,
    },

    /// A workflow lifecycle hook failed.
    #[error("Hook '{hook_type}' failed in workflow '{workflow_name}': {details}")]
    HookError {
        /// The workflow whose hook failed.
        workflow_name: String,
        /// Which hook failed.
        hook_type: HookType,
        /// Details about the failure.
        details: String,
    },

    /// The session store failed.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::SessionNotFound(id) => WorkflowError::SessionNotFound(id),
            StoreError::SessionClosed { status, .. } => WorkflowError::InvalidStatus {
                action: "modify",
                status,
            },
            other => WorkflowError::Store(other),
        }
    }
}

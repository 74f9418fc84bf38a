//! Structured responses returned by workflow operations.

use serde::Serialize;
use serde_json::Value;
use stepline_core::{Memory, Session, SessionStatus, ToolCallSuggestion};

/// Outcome of `start`, `continue`, or `execute_step`.
///
/// Serializes without a tag, so callers see exactly one of the three shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkflowResponse {
    /// A step finished and more steps remain.
    Step(StepResponse),
    /// The final step finished; the session is `completed`.
    Completed(CompletionResponse),
    /// A required step failed; the session is `failed`.
    Failed(FailureResponse),
}

impl WorkflowResponse {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Step(r) => &r.session_id,
            Self::Completed(r) => &r.session_id,
            Self::Failed(r) => &r.session_id,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Step(r) => &r.message,
            Self::Completed(r) => &r.message,
            Self::Failed(r) => &r.message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Suggestions offered with this response, highest priority first.
    pub fn branch_options(&self) -> &[ToolCallSuggestion] {
        match self {
            Self::Step(r) => &r.branch_options,
            Self::Completed(r) => &r.branch_options,
            Self::Failed(_) => &[],
        }
    }

    pub fn as_step(&self) -> Option<&StepResponse> {
        match self {
            Self::Step(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_completed(&self) -> Option<&CompletionResponse> {
        match self {
            Self::Completed(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_failed(&self) -> Option<&FailureResponse> {
        match self {
            Self::Failed(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    pub message: String,
    pub session_id: String,
    /// Data produced by the step that just ran.
    pub result: Value,
    pub next_step: NextStep,
    pub progress: Progress,
    pub branch_options: Vec<ToolCallSuggestion>,
    pub session_snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    pub index: usize,
    pub activity_name: String,
}

/// `current` counts steps that have been processed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub current_step: usize,
    pub total_steps: usize,
    pub memory: Memory,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            status: session.status,
            current_step: session.current_step,
            total_steps: session.total_steps,
            memory: session.memory.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub message: String,
    pub session_id: String,
    /// Final session memory.
    pub results: Memory,
    pub execution_time_ms: u64,
    /// Branches matched by the final step.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub branch_options: Vec<ToolCallSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    pub message: String,
    pub session_id: String,
    pub error: String,
    pub is_error: bool,
}

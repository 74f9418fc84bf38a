//! Session records and the query types stores accept.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Session-scoped key/value memory shared by every step of one run.
pub type Memory = BTreeMap<String, Value>;

/// Memory key holding the input a session was started with.
pub const INPUT_MEMORY_KEY: &str = "_input";

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, first step not yet started.
    Pending,
    /// Steps are being executed.
    Running,
    /// Suspended by an operator; resumable.
    Paused,
    /// Every step finished.
    Completed,
    /// A required step failed.
    Failed,
    /// Stopped by an operator.
    Cancelled,
}

impl SessionStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [SessionStatus; 6] = [
        SessionStatus::Pending,
        SessionStatus::Running,
        SessionStatus::Paused,
        SessionStatus::Completed,
        SessionStatus::Failed,
        SessionStatus::Cancelled,
    ];

    /// Statuses from which no further transition is valid.
    pub const TERMINAL: [SessionStatus; 3] = [
        SessionStatus::Completed,
        SessionStatus::Failed,
        SessionStatus::Cancelled,
    ];

    /// Returns `true` for `completed`, `failed`, and `cancelled`.
    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One executed step, appended to [`Session::history`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecution {
    pub step_index: usize,
    pub activity_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One branch taken into account after a step, appended to
/// [`Session::branch_history`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDecision {
    pub step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_pattern: Option<String>,
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable execution state of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub workflow_name: String,
    pub status: SessionStatus,
    pub current_step: usize,
    pub total_steps: usize,
    pub memory: Memory,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub history: Vec<StepExecution>,
    pub branch_history: Vec<BranchDecision>,
}

impl Session {
    /// Creates a `pending` session positioned at step 0.
    pub fn new(
        session_id: impl Into<String>,
        workflow_name: impl Into<String>,
        total_steps: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            workflow_name: workflow_name.into(),
            status: SessionStatus::Pending,
            current_step: 0,
            total_steps,
            memory: Memory::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            history: Vec::new(),
            branch_history: Vec::new(),
        }
    }

    /// Returns `true` if the session can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fails with [`StoreError::SessionClosed`] once the session is terminal.
    ///
    /// Stores call this before every mutation, which makes the first terminal
    /// transition the last write a session ever sees.
    pub fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_terminal() {
            return Err(StoreError::SessionClosed {
                session_id: self.session_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Returns how long ago the session started. Zero for future timestamps.
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Milliseconds between start and completion, or start and now while the
    /// session is still open.
    pub fn elapsed_ms(&self) -> u64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

/// A partial update applied with merge semantics.
///
/// Fields left as `None` are preserved. The session id and workflow name are
/// not representable here and therefore can never change. Terminal sessions
/// reject every update.
///
/// # Examples
///
/// ```
/// use stepline_core::{Session, SessionStatus, SessionUpdate};
///
/// let mut session = Session::new("s-1", "demo", 2);
/// SessionUpdate::new()
///     .status(SessionStatus::Running)
///     .current_step(1)
///     .apply(&mut session)
///     .expect("session is open");
///
/// assert_eq!(session.status, SessionStatus::Running);
/// assert_eq!(session.current_step, 1);
/// assert_eq!(session.workflow_name, "demo");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub current_step: Option<usize>,
    pub memory: Option<Memory>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub history: Option<Vec<StepExecution>>,
    pub branch_history: Option<Vec<BranchDecision>>,
}

impl SessionUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn current_step(mut self, index: usize) -> Self {
        self.current_step = Some(index);
        self
    }

    pub fn memory(mut self, memory: Memory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn history(mut self, history: Vec<StepExecution>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn branch_history(mut self, branch_history: Vec<BranchDecision>) -> Self {
        self.branch_history = Some(branch_history);
        self
    }

    /// Merges this update into `session`.
    ///
    /// `completed_at` is only written once; later values are ignored.
    pub fn apply(self, session: &mut Session) -> Result<(), StoreError> {
        session.ensure_open()?;
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(index) = self.current_step {
            session.current_step = index;
        }
        if let Some(memory) = self.memory {
            session.memory = memory;
        }
        if let Some(at) = self.completed_at {
            if session.completed_at.is_none() {
                session.completed_at = Some(at);
            }
        }
        if let Some(error) = self.error {
            session.error = Some(error);
        }
        if let Some(history) = self.history {
            session.history = history;
        }
        if let Some(branch_history) = self.branch_history {
            session.branch_history = branch_history;
        }
        Ok(())
    }
}

/// Filter and pagination for [`Store::list_sessions`](crate::Store::list_sessions).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub workflow_name: Option<String>,
    pub status: Option<SessionStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SessionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = Some(name.into());
        self
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns `true` if `session` passes the name and status filters.
    pub fn matches(&self, session: &Session) -> bool {
        if let Some(name) = &self.workflow_name {
            if &session.workflow_name != name {
                return false;
            }
        }
        if let Some(status) = self.status {
            if session.status != status {
                return false;
            }
        }
        true
    }
}

/// Eviction rules for [`Store::cleanup`](crate::Store::cleanup).
///
/// A session is removed if it is older than `max_age` or its status is in
/// `statuses`. Afterwards the oldest sessions are evicted until at most
/// `max_sessions` remain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    pub max_age: Option<Duration>,
    pub max_sessions: Option<usize>,
    pub statuses: Vec<SessionStatus>,
}

impl CleanupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = Some(max_sessions);
        self
    }

    pub fn statuses(mut self, statuses: impl IntoIterator<Item = SessionStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Returns `true` if `session` is expired or has an evictable status.
    pub fn should_evict(&self, session: &Session) -> bool {
        let expired = self
            .max_age
            .map(|max_age| session.age() > max_age)
            .unwrap_or(false);
        expired || self.statuses.contains(&session.status)
    }
}

/// Session counts, overall and per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: usize,
    pub by_status: BTreeMap<SessionStatus, usize>,
}

impl StoreStats {
    /// Builds stats from an iterator of statuses.
    pub fn from_statuses(statuses: impl IntoIterator<Item = SessionStatus>) -> Self {
        let mut stats = Self::default();
        for status in statuses {
            stats.total += 1;
            *stats.by_status.entry(status).or_insert(0) += 1;
        }
        stats
    }

    /// Number of sessions in `status`.
    pub fn count(&self, status: SessionStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_pending() {
        let session = Session::new("s-1", "demo", 3);
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.current_step, 0);
        assert_eq!(session.total_steps, 3);
        assert!(session.memory.is_empty());
        assert!(session.completed_at.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
    }

    #[test]
    fn test_update_preserves_absent_fields() {
        let mut session = Session::new("s-1", "demo", 2);
        session.memory.insert("k".to_string(), Value::from(1));

        SessionUpdate::new()
            .current_step(1)
            .apply(&mut session)
            .expect("open");

        assert_eq!(session.current_step, 1);
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.memory.get("k"), Some(&Value::from(1)));
    }

    #[test]
    fn test_completed_at_is_set_once() {
        let mut session = Session::new("s-1", "demo", 1);
        let first = Utc::now();
        SessionUpdate::new()
            .completed_at(first)
            .apply(&mut session)
            .expect("open");
        SessionUpdate::new()
            .completed_at(first + chrono::Duration::seconds(5))
            .apply(&mut session)
            .expect("open");
        assert_eq!(session.completed_at, Some(first));
    }

    #[test]
    fn test_terminal_session_rejects_updates() {
        let mut session = Session::new("s-1", "demo", 1);
        SessionUpdate::new()
            .status(SessionStatus::Cancelled)
            .apply(&mut session)
            .expect("open");

        let result = SessionUpdate::new()
            .status(SessionStatus::Completed)
            .current_step(1)
            .apply(&mut session);

        assert_eq!(
            result,
            Err(StoreError::SessionClosed {
                session_id: "s-1".to_string(),
                status: SessionStatus::Cancelled,
            })
        );
        assert_eq!(session.status, SessionStatus::Cancelled);
        assert_eq!(session.current_step, 0);
    }

    #[test]
    fn test_filter_matches() {
        let mut session = Session::new("s-1", "demo", 1);
        session.status = SessionStatus::Running;

        assert!(SessionFilter::new().matches(&session));
        assert!(SessionFilter::new().workflow_name("demo").matches(&session));
        assert!(!SessionFilter::new().workflow_name("other").matches(&session));
        assert!(!SessionFilter::new()
            .status(SessionStatus::Completed)
            .matches(&session));
    }

    #[test]
    fn test_cleanup_options_should_evict() {
        let mut session = Session::new("s-1", "demo", 1);
        session.started_at = Utc::now() - chrono::Duration::seconds(120);

        let by_age = CleanupOptions::new().max_age(Duration::from_secs(60));
        assert!(by_age.should_evict(&session));

        let by_status = CleanupOptions::new().statuses([SessionStatus::Completed]);
        assert!(!by_status.should_evict(&session));
        session.status = SessionStatus::Completed;
        assert!(by_status.should_evict(&session));
    }

    #[test]
    fn test_stats_from_statuses() {
        let stats = StoreStats::from_statuses([
            SessionStatus::Running,
            SessionStatus::Running,
            SessionStatus::Failed,
        ]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.count(SessionStatus::Running), 2);
        assert_eq!(stats.count(SessionStatus::Failed), 1);
        assert_eq!(stats.count(SessionStatus::Paused), 0);
    }
}

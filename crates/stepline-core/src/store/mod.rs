//! Pluggable persistence boundary for sessions.

mod memory;

pub use memory::InMemoryStore;

use crate::error::StoreError;
use crate::session::{
    BranchDecision, CleanupOptions, Session, SessionFilter, SessionUpdate, StepExecution,
    StoreStats,
};
use async_trait::async_trait;
use serde_json::Value;

/// Storage for session records.
///
/// The store is the only authority for session state. Every call either
/// fully applies or returns an error, and every read returns an owned copy so
/// callers cannot alter stored state without going through the store.
///
/// A terminal session is read-only. Every mutator must check and write
/// atomically and fail with [`StoreError::SessionClosed`] once the session is
/// terminal, so of two racing terminal transitions only the first lands.
/// [`Session::ensure_open`] and [`SessionUpdate::apply`] perform the check.
///
/// Implementations must be thread-safe; a networked or disk-backed store can
/// replace [`InMemoryStore`] without the orchestrator changing.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // =========================================================================
    // Session CRUD
    // =========================================================================

    /// Inserts a new session. Fails with [`StoreError::SessionExists`] if the
    /// id is taken.
    async fn create_session(&self, session: Session) -> Result<Session, StoreError>;

    /// Returns the session, or `None` if it does not exist.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Merges `update` into the stored session and returns the result.
    async fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Session, StoreError>;

    /// Removes a session. Returns `true` if it existed.
    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Lists sessions matching `filter`, oldest first.
    async fn list_sessions(&self, filter: SessionFilter) -> Result<Vec<Session>, StoreError>;

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Returns session counts by status.
    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Evicts sessions according to `options` and returns how many were
    /// removed.
    async fn cleanup(&self, options: CleanupOptions) -> Result<usize, StoreError>;

    /// Releases resources held by the store.
    async fn close(&self) -> Result<(), StoreError>;

    // =========================================================================
    // Targeted mutators
    // =========================================================================

    /// Writes one memory entry.
    async fn set_memory(&self, session_id: &str, key: &str, value: Value)
        -> Result<(), StoreError>;

    /// Reads one memory entry. `None` if the key is unset; an error if the
    /// session does not exist.
    async fn get_memory(&self, session_id: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Appends a step execution to the session history.
    async fn record_step_execution(
        &self,
        session_id: &str,
        execution: StepExecution,
    ) -> Result<(), StoreError>;

    /// Appends a branch decision to the session branch history.
    async fn record_branch_decision(
        &self,
        session_id: &str,
        decision: BranchDecision,
    ) -> Result<(), StoreError>;
}

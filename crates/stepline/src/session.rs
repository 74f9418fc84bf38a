//! Typed facade over a [`Store`] that owns session creation and eviction
//! policy.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stepline_core::serde_helpers::duration_millis;
use stepline_core::{
    BranchDecision, CleanupOptions, InMemoryStore, Memory, Session, SessionFilter, SessionStatus,
    SessionUpdate, StepExecution, Store, StoreError, StoreStats,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Supplies globally unique session identifiers.
///
/// Any `Fn() -> String` closure is a generator.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// Default generator producing random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Session retention policy.
///
/// # Examples
///
/// ```
/// use stepline::SessionManagerConfig;
/// use std::time::Duration;
///
/// let config: SessionManagerConfig =
///     serde_json::from_str(r#"{"ttl": 60000, "maxSessions": 10}"#).unwrap();
/// assert_eq!(config.ttl, Duration::from_secs(60));
/// assert_eq!(config.max_sessions, 10);
/// assert_eq!(config.cleanup_statuses.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionManagerConfig {
    /// Sessions older than this are evicted when the store is full.
    #[serde(with = "duration_millis")]
    pub ttl: Duration,
    /// Store size at which eviction is triggered before a new insert.
    pub max_sessions: usize,
    /// Statuses evicted when the store is full.
    pub cleanup_statuses: Vec<SessionStatus>,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            max_sessions: 1000,
            cleanup_statuses: SessionStatus::TERMINAL.to_vec(),
        }
    }
}

/// Creates, reads, and updates sessions through a [`Store`].
///
/// The manager holds no session state itself; every call goes to the store.
///
/// # Examples
///
/// ```
/// use stepline::SessionManager;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let sessions = SessionManager::in_memory();
/// let session = sessions.create_session("demo", 2).await?;
///
/// sessions.set_memory(&session.session_id, "k", json!("v")).await?;
/// assert_eq!(
///     sessions.get_memory(&session.session_id, "k").await?,
///     Some(json!("v"))
/// );
/// # Ok::<(), stepline::StoreError>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn Store>,
    config: SessionManagerConfig,
    ids: Arc<dyn IdGenerator>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish()
    }
}

impl SessionManager {
    /// Creates a manager with the default retention policy.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, SessionManagerConfig::default())
    }

    /// Creates a manager with a custom retention policy.
    pub fn with_config(store: Arc<dyn Store>, config: SessionManagerConfig) -> Self {
        Self {
            store,
            config,
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Creates a manager over a fresh [`InMemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Replaces the session id generator.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    /// Creates a `pending` session, evicting stale sessions first if the
    /// store is at capacity.
    pub async fn create_session(
        &self,
        workflow_name: &str,
        total_steps: usize,
    ) -> Result<Session, StoreError> {
        let stats = self.store.stats().await?;
        if stats.total >= self.config.max_sessions {
            let removed = self.cleanup().await?;
            info!(
                "Session store at capacity ({}), evicted {} sessions",
                stats.total, removed
            );
        }

        let session = Session::new(self.ids.generate(), workflow_name, total_steps);
        let session = self.store.create_session(session).await?;
        debug!(
            "Created session '{}' for workflow '{}'",
            session.session_id, workflow_name
        );
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.store.get_session(session_id).await
    }

    pub async fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Session, StoreError> {
        self.store.update_session(session_id, update).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        self.store.delete_session(session_id).await
    }

    pub async fn list_sessions(&self, filter: SessionFilter) -> Result<Vec<Session>, StoreError> {
        self.store.list_sessions(filter).await
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.store.stats().await
    }

    /// Evicts sessions past the TTL or in a configured cleanup status.
    pub async fn cleanup(&self) -> Result<usize, StoreError> {
        self.store
            .cleanup(
                CleanupOptions::new()
                    .max_age(self.config.ttl)
                    .statuses(self.config.cleanup_statuses.iter().copied()),
            )
            .await
    }

    pub async fn set_memory(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        self.store.set_memory(session_id, key, value).await
    }

    pub async fn get_memory(&self, session_id: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.store.get_memory(session_id, key).await
    }

    /// Returns a copy of the whole session memory.
    pub async fn get_all_memory(&self, session_id: &str) -> Result<Memory, StoreError> {
        self.require(session_id).await.map(|s| s.memory)
    }

    pub async fn record_step_execution(
        &self,
        session_id: &str,
        execution: StepExecution,
    ) -> Result<(), StoreError> {
        self.store.record_step_execution(session_id, execution).await
    }

    pub async fn record_branch_decision(
        &self,
        session_id: &str,
        decision: BranchDecision,
    ) -> Result<(), StoreError> {
        self.store.record_branch_decision(session_id, decision).await
    }

    /// Moves a session to `status` and stamps its completion time.
    pub async fn complete_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        error: Option<String>,
    ) -> Result<Session, StoreError> {
        let mut update = SessionUpdate::new().status(status).completed_at(Utc::now());
        update.error = error;
        self.store.update_session(session_id, update).await
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        self.store.close().await
    }

    async fn require(&self, session_id: &str) -> Result<Session, StoreError> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))
    }
}

//! In-memory implementation of [`Store`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use super::Store;
use crate::error::StoreError;
use crate::session::{
    BranchDecision, CleanupOptions, Session, SessionFilter, SessionUpdate, StepExecution,
    StoreStats,
};

/// Reference [`Store`] keeping every session in process memory.
///
/// Each operation takes the lock once, so writes are never partially visible.
/// Once a session is terminal every mutator fails with
/// [`StoreError::SessionClosed`].
///
/// # Example
///
/// ```
/// use stepline_core::{InMemoryStore, Session, Store};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryStore::new();
/// store.create_session(Session::new("s-1", "demo", 1)).await?;
/// store.set_memory("s-1", "k", "v".into()).await?;
///
/// assert_eq!(store.get_memory("s-1", "k").await?, Some("v".into()));
/// # Ok::<(), stepline_core::StoreError>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn with_open_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, StoreError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        session.ensure_open()?;
        Ok(f(session))
    }
}

fn oldest_first(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| {
        a.started_at
            .cmp(&b.started_at)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_session(&self, session: Session) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.session_id) {
            return Err(StoreError::SessionExists(session.session_id));
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        update.apply(session)?;
        Ok(session.clone())
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().remove(session_id).is_some())
    }

    async fn list_sessions(&self, filter: SessionFilter) -> Result<Vec<Session>, StoreError> {
        let mut matched: Vec<Session> = self
            .sessions
            .read()
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        oldest_first(&mut matched);

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let sessions = self.sessions.read();
        Ok(StoreStats::from_statuses(sessions.values().map(|s| s.status)))
    }

    async fn cleanup(&self, options: CleanupOptions) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();

        sessions.retain(|_, session| !options.should_evict(session));

        if let Some(max_sessions) = options.max_sessions {
            if sessions.len() > max_sessions {
                let mut remaining: Vec<Session> = sessions.values().cloned().collect();
                oldest_first(&mut remaining);
                let excess = remaining.len() - max_sessions;
                for session in remaining.iter().take(excess) {
                    sessions.remove(&session.session_id);
                }
            }
        }

        let removed = before - sessions.len();
        debug!("Cleanup removed {} of {} sessions", removed, before);
        Ok(removed)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.sessions.write().clear();
        Ok(())
    }

    async fn set_memory(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        self.with_open_session(session_id, |session| {
            session.memory.insert(key.to_string(), value);
        })
    }

    async fn get_memory(&self, session_id: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let sessions = self.sessions.read();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        Ok(session.memory.get(key).cloned())
    }

    async fn record_step_execution(
        &self,
        session_id: &str,
        execution: StepExecution,
    ) -> Result<(), StoreError> {
        self.with_open_session(session_id, |session| session.history.push(execution))
    }

    async fn record_branch_decision(
        &self,
        session_id: &str,
        decision: BranchDecision,
    ) -> Result<(), StoreError> {
        self.with_open_session(session_id, |session| session.branch_history.push(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use chrono::Utc;
    use std::time::Duration;

    fn session(id: &str, workflow: &str, status: SessionStatus, age_secs: i64) -> Session {
        let mut session = Session::new(id, workflow, 2);
        session.status = status;
        session.started_at = Utc::now() - chrono::Duration::seconds(age_secs);
        session
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = InMemoryStore::new();
        store
            .create_session(Session::new("s-1", "demo", 1))
            .await
            .expect("first insert");

        let result = store.create_session(Session::new("s-1", "demo", 1)).await;
        assert_eq!(result, Err(StoreError::SessionExists("s-1".to_string())));
    }

    #[tokio::test]
    async fn test_get_missing_session_is_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_session("missing").await, Ok(None));
    }

    #[tokio::test]
    async fn test_update_missing_session_fails() {
        let store = InMemoryStore::new();
        let result = store
            .update_session("missing", SessionUpdate::new().current_step(1))
            .await;
        assert_eq!(
            result,
            Err(StoreError::SessionNotFound("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_returned_sessions_are_copies() {
        let store = InMemoryStore::new();
        store
            .create_session(Session::new("s-1", "demo", 1))
            .await
            .expect("insert");
        store
            .set_memory("s-1", "k", Value::from("v"))
            .await
            .expect("set memory");

        let mut copy = store
            .get_session("s-1")
            .await
            .expect("get")
            .expect("exists");
        copy.memory.insert("k".to_string(), Value::from("tampered"));
        copy.history.clear();

        assert_eq!(
            store.get_memory("s-1", "k").await.expect("get memory"),
            Some(Value::from("v"))
        );
    }

    #[tokio::test]
    async fn test_terminal_session_is_read_only() {
        let store = InMemoryStore::new();
        store
            .create_session(Session::new("s-1", "demo", 1))
            .await
            .expect("insert");
        store
            .update_session("s-1", SessionUpdate::new().status(SessionStatus::Cancelled))
            .await
            .expect("cancel");

        let closed = StoreError::SessionClosed {
            session_id: "s-1".to_string(),
            status: SessionStatus::Cancelled,
        };
        assert_eq!(
            store
                .update_session("s-1", SessionUpdate::new().status(SessionStatus::Completed))
                .await,
            Err(closed.clone())
        );
        assert_eq!(
            store.set_memory("s-1", "late", Value::from(1)).await,
            Err(closed.clone())
        );
        let now = Utc::now();
        assert_eq!(
            store
                .record_step_execution(
                    "s-1",
                    StepExecution {
                        step_index: 0,
                        activity_name: "late".to_string(),
                        started_at: now,
                        completed_at: now,
                        success: true,
                        error: None,
                    },
                )
                .await,
            Err(closed)
        );

        let session = store
            .get_session("s-1")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(session.status, SessionStatus::Cancelled);
        assert!(session.memory.is_empty());
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let store = InMemoryStore::new();
        for (i, status) in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Running,
            SessionStatus::Running,
        ]
        .into_iter()
        .enumerate()
        {
            store
                .create_session(session(&format!("a-{}", i), "alpha", status, 100 - i as i64))
                .await
                .expect("insert");
        }
        store
            .create_session(session("b-0", "beta", SessionStatus::Running, 1))
            .await
            .expect("insert");

        let running_alpha = store
            .list_sessions(
                SessionFilter::new()
                    .workflow_name("alpha")
                    .status(SessionStatus::Running),
            )
            .await
            .expect("list");
        let ids: Vec<_> = running_alpha.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["a-0", "a-2", "a-3"]);

        let page = store
            .list_sessions(SessionFilter::new().workflow_name("alpha").offset(1).limit(2))
            .await
            .expect("list");
        let ids: Vec<_> = page.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "a-2"]);
    }

    #[tokio::test]
    async fn test_cleanup_by_age_and_status() {
        let store = InMemoryStore::new();
        store
            .create_session(session("old", "demo", SessionStatus::Running, 3600))
            .await
            .expect("insert");
        store
            .create_session(session("done", "demo", SessionStatus::Completed, 1))
            .await
            .expect("insert");
        store
            .create_session(session("fresh", "demo", SessionStatus::Running, 1))
            .await
            .expect("insert");

        let removed = store
            .cleanup(
                CleanupOptions::new()
                    .max_age(Duration::from_secs(60))
                    .statuses([SessionStatus::Completed]),
            )
            .await
            .expect("cleanup");

        assert_eq!(removed, 2);
        assert!(store.get_session("fresh").await.expect("get").is_some());
        assert!(store.get_session("old").await.expect("get").is_none());
        assert!(store.get_session("done").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_cleanup_evicts_oldest_over_budget() {
        let store = InMemoryStore::new();
        for (id, age) in [("a", 30), ("b", 20), ("c", 10)] {
            store
                .create_session(session(id, "demo", SessionStatus::Running, age))
                .await
                .expect("insert");
        }

        let removed = store
            .cleanup(CleanupOptions::new().max_sessions(1))
            .await
            .expect("cleanup");

        assert_eq!(removed, 2);
        assert!(store.get_session("c").await.expect("get").is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_and_close() {
        let store = InMemoryStore::new();
        store
            .create_session(session("a", "demo", SessionStatus::Running, 1))
            .await
            .expect("insert");
        store
            .create_session(session("b", "demo", SessionStatus::Failed, 1))
            .await
            .expect("insert");

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.count(SessionStatus::Failed), 1);

        store.close().await.expect("close");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_record_history_and_branches() {
        let store = InMemoryStore::new();
        store
            .create_session(Session::new("s-1", "demo", 2))
            .await
            .expect("insert");

        let now = Utc::now();
        store
            .record_step_execution(
                "s-1",
                StepExecution {
                    step_index: 0,
                    activity_name: "add".to_string(),
                    started_at: now,
                    completed_at: now,
                    success: true,
                    error: None,
                },
            )
            .await
            .expect("record step");
        store
            .record_branch_decision(
                "s-1",
                BranchDecision {
                    step_index: 0,
                    branch_pattern: Some("valid".to_string()),
                    tool_name: "ok_tool".to_string(),
                    timestamp: now,
                },
            )
            .await
            .expect("record branch");

        let session = store
            .get_session("s-1")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.history[0].activity_name, "add");
        assert_eq!(session.branch_history[0].tool_name, "ok_tool");
    }
}

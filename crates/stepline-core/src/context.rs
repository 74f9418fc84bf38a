//! Execution context handed to activities.

use crate::error::StoreError;
use crate::session::Memory;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Type-safe activity name wrapper.
///
/// Step outputs are stored in session memory under this name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityName(String);

impl ActivityName {
    /// Creates a new ActivityName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActivityName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActivityName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ActivityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ActivityName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Where in a workflow an activity is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub workflow_name: String,
    pub current_step: usize,
    pub total_steps: usize,
    pub started_at: DateTime<Utc>,
}

/// Everything an activity run can see.
///
/// Memory is a snapshot taken when the step began. When the context is bound
/// to a session, [`set_memory`](Self::set_memory) writes through to the store
/// as well.
///
/// # Examples
///
/// ```
/// use stepline_core::ActivityContext;
/// use serde_json::json;
///
/// let ctx = ActivityContext::new(json!({"a": 2}));
/// assert_eq!(ctx.input()["a"], 2);
/// assert!(ctx.session_id().is_none());
/// ```
#[derive(Clone)]
pub struct ActivityContext {
    input: Value,
    session_id: Option<String>,
    memory: Memory,
    metadata: Option<ExecutionMetadata>,
    store: Option<Arc<dyn Store>>,
}

impl fmt::Debug for ActivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityContext")
            .field("input", &self.input)
            .field("session_id", &self.session_id)
            .field("memory_keys", &self.memory.keys().collect::<Vec<_>>())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl ActivityContext {
    /// Creates a standalone context carrying only `input`.
    pub fn new(input: Value) -> Self {
        Self {
            input,
            session_id: None,
            memory: Memory::new(),
            metadata: None,
            store: None,
        }
    }

    /// Binds the context to a stored session.
    pub fn with_session(
        mut self,
        session_id: impl Into<String>,
        memory: Memory,
        store: Arc<dyn Store>,
    ) -> Self {
        self.session_id = Some(session_id.into());
        self.memory = memory;
        self.store = Some(store);
        self
    }

    /// Replaces the memory snapshot without binding a store.
    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memory = memory;
        self
    }

    /// Attaches workflow position metadata.
    pub fn with_metadata(mut self, metadata: ExecutionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn metadata(&self) -> Option<&ExecutionMetadata> {
        self.metadata.as_ref()
    }

    /// Returns a memory entry from the snapshot.
    pub fn get_memory(&self, key: &str) -> Option<&Value> {
        self.memory.get(key)
    }

    /// Writes a memory entry, persisting it when bound to a session.
    pub async fn set_memory(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        if let (Some(store), Some(session_id)) = (&self.store, &self.session_id) {
            store.set_memory(session_id, key, value.clone()).await?;
        }
        self.memory.insert(key.to_string(), value);
        Ok(())
    }
}

//! Workflow engine advancing sessions one step per call.

use crate::response::{
    CompletionResponse, FailureResponse, NextStep, Progress, StepResponse, WorkflowResponse,
};
use crate::session::SessionManager;
use crate::step::{Branch, Step};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stepline_core::serde_helpers::option_duration_millis;
use stepline_core::{
    ActivityContext, ActivityResult, BranchDecision, ExecutionMetadata, HookType, Memory, Session,
    SessionFilter, SessionStatus, SessionUpdate, StepExecution, Store, StoreError,
    ToolCallSuggestion, WorkflowError, INPUT_MEMORY_KEY,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Priority given to suggestions produced by matching branches.
pub const BRANCH_PRIORITY: i32 = 100;

/// Priority given to the default "continue to the next step" suggestion.
pub const CONTINUE_PRIORITY: i32 = 50;

/// Static description of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Overall deadline for a run. Carried for hosts; not enforced here.
    #[serde(
        default,
        with = "option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl WorkflowConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            timeout: None,
        }
    }
}

/// Workflow-level lifecycle callbacks.
///
/// `on_success` or `on_failure` runs once when a session finishes, followed
/// by `on_complete`. Cancellation only runs `on_complete`. Errors are logged
/// and never change the response.
#[async_trait]
pub trait WorkflowHooks: Send + Sync {
    async fn on_success(&self, _session: &Session) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn on_failure(&self, _session: &Session, _error: &str) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn on_complete(&self, _session: &Session) -> Result<(), WorkflowError> {
        Ok(())
    }
}

/// What happened to a single step.
enum StepOutcome {
    /// The activity ran and the workflow moves on.
    Continue(StepRun),
    /// A required step failed, or its input could not be built.
    Fail(String),
    /// The step's condition did not hold.
    Skip,
}

struct StepRun {
    result: ActivityResult,
    input: Value,
    memory: Memory,
}

type LockMap = Mutex<HashMap<String, Arc<SessionLocks>>>;

/// Locks for one session.
///
/// `run` is held for a whole start, continue, step, pause, or resume call.
/// `commit` is only held while a finished step's outcome is persisted and
/// the call's response is produced. `cancel` takes `commit` alone, so it
/// never waits for an activity and never lands halfway through a commit.
#[derive(Default)]
struct SessionLocks {
    run: Arc<AsyncMutex<()>>,
    commit: Arc<AsyncMutex<()>>,
}

#[derive(Debug, Clone, Copy)]
enum LockKind {
    Run,
    Commit,
}

/// A held per-session lock. Dropping the last guard of a session removes
/// its entry from the lock map.
struct SessionGuard<'a> {
    locks: &'a LockMap,
    session_id: String,
    entry: Option<Arc<SessionLocks>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        drop(self.entry.take());
        let mut locks = self.locks.lock();
        let idle = locks
            .get(&self.session_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1);
        if idle {
            locks.remove(&self.session_id);
        }
    }
}

/// An ordered list of steps driven through persistent sessions.
///
/// Each call to [`start`](Self::start) or
/// [`continue_session`](Self::continue_session) runs exactly one step (plus
/// any skipped ones) and returns a [`WorkflowResponse`] describing what
/// happened and what may be called next.
///
/// # Examples
///
/// ```
/// use stepline::prelude::*;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let add = Activity::from_fn("add", |ctx: ActivityContext| async move {
///     let a = ctx.input()["a"].as_i64().unwrap_or_default();
///     let b = ctx.input()["b"].as_i64().unwrap_or_default();
///     Ok(ActivityResult::ok(json!({ "value": a + b })))
/// });
///
/// let workflow = Workflow::builder("math").step(add).build()?;
/// let response = workflow.start(json!({"a": 2, "b": 3})).await?;
///
/// assert!(response.is_completed());
/// # Ok::<(), WorkflowError>(())
/// # }).unwrap();
/// ```
pub struct Workflow {
    config: WorkflowConfig,
    steps: Vec<Step>,
    sessions: SessionManager,
    hooks: Option<Arc<dyn WorkflowHooks>>,
    locks: LockMap,
    current: Mutex<Option<String>>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("config", &self.config)
            .field(
                "steps",
                &self
                    .steps
                    .iter()
                    .map(|s| s.activity().name())
                    .collect::<Vec<_>>(),
            )
            .field("has_hooks", &self.hooks.is_some())
            .finish()
    }
}

impl Workflow {
    /// Creates a new workflow builder.
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.sessions
    }

    /// Tool name a host should expose for starting this workflow.
    pub fn start_tool_name(&self) -> String {
        format!("{}_start", self.config.name)
    }

    /// Tool name a host should expose for advancing this workflow.
    pub fn continue_tool_name(&self) -> String {
        format!("{}_continue", self.config.name)
    }

    /// Creates a session for `input` and runs the first step.
    pub async fn start(&self, input: Value) -> Result<WorkflowResponse, WorkflowError> {
        let session = self
            .sessions
            .create_session(&self.config.name, self.steps.len())
            .await?;
        let session_id = session.session_id;
        let _run = self.lock(&session_id, LockKind::Run).await;

        self.sessions
            .set_memory(&session_id, INPUT_MEMORY_KEY, input.clone())
            .await?;
        self.sessions
            .update_session(
                &session_id,
                SessionUpdate::new().status(SessionStatus::Running),
            )
            .await?;
        *self.current.lock() = Some(session_id.clone());
        info!(
            "Started workflow '{}' in session '{}'",
            self.config.name, session_id
        );

        self.run_from(&session_id, 0, input).await
    }

    /// Runs the step after the session's current one, feeding it the
    /// previous step's output.
    pub async fn continue_session(
        &self,
        session_id: &str,
    ) -> Result<WorkflowResponse, WorkflowError> {
        let (_run, session) = self.lock_session(session_id).await?;
        if session.status != SessionStatus::Running {
            return Err(WorkflowError::InvalidStatus {
                action: "continue",
                status: session.status,
            });
        }
        *self.current.lock() = Some(session_id.to_string());

        let next = session.current_step + 1;
        if next >= self.steps.len() {
            let _commit = self.lock(session_id, LockKind::Commit).await;
            return self.finish(session_id, Vec::new()).await;
        }

        let input = self
            .steps
            .get(session.current_step)
            .and_then(|step| session.memory.get(step.activity().name().as_str()))
            .cloned()
            .unwrap_or(Value::Null);
        self.run_from(session_id, next, input).await
    }

    /// Continues the session most recently started or continued through
    /// this workflow.
    pub async fn continue_current(&self) -> Result<WorkflowResponse, WorkflowError> {
        let session_id = self.current.lock().clone().ok_or_else(|| {
            WorkflowError::Configuration("no active session, call start first".to_string())
        })?;
        self.continue_session(&session_id).await
    }

    /// Runs the step at `index` with an explicit input.
    ///
    /// The session never moves backwards: an index before the current step,
    /// or one that already has a history entry, is rejected with
    /// [`WorkflowError::StepAlreadyRun`]. Later indices may be jumped to.
    pub async fn execute_step(
        &self,
        session_id: &str,
        index: usize,
        input: Value,
    ) -> Result<WorkflowResponse, WorkflowError> {
        if index >= self.steps.len() {
            return Err(WorkflowError::StepOutOfRange {
                index,
                total: self.steps.len(),
            });
        }
        let (_run, session) = self.lock_session(session_id).await?;
        if session.status != SessionStatus::Running {
            return Err(WorkflowError::InvalidStatus {
                action: "execute a step of",
                status: session.status,
            });
        }
        let already_run = session.history.iter().any(|h| h.step_index == index);
        if index < session.current_step || already_run {
            return Err(WorkflowError::StepAlreadyRun {
                index,
                current_step: session.current_step,
            });
        }
        self.run_from(session_id, index, input).await
    }

    pub async fn pause(&self, session_id: &str) -> Result<Session, WorkflowError> {
        self.transition(session_id, "pause", SessionStatus::Running, SessionStatus::Paused)
            .await
    }

    pub async fn resume(&self, session_id: &str) -> Result<Session, WorkflowError> {
        self.transition(session_id, "resume", SessionStatus::Paused, SessionStatus::Running)
            .await
    }

    /// Cancels a non-terminal session.
    ///
    /// Does not wait for an in-flight activity; that step's result is
    /// discarded when it returns. A step that is already persisting its
    /// outcome finishes first; if that finished the session, the cancel fails.
    pub async fn cancel(&self, session_id: &str) -> Result<Session, WorkflowError> {
        let commit = self.lock(session_id, LockKind::Commit).await;
        let session = self.load(session_id).await?;
        if session.is_terminal() {
            return Err(WorkflowError::InvalidStatus {
                action: "cancel",
                status: session.status,
            });
        }

        let session = self
            .sessions
            .complete_session(session_id, SessionStatus::Cancelled, None)
            .await
            .map_err(|error| match error {
                StoreError::SessionClosed { status, .. } => WorkflowError::InvalidStatus {
                    action: "cancel",
                    status,
                },
                other => other.into(),
            })?;
        drop(commit);
        info!(
            "Cancelled workflow '{}' in session '{}'",
            self.config.name, session_id
        );

        if let Some(hooks) = &self.hooks {
            self.log_hook(HookType::OnComplete, hooks.on_complete(&session).await);
        }
        Ok(session)
    }

    pub async fn session_status(&self, session_id: &str) -> Result<Session, WorkflowError> {
        self.load(session_id).await
    }

    /// Lists this workflow's sessions, oldest first.
    pub async fn list_sessions(
        &self,
        filter: SessionFilter,
    ) -> Result<Vec<Session>, WorkflowError> {
        let filter = filter.workflow_name(self.config.name.clone());
        Ok(self.sessions.list_sessions(filter).await?)
    }

    async fn run_from(
        &self,
        session_id: &str,
        mut index: usize,
        input: Value,
    ) -> Result<WorkflowResponse, WorkflowError> {
        loop {
            let Some(step) = self.steps.get(index) else {
                let _commit = self.lock(session_id, LockKind::Commit).await;
                return self.finish(session_id, Vec::new()).await;
            };

            let (outcome, _commit) = self.run_step(session_id, index, step, &input).await?;
            let run = match outcome {
                StepOutcome::Continue(run) => run,
                StepOutcome::Skip => {
                    index += 1;
                    continue;
                }
                StepOutcome::Fail(error) => return self.fail(session_id, index, error).await,
            };

            let is_last = index + 1 >= self.steps.len();
            let branch_options = self.branch_options(session_id, index, step, &run, is_last).await?;

            if is_last {
                return self.finish(session_id, branch_options).await;
            }
            return self.step_response(session_id, index, run, branch_options).await;
        }
    }

    /// Runs one step. When the activity ran, the returned commit guard must
    /// be held until the call's response is built.
    async fn run_step(
        &self,
        session_id: &str,
        index: usize,
        step: &Step,
        input: &Value,
    ) -> Result<(StepOutcome, Option<SessionGuard<'_>>), WorkflowError> {
        let session = self
            .sessions
            .update_session(session_id, SessionUpdate::new().current_step(index))
            .await?;
        let activity = step.activity();
        let name = activity.name();

        if !step.should_run(&session.memory) {
            debug!(
                "Skipping step {} ('{}') in session '{}': condition not met",
                index, name, session_id
            );
            return Ok((StepOutcome::Skip, None));
        }

        let activity_input = match step.activity_input(input, &session.memory) {
            Ok(value) => value,
            Err(error) => {
                let error = format!("Input mapping failed for step '{}': {}", name, error);
                return Ok((StepOutcome::Fail(error), None));
            }
        };

        let ctx = ActivityContext::new(activity_input.clone())
            .with_session(session_id, session.memory, self.sessions.store())
            .with_metadata(ExecutionMetadata {
                workflow_name: self.config.name.clone(),
                current_step: index,
                total_steps: self.steps.len(),
                started_at: session.started_at,
            });

        let started_at = Utc::now();
        let result = activity.execute_with_retry(&ctx).await;
        let completed_at = Utc::now();

        // A cancel may have landed while the activity was running.
        let commit = self.lock(session_id, LockKind::Commit).await;
        let mut current = self.load(session_id).await?;
        if current.is_terminal() {
            info!(
                "Discarding result of step {} ('{}'): session '{}' is {}",
                index, name, session_id, current.status
            );
            return Err(WorkflowError::InvalidStatus {
                action: "advance",
                status: current.status,
            });
        }

        self.sessions
            .record_step_execution(
                session_id,
                StepExecution {
                    step_index: index,
                    activity_name: name.to_string(),
                    started_at,
                    completed_at,
                    success: result.success,
                    error: result.error.clone(),
                },
            )
            .await?;
        let data = result.data.clone().unwrap_or(Value::Null);
        self.sessions
            .set_memory(session_id, name.as_str(), data.clone())
            .await?;
        current.memory.insert(name.to_string(), data);

        if result.success {
            info!(
                "Step {} ('{}') completed in session '{}'",
                index, name, session_id
            );
        } else if step.is_optional() {
            warn!(
                "Optional step {} ('{}') failed in session '{}', continuing: {}",
                index,
                name,
                session_id,
                result.error.as_deref().unwrap_or_default()
            );
        } else {
            let error = result
                .error
                .unwrap_or_else(|| format!("Activity '{}' failed", name));
            return Ok((StepOutcome::Fail(error), Some(commit)));
        }

        let run = StepRun {
            result,
            input: activity_input,
            memory: current.memory,
        };
        Ok((StepOutcome::Continue(run), Some(commit)))
    }

    /// Evaluates branches, records the matches, and ranks every suggestion.
    async fn branch_options(
        &self,
        session_id: &str,
        index: usize,
        step: &Step,
        run: &StepRun,
        is_last: bool,
    ) -> Result<Vec<ToolCallSuggestion>, WorkflowError> {
        let data = run.result.data.clone().unwrap_or(Value::Null);
        let matched: Vec<&Branch> = step
            .branches()
            .iter()
            .filter(|b| b.matches(&data, &run.input, &run.memory))
            .collect();

        for branch in &matched {
            self.sessions
                .record_branch_decision(
                    session_id,
                    BranchDecision {
                        step_index: index,
                        branch_pattern: branch.description().map(str::to_string),
                        tool_name: branch.call().to_string(),
                        timestamp: Utc::now(),
                    },
                )
                .await?;
        }

        let branch_suggestions = matched
            .iter()
            .map(|b| b.to_suggestion(&data, &run.input, &run.memory, BRANCH_PRIORITY))
            .collect();
        let default = if is_last {
            None
        } else {
            Some(self.continue_suggestion(session_id, index + 1))
        };

        Ok(rank_suggestions(
            &run.result.tool_call_suggestions,
            branch_suggestions,
            default,
        ))
    }

    fn continue_suggestion(&self, session_id: &str, next: usize) -> ToolCallSuggestion {
        let activity = self
            .steps
            .get(next)
            .map(|s| s.activity().name().to_string())
            .unwrap_or_default();
        ToolCallSuggestion::new(self.continue_tool_name())
            .with_parameters(json!({ "sessionId": session_id }))
            .with_condition(format!("Continue to step {} ('{}')", next + 1, activity))
            .with_priority(CONTINUE_PRIORITY)
    }

    async fn step_response(
        &self,
        session_id: &str,
        index: usize,
        run: StepRun,
        branch_options: Vec<ToolCallSuggestion>,
    ) -> Result<WorkflowResponse, WorkflowError> {
        let session = self.load(session_id).await?;
        let total = self.steps.len();
        let name = self
            .steps
            .get(index)
            .map(|s| s.activity().name().to_string())
            .unwrap_or_default();
        let next_name = self
            .steps
            .get(index + 1)
            .map(|s| s.activity().name().to_string())
            .unwrap_or_default();

        let message = if run.result.success {
            format!("Step {}/{} ('{}') completed", index + 1, total, name)
        } else {
            format!(
                "Step {}/{} ('{}') failed but is optional, continuing",
                index + 1,
                total,
                name
            )
        };

        Ok(WorkflowResponse::Step(StepResponse {
            message,
            session_id: session_id.to_string(),
            result: run.result.data.unwrap_or(Value::Null),
            next_step: NextStep {
                index: index + 1,
                activity_name: next_name,
            },
            progress: Progress {
                current: index + 1,
                total,
            },
            branch_options,
            session_snapshot: (&session).into(),
        }))
    }

    async fn finish(
        &self,
        session_id: &str,
        branch_options: Vec<ToolCallSuggestion>,
    ) -> Result<WorkflowResponse, WorkflowError> {
        let session = self
            .sessions
            .complete_session(session_id, SessionStatus::Completed, None)
            .await?;
        info!(
            "Workflow '{}' completed in session '{}'",
            self.config.name, session_id
        );

        if let Some(hooks) = &self.hooks {
            self.log_hook(HookType::OnSuccess, hooks.on_success(&session).await);
            self.log_hook(HookType::OnComplete, hooks.on_complete(&session).await);
        }

        Ok(WorkflowResponse::Completed(CompletionResponse {
            message: format!("Workflow '{}' completed successfully", self.config.name),
            session_id: session_id.to_string(),
            execution_time_ms: session.elapsed_ms(),
            results: session.memory,
            branch_options,
        }))
    }

    async fn fail(
        &self,
        session_id: &str,
        index: usize,
        error: String,
    ) -> Result<WorkflowResponse, WorkflowError> {
        let session = self
            .sessions
            .complete_session(session_id, SessionStatus::Failed, Some(error.clone()))
            .await?;

        let name = self
            .steps
            .get(index)
            .map(|s| s.activity().name().to_string())
            .unwrap_or_default();
        warn!(
            "Workflow '{}' failed at step {} ('{}') in session '{}': {}",
            self.config.name, index, name, session_id, error
        );

        if let Some(hooks) = &self.hooks {
            self.log_hook(HookType::OnFailure, hooks.on_failure(&session, &error).await);
            self.log_hook(HookType::OnComplete, hooks.on_complete(&session).await);
        }

        Ok(WorkflowResponse::Failed(FailureResponse {
            message: format!(
                "Workflow '{}' failed at step {} ('{}'): {}",
                self.config.name,
                index + 1,
                name,
                error
            ),
            session_id: session_id.to_string(),
            error,
            is_error: true,
        }))
    }

    async fn transition(
        &self,
        session_id: &str,
        action: &'static str,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<Session, WorkflowError> {
        let (_run, session) = self.lock_session(session_id).await?;
        if session.status != from {
            return Err(WorkflowError::InvalidStatus {
                action,
                status: session.status,
            });
        }
        let session = self
            .sessions
            .update_session(session_id, SessionUpdate::new().status(to))
            .await?;
        info!(
            "Session '{}' of workflow '{}' moved from {} to {}",
            session_id, self.config.name, from, to
        );
        Ok(session)
    }

    async fn load(&self, session_id: &str) -> Result<Session, WorkflowError> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.to_string()))
    }

    /// Serializes mutations of one session and loads it.
    async fn lock_session(
        &self,
        session_id: &str,
    ) -> Result<(SessionGuard<'_>, Session), WorkflowError> {
        let guard = self.lock(session_id, LockKind::Run).await;
        let session = self.load(session_id).await?;
        Ok((guard, session))
    }

    async fn lock(&self, session_id: &str, kind: LockKind) -> SessionGuard<'_> {
        let entry = Arc::clone(self.locks.lock().entry(session_id.to_string()).or_default());
        let mutex = match kind {
            LockKind::Run => Arc::clone(&entry.run),
            LockKind::Commit => Arc::clone(&entry.commit),
        };
        let mut guard = SessionGuard {
            locks: &self.locks,
            session_id: session_id.to_string(),
            entry: Some(entry),
            held: None,
        };
        guard.held = Some(mutex.lock_owned().await);
        guard
    }

    fn log_hook(&self, hook_type: HookType, result: Result<(), WorkflowError>) {
        if let Err(error) = result {
            let error = WorkflowError::HookError {
                workflow_name: self.config.name.clone(),
                hook_type,
                details: error.to_string(),
            };
            warn!("{}", error);
        }
    }
}

/// Orders suggestions: activity suggestions, then matched branches, then the
/// default continue suggestion unless something already targets it. The
/// sort is stable and descending by priority, so ties keep that order.
fn rank_suggestions(
    activity: &[ToolCallSuggestion],
    branches: Vec<ToolCallSuggestion>,
    default: Option<ToolCallSuggestion>,
) -> Vec<ToolCallSuggestion> {
    let mut ranked: Vec<ToolCallSuggestion> = activity.iter().cloned().chain(branches).collect();
    if let Some(default) = default {
        if !ranked.iter().any(|s| s.tool_name == default.tool_name) {
            ranked.push(default);
        }
    }
    ranked.sort_by_key(|s| Reverse(s.priority.unwrap_or(0)));
    ranked
}

/// Builder for constructing [`Workflow`] instances.
pub struct WorkflowBuilder {
    config: WorkflowConfig,
    steps: Vec<Step>,
    sessions: Option<SessionManager>,
    hooks: Option<Arc<dyn WorkflowHooks>>,
}

impl WorkflowBuilder {
    /// Creates a new empty workflow builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(WorkflowConfig::new(name))
    }

    pub fn from_config(config: WorkflowConfig) -> Self {
        Self {
            config,
            steps: Vec::new(),
            sessions: None,
            hooks: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = Some(description.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Appends a step. Activities convert into required steps.
    pub fn step(mut self, step: impl Into<Step>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Uses an existing session manager, e.g. to share one store.
    pub fn session_manager(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Persists sessions in `store` with the default retention policy.
    pub fn store(self, store: Arc<dyn Store>) -> Self {
        self.session_manager(SessionManager::new(store))
    }

    pub fn hooks(mut self, hooks: impl WorkflowHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Builds the workflow.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        if self.config.name.trim().is_empty() {
            return Err(WorkflowError::Configuration(
                "Workflow name must not be empty".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::Configuration(
                "Workflow must have at least one step".to_string(),
            ));
        }

        {
            let mut seen = HashSet::new();
            for step in &self.steps {
                let name = step.activity().name();
                if !seen.insert(name.as_str()) {
                    warn!(
                        "Workflow '{}' has more than one step named '{}', later outputs overwrite earlier ones",
                        self.config.name, name
                    );
                }
            }
        }

        Ok(Workflow {
            config: self.config,
            steps: self.steps,
            sessions: self.sessions.unwrap_or_else(SessionManager::in_memory),
            hooks: self.hooks,
            locks: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        })
    }
}

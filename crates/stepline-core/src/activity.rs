//! The activity execution contract: validate, run, time out, retry, notify.

use crate::context::{ActivityContext, ActivityName};
use crate::error::{ActivityError, HookType};
use crate::retry::{ActivityConfig, RetryPolicy};
use crate::validate::Validator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Metadata key carrying the wall-clock duration of an execution.
pub const EXECUTION_TIME_KEY: &str = "executionTimeMs";

/// Metadata key carrying the number of attempts made by `execute_with_retry`.
pub const ATTEMPTS_KEY: &str = "attempts";

/// A candidate next action offered to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallSuggestion {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl ToolCallSuggestion {
    /// Creates a suggestion with empty parameters.
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: Value::Object(Map::new()),
            condition: None,
            priority: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Output of one activity invocation.
///
/// `success` defaults to `true`; a run only fails by returning an error or by
/// setting it to `false` explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResult {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_suggestions: Vec<ToolCallSuggestion>,
}

fn default_success() -> bool {
    true
}

impl Default for ActivityResult {
    fn default() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            metadata: Map::new(),
            tool_call_suggestions: Vec::new(),
        }
    }
}

impl ActivityResult {
    /// A successful result carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// A failed result carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_suggestion(mut self, suggestion: ToolCallSuggestion) -> Self {
        self.tool_call_suggestions.push(suggestion);
        self
    }

    /// The stamped execution time, if present.
    pub fn execution_time_ms(&self) -> Option<u64> {
        self.metadata.get(EXECUTION_TIME_KEY).and_then(Value::as_u64)
    }
}

/// The work an activity performs.
///
/// Each run gets its own copy of the caller's [`ActivityContext`]. Changes
/// made through the `&mut` borrow stay local to that run and are dropped
/// when it returns. Only [`ActivityContext::set_memory`] on a context bound
/// to a session outlives the run, because it writes through to the store.
///
/// # Examples
///
/// ```
/// use stepline_core::{ActivityContext, ActivityError, ActivityHandler, ActivityResult};
/// use async_trait::async_trait;
/// use serde_json::json;
///
/// struct Add;
///
/// #[async_trait]
/// impl ActivityHandler for Add {
///     async fn run(&self, ctx: &mut ActivityContext) -> Result<ActivityResult, ActivityError> {
///         let a = ctx.input()["a"].as_i64().ok_or("a must be an integer")?;
///         let b = ctx.input()["b"].as_i64().ok_or("b must be an integer")?;
///         Ok(ActivityResult::ok(json!({ "value": a + b })))
///     }
/// }
/// ```
#[async_trait]
pub trait ActivityHandler: Send + Sync + 'static {
    /// Performs the work. Returning `Err` marks the execution as failed.
    async fn run(&self, ctx: &mut ActivityContext) -> Result<ActivityResult, ActivityError>;
}

/// Adapter turning an async closure into an [`ActivityHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ActivityHandler for FnHandler<F>
where
    F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActivityResult, ActivityError>> + Send + 'static,
{
    async fn run(&self, ctx: &mut ActivityContext) -> Result<ActivityResult, ActivityError> {
        (self.0)(ctx.clone()).await
    }
}

/// Lifecycle callbacks fired by [`Activity::execute`].
///
/// Exactly one of `on_success`/`on_failure` runs per execution, then
/// `on_complete` always runs. Errors are logged and do not alter the result.
#[async_trait]
pub trait ActivityHooks: Send + Sync {
    /// Called after a successful execution.
    async fn on_success(
        &self,
        _ctx: &ActivityContext,
        _result: &ActivityResult,
    ) -> Result<(), ActivityError> {
        Ok(())
    }

    /// Called after a failed execution.
    async fn on_failure(&self, _ctx: &ActivityContext, _error: &str) -> Result<(), ActivityError> {
        Ok(())
    }

    /// Called after every execution.
    async fn on_complete(
        &self,
        _ctx: &ActivityContext,
        _result: &ActivityResult,
    ) -> Result<(), ActivityError> {
        Ok(())
    }
}

/// A named, validated, retryable, timeout-bounded unit of work.
///
/// Activities know nothing about workflows and can be executed on their own.
///
/// # Examples
///
/// ```
/// use stepline_core::{Activity, ActivityContext, ActivityResult};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let double = Activity::from_fn("double", |ctx: ActivityContext| async move {
///     let value = ctx.input()["value"].as_i64().unwrap_or_default();
///     Ok(ActivityResult::ok(json!({ "value": value * 2 })))
/// })
/// .with_timeout(Duration::from_secs(1));
///
/// let result = double.execute(&ActivityContext::new(json!({"value": 5}))).await;
/// assert!(result.success);
/// assert_eq!(result.data, Some(json!({"value": 10})));
/// assert!(result.execution_time_ms().is_some());
/// # });
/// ```
#[derive(Clone)]
pub struct Activity {
    name: ActivityName,
    description: Option<String>,
    handler: Arc<dyn ActivityHandler>,
    hooks: Option<Arc<dyn ActivityHooks>>,
    input_validator: Option<Arc<dyn Validator>>,
    output_validator: Option<Arc<dyn Validator>>,
    config: ActivityConfig,
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activity")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("config", &self.config)
            .field("has_hooks", &self.hooks.is_some())
            .finish()
    }
}

impl Activity {
    /// Creates an activity backed by `handler`, with no timeout or retry.
    pub fn new(name: impl Into<ActivityName>, handler: impl ActivityHandler) -> Self {
        Self {
            name: name.into(),
            description: None,
            handler: Arc::new(handler),
            hooks: None,
            input_validator: None,
            output_validator: None,
            config: ActivityConfig::default(),
        }
    }

    /// Creates an activity backed by an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<ActivityName>, f: F) -> Self
    where
        F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActivityResult, ActivityError>> + Send + 'static,
    {
        Self::new(name, FnHandler(f))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.input_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_output_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.output_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_hooks(mut self, hooks: impl ActivityHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = Some(policy);
        self
    }

    /// Replaces timeout and retry settings at once.
    pub fn with_config(mut self, config: ActivityConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &ActivityName {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    /// Executes the activity once. Never fails: every error becomes a failed
    /// [`ActivityResult`].
    pub async fn execute(&self, ctx: &ActivityContext) -> ActivityResult {
        let started = Instant::now();

        let mut result = match self.run_validated(ctx).await {
            Ok(result) => result,
            Err(error) => ActivityResult::failure(error.to_string()),
        };
        if !result.success && result.error.is_none() {
            result.error = Some(format!("Activity '{}' reported failure", self.name));
        }

        if result.success {
            debug!("Activity '{}' completed successfully", self.name);
        } else {
            warn!(
                "Activity '{}' failed: {}",
                self.name,
                result.error.as_deref().unwrap_or_default()
            );
        }

        self.notify(ctx, &result).await;

        result
            .metadata
            .insert(EXECUTION_TIME_KEY.to_string(), elapsed_ms(started));
        result
    }

    /// Executes the activity, retrying failures according to its
    /// [`RetryPolicy`]. Without a policy this is [`execute`](Self::execute).
    pub async fn execute_with_retry(&self, ctx: &ActivityContext) -> ActivityResult {
        let Some(policy) = &self.config.retry_policy else {
            return self.execute(ctx).await;
        };

        let started = Instant::now();
        let max_attempts = policy.max_attempts();
        let mut attempt = 1;

        loop {
            let mut result = self.execute(ctx).await;

            if result.success || attempt >= max_attempts {
                if !result.success {
                    warn!(
                        "Activity '{}' failed after {} attempts",
                        self.name, attempt
                    );
                    let last_error = result.error.take().unwrap_or_default();
                    result.error = Some(format!(
                        "Activity failed after {} attempts: {}",
                        attempt, last_error
                    ));
                }
                result
                    .metadata
                    .insert(ATTEMPTS_KEY.to_string(), Value::from(attempt));
                result
                    .metadata
                    .insert(EXECUTION_TIME_KEY.to_string(), elapsed_ms(started));
                return result;
            }

            let delay = policy.delay_after_attempt(attempt);
            info!(
                "Activity '{}' failed, retrying ({}/{}) in {:?}",
                self.name,
                attempt + 1,
                max_attempts,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn run_validated(&self, ctx: &ActivityContext) -> Result<ActivityResult, ActivityError> {
        if let Some(validator) = &self.input_validator {
            validator
                .validate(ctx.input())
                .map_err(ActivityError::InvalidInput)?;
        }

        let mut result = self.run_with_timeout(ctx).await?;

        if result.success {
            if let (Some(validator), Some(data)) = (&self.output_validator, &result.data) {
                if !data.is_null() {
                    if let Err(error) = validator.validate(data) {
                        result.success = false;
                        result.error = Some(ActivityError::InvalidOutput(error).to_string());
                    }
                }
            }
        }

        Ok(result)
    }

    /// Runs the handler on its own task so a timed-out run is detached rather
    /// than awaited.
    async fn run_with_timeout(&self, ctx: &ActivityContext) -> Result<ActivityResult, ActivityError> {
        let handler = Arc::clone(&self.handler);
        let mut owned = ctx.clone();
        let task = tokio::spawn(async move { handler.run(&mut owned).await });

        let joined = match self.config.timeout {
            Some(limit) => match timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Activity '{}' timed out after {:?}", self.name, limit);
                    return Err(ActivityError::Timeout {
                        millis: limit.as_millis(),
                    });
                }
            },
            None => task.await,
        };

        joined.map_err(|e| ActivityError::Panicked(e.to_string()))?
    }

    async fn notify(&self, ctx: &ActivityContext, result: &ActivityResult) {
        let Some(hooks) = &self.hooks else {
            return;
        };

        let (hook_type, outcome) = if result.success {
            (HookType::OnSuccess, hooks.on_success(ctx, result).await)
        } else {
            let error = result.error.as_deref().unwrap_or_default();
            (HookType::OnFailure, hooks.on_failure(ctx, error).await)
        };
        if let Err(e) = outcome {
            warn!("Error in {} handler of activity '{}': {}", hook_type, self.name, e);
        }

        if let Err(e) = hooks.on_complete(ctx, result).await {
            warn!(
                "Error in {} handler of activity '{}': {}",
                HookType::OnComplete,
                self.name,
                e
            );
        }
    }
}

fn elapsed_ms(started: Instant) -> Value {
    Value::from(started.elapsed().as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{JsonType, ObjectSchema};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn echo() -> Activity {
        Activity::from_fn("echo", |ctx: ActivityContext| async move {
            Ok(ActivityResult::ok(ctx.input().clone()))
        })
    }

    #[derive(Default)]
    struct RecordingHooks {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ActivityHooks for RecordingHooks {
        async fn on_success(
            &self,
            _ctx: &ActivityContext,
            _result: &ActivityResult,
        ) -> Result<(), ActivityError> {
            self.calls.lock().push("success");
            Ok(())
        }

        async fn on_failure(
            &self,
            _ctx: &ActivityContext,
            _error: &str,
        ) -> Result<(), ActivityError> {
            self.calls.lock().push("failure");
            Err(ActivityError::failed("hook errors are only logged"))
        }

        async fn on_complete(
            &self,
            _ctx: &ActivityContext,
            _result: &ActivityResult,
        ) -> Result<(), ActivityError> {
            self.calls.lock().push("complete");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_defaults_to_true() {
        let result = echo().execute(&ActivityContext::new(json!({"x": 1}))).await;
        assert!(result.success);
        assert_eq!(result.data, Some(json!({"x": 1})));
        assert!(result.error.is_none());
        assert!(result.execution_time_ms().is_some());
    }

    struct Scribble;

    #[async_trait]
    impl ActivityHandler for Scribble {
        async fn run(&self, ctx: &mut ActivityContext) -> Result<ActivityResult, ActivityError> {
            ctx.set_memory("scratch", json!(1))
                .await
                .map_err(|e| ActivityError::failed(e.to_string()))?;
            Ok(ActivityResult::ok(
                ctx.get_memory("scratch").cloned().unwrap_or(Value::Null),
            ))
        }
    }

    #[tokio::test]
    async fn test_handler_context_changes_stay_local() {
        let ctx = ActivityContext::new(json!(null));
        let result = Activity::new("scribble", Scribble).execute(&ctx).await;

        assert_eq!(result.data, Some(json!(1)));
        assert!(ctx.get_memory("scratch").is_none());
    }

    #[tokio::test]
    async fn test_run_error_becomes_failure() {
        let activity = Activity::from_fn("boom", |_ctx: ActivityContext| async move {
            Err::<ActivityResult, _>(ActivityError::failed("exploded"))
        });
        let result = activity.execute(&ActivityContext::new(json!(null))).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("exploded"));
        assert!(result.execution_time_ms().is_some());
    }

    #[tokio::test]
    async fn test_explicit_failure_without_error_gets_message() {
        let activity = Activity::from_fn("quiet", |_ctx: ActivityContext| async move {
            Ok(ActivityResult {
                success: false,
                ..ActivityResult::default()
            })
        });
        let result = activity.execute(&ActivityContext::new(json!(null))).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Activity 'quiet' reported failure")
        );
    }

    #[tokio::test]
    async fn test_input_validation_short_circuits_run() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let activity = Activity::from_fn("add", move |_ctx: ActivityContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ActivityResult::ok(json!({})))
            }
        })
        .with_input_validator(ObjectSchema::new().required("a", JsonType::Number));

        let result = activity.execute(&ActivityContext::new(json!({"b": 1}))).await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Input validation failed: a: is required")
        );
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_validation_converts_to_failure() {
        let activity = echo().with_output_validator(
            ObjectSchema::new().required("value", JsonType::Number),
        );

        let result = activity
            .execute(&ActivityContext::new(json!({"value": "five"})))
            .await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Output validation failed: value: expected number, got string")
        );

        let skipped = activity.execute(&ActivityContext::new(json!(null))).await;
        assert!(skipped.success);
    }

    #[tokio::test]
    async fn test_timeout_returns_quickly() {
        let activity = Activity::from_fn("slow", |_ctx: ActivityContext| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(ActivityResult::ok(json!("late")))
        })
        .with_timeout(Duration::from_millis(10));

        let started = Instant::now();
        let result = activity.execute(&ActivityContext::new(json!(null))).await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Activity timed out after 10ms")
        );
        assert!(started.elapsed() < Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let activity = Activity::from_fn("panics", |ctx: ActivityContext| async move {
            if ctx.input().is_null() {
                panic!("no input");
            }
            Ok(ActivityResult::default())
        });
        let result = activity.execute(&ActivityContext::new(json!(null))).await;
        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("Activity panicked"));
    }

    #[tokio::test]
    async fn test_hooks_fire_in_order() {
        let hooks = RecordingHooks::default();
        let calls = hooks.calls.clone();
        let activity = echo().with_hooks(hooks);

        activity.execute(&ActivityContext::new(json!(1))).await;
        assert_eq!(*calls.lock(), vec!["success", "complete"]);

        calls.lock().clear();
        let failing = Activity::from_fn("fails", |_ctx: ActivityContext| async move {
            Err::<ActivityResult, _>(ActivityError::failed("nope"))
        })
        .with_hooks(RecordingHooks {
            calls: calls.clone(),
        });
        let result = failing.execute(&ActivityContext::new(json!(1))).await;
        assert_eq!(*calls.lock(), vec!["failure", "complete"]);
        assert_eq!(result.error.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn test_metadata_is_merged() {
        let activity = Activity::from_fn("tagged", |_ctx: ActivityContext| async move {
            Ok(ActivityResult::ok(json!(1)).with_metadata("source", json!("cache")))
        });
        let result = activity.execute(&ActivityContext::new(json!(null))).await;
        assert_eq!(result.metadata.get("source"), Some(&json!("cache")));
        assert!(result.metadata.contains_key(EXECUTION_TIME_KEY));
    }

    fn flaky(runs: Arc<AtomicU32>, fail_until: u32) -> Activity {
        Activity::from_fn("flaky", move |_ctx: ActivityContext| {
            let runs = runs.clone();
            async move {
                let attempt = runs.fetch_add(1, Ordering::SeqCst);
                if attempt < fail_until {
                    Err(ActivityError::failed(format!("attempt {} failed", attempt + 1)))
                } else {
                    Ok(ActivityResult::ok(json!({"ok": true})))
                }
            }
        })
    }

    #[tokio::test]
    async fn test_retry_eventual_success() {
        let runs = Arc::new(AtomicU32::new(0));
        let activity = flaky(runs.clone(), 2)
            .with_retry(RetryPolicy::exponential(3, Duration::from_millis(10)));

        let result = activity
            .execute_with_retry(&ActivityContext::new(json!(null)))
            .await;

        assert!(result.success);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(result.metadata.get(ATTEMPTS_KEY), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let runs = Arc::new(AtomicU32::new(0));
        let activity = flaky(runs.clone(), 10)
            .with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)));

        let result = activity
            .execute_with_retry(&ActivityContext::new(json!(null)))
            .await;

        assert!(!result.success);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(
            result.error.as_deref(),
            Some("Activity failed after 3 attempts: attempt 3 failed")
        );
    }

    #[tokio::test]
    async fn test_without_policy_runs_once() {
        let runs = Arc::new(AtomicU32::new(0));
        let activity = flaky(runs.clone(), 1);

        let result = activity
            .execute_with_retry(&ActivityContext::new(json!(null)))
            .await;

        assert!(!result.success);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}

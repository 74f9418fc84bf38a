//! Step definitions: an activity plus the wiring that places it in a workflow.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use stepline_core::{Activity, ActivityError, Memory, ToolCallSuggestion};

/// Predicate deciding whether a step runs, given the session memory.
pub type Condition = Arc<dyn Fn(&Memory) -> bool + Send + Sync>;

/// Builds the activity input from the incoming step input and session memory.
pub type InputMapper = Arc<dyn Fn(&Value, &Memory) -> Result<Value, ActivityError> + Send + Sync>;

/// Evaluated against `(result data, step input, memory)` after a step.
pub type BranchPredicate = Arc<dyn Fn(&Value, &Value, &Memory) -> bool + Send + Sync>;

/// Builds suggestion parameters from `(result data, step input, memory)`.
pub type BranchParams = Arc<dyn Fn(&Value, &Value, &Memory) -> Value + Send + Sync>;

/// A conditional suggestion attached to a step.
///
/// When the predicate holds after the step has run, the workflow offers a
/// call to `call` ahead of the default "continue" suggestion.
///
/// # Examples
///
/// ```
/// use stepline::Branch;
/// use serde_json::json;
///
/// let branch = Branch::new("err_tool", |data, _input, _memory| data["error"] == true)
///     .with_params(|data, _input, _memory| json!({ "reason": data["reason"] }))
///     .with_description("Handle the error");
///
/// assert_eq!(branch.call(), "err_tool");
/// ```
#[derive(Clone)]
pub struct Branch {
    when: BranchPredicate,
    call: String,
    with: Option<BranchParams>,
    description: Option<String>,
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("call", &self.call)
            .field("description", &self.description)
            .finish()
    }
}

impl Branch {
    pub fn new<F>(call: impl Into<String>, when: F) -> Self
    where
        F: Fn(&Value, &Value, &Memory) -> bool + Send + Sync + 'static,
    {
        Self {
            when: Arc::new(when),
            call: call.into(),
            with: None,
            description: None,
        }
    }

    /// Sets the parameter builder. Without one, parameters are `{}`.
    pub fn with_params<F>(mut self, with: F) -> Self
    where
        F: Fn(&Value, &Value, &Memory) -> Value + Send + Sync + 'static,
    {
        self.with = Some(Arc::new(with));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Name of the tool this branch suggests.
    pub fn call(&self) -> &str {
        &self.call
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn matches(&self, data: &Value, input: &Value, memory: &Memory) -> bool {
        (self.when)(data, input, memory)
    }

    /// Builds the suggestion offered when this branch matches.
    pub fn to_suggestion(
        &self,
        data: &Value,
        input: &Value,
        memory: &Memory,
        priority: i32,
    ) -> ToolCallSuggestion {
        let parameters = match &self.with {
            Some(with) => with(data, input, memory),
            None => Value::Object(Map::new()),
        };
        let suggestion = ToolCallSuggestion::new(self.call.clone())
            .with_parameters(parameters)
            .with_priority(priority);
        match &self.description {
            Some(description) => suggestion.with_condition(description.clone()),
            None => suggestion,
        }
    }
}

/// One position in a workflow.
///
/// # Examples
///
/// ```
/// use stepline::{Step, ActivityContext, ActivityResult, Activity};
/// use serde_json::json;
///
/// let notify = Activity::from_fn("notify", |_ctx: ActivityContext| async move {
///     Ok(ActivityResult::ok(json!({ "sent": true })))
/// });
///
/// let step = Step::new(notify)
///     .optional()
///     .when(|memory| memory.contains_key("order"));
///
/// assert!(step.is_optional());
/// assert_eq!(step.activity().name().as_str(), "notify");
/// ```
#[derive(Clone)]
pub struct Step {
    activity: Activity,
    optional: bool,
    condition: Option<Condition>,
    input_mapper: Option<InputMapper>,
    branches: Vec<Branch>,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("activity", &self.activity.name())
            .field("optional", &self.optional)
            .field("has_condition", &self.condition.is_some())
            .field("has_input_mapper", &self.input_mapper.is_some())
            .field("branches", &self.branches)
            .finish()
    }
}

impl From<Activity> for Step {
    fn from(activity: Activity) -> Self {
        Self::new(activity)
    }
}

impl Step {
    /// A required, unconditional step passing its input through unchanged.
    pub fn new(activity: Activity) -> Self {
        Self {
            activity,
            optional: false,
            condition: None,
            input_mapper: None,
            branches: Vec::new(),
        }
    }

    /// Marks the step optional: its failure does not fail the workflow.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Runs the step only when `condition` holds; otherwise it is skipped.
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Memory) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Derives the activity input from the step input and memory.
    pub fn map_input<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&Value, &Memory) -> Result<Value, ActivityError> + Send + Sync + 'static,
    {
        self.input_mapper = Some(Arc::new(mapper));
        self
    }

    pub fn branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub(crate) fn should_run(&self, memory: &Memory) -> bool {
        self.condition.as_ref().map_or(true, |condition| condition(memory))
    }

    pub(crate) fn activity_input(
        &self,
        input: &Value,
        memory: &Memory,
    ) -> Result<Value, ActivityError> {
        match &self.input_mapper {
            Some(mapper) => mapper(input, memory),
            None => Ok(input.clone()),
        }
    }
}

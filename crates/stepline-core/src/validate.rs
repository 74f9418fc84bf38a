//! Input/output validation capability consumed by activities.

use crate::error::{FieldIssue, ValidationError};
use serde_json::Value;
use std::fmt;

/// Checks a JSON value against a schema.
///
/// Schemas are opaque to the engine. Any closure taking `&Value` and
/// returning `Result<(), ValidationError>` is a validator.
///
/// # Examples
///
/// ```
/// use stepline_core::{ValidationError, Validator};
/// use serde_json::{json, Value};
///
/// let positive = |value: &Value| match value.as_i64() {
///     Some(n) if n > 0 => Ok(()),
///     _ => Err(ValidationError::message("expected a positive integer")),
/// };
///
/// assert!(positive.validate(&json!(3)).is_ok());
/// assert!(positive.validate(&json!(-1)).is_err());
/// ```
pub trait Validator: Send + Sync {
    /// Returns an error describing every mismatch.
    fn validate(&self, value: &Value) -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        self(value)
    }
}

/// JSON value kinds understood by [`ObjectSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Bool,
    Number,
    Integer,
    String,
    Array,
    Object,
    Any,
}

impl JsonType {
    fn matches(self, value: &Value) -> bool {
        match self {
            JsonType::Null => value.is_null(),
            JsonType::Bool => value.is_boolean(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => value.is_i64() || value.is_u64(),
            JsonType::String => value.is_string(),
            JsonType::Array => value.is_array(),
            JsonType::Object => value.is_object(),
            JsonType::Any => true,
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonType::Null => "null",
            JsonType::Bool => "boolean",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
            JsonType::Any => "any",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
struct FieldRule {
    name: String,
    kind: JsonType,
    required: bool,
}

/// A minimal object-shape validator: named fields with JSON type checks.
///
/// # Examples
///
/// ```
/// use stepline_core::{JsonType, ObjectSchema, Validator};
/// use serde_json::json;
///
/// let schema = ObjectSchema::new()
///     .required("a", JsonType::Number)
///     .required("b", JsonType::Number)
///     .optional("label", JsonType::String);
///
/// assert!(schema.validate(&json!({"a": 2, "b": 3})).is_ok());
///
/// let error = schema.validate(&json!({"a": "2"})).unwrap_err();
/// assert_eq!(error.to_string(), "a: expected number, got string; b: is required");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<FieldRule>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field that must be present with the given type.
    pub fn required(mut self, name: impl Into<String>, kind: JsonType) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Adds a field that, when present, must have the given type.
    pub fn optional(mut self, name: impl Into<String>, kind: JsonType) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }
}

fn kind_of(value: &Value) -> JsonType {
    match value {
        Value::Null => JsonType::Null,
        Value::Bool(_) => JsonType::Bool,
        Value::Number(_) => JsonType::Number,
        Value::String(_) => JsonType::String,
        Value::Array(_) => JsonType::Array,
        Value::Object(_) => JsonType::Object,
    }
}

impl Validator for ObjectSchema {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let object = value.as_object().ok_or_else(|| {
            ValidationError::message(format!("expected object, got {}", kind_of(value)))
        })?;

        let issues: Vec<FieldIssue> = self
            .fields
            .iter()
            .filter_map(|rule| match object.get(&rule.name) {
                None if rule.required => Some(FieldIssue::new(&rule.name, "is required")),
                None => None,
                Some(field) if !rule.kind.matches(field) => Some(FieldIssue::new(
                    &rule.name,
                    format!("expected {}, got {}", rule.kind, kind_of(field)),
                )),
                Some(_) => None,
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_non_object() {
        let schema = ObjectSchema::new().required("a", JsonType::Number);
        let error = schema.validate(&json!([1, 2])).unwrap_err();
        assert_eq!(error.to_string(), "expected object, got array");
    }

    #[test]
    fn test_optional_field_type_is_checked() {
        let schema = ObjectSchema::new().optional("tag", JsonType::String);
        assert!(schema.validate(&json!({})).is_ok());
        let error = schema.validate(&json!({"tag": 1})).unwrap_err();
        assert_eq!(error.issues, vec![FieldIssue::new("tag", "expected string, got number")]);
    }

    #[test]
    fn test_integer_rejects_float() {
        let schema = ObjectSchema::new().required("n", JsonType::Integer);
        assert!(schema.validate(&json!({"n": 4})).is_ok());
        assert!(schema.validate(&json!({"n": 4.5})).is_err());
    }
}

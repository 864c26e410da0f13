//! Invocation and entity types for the event log.

use rewind_core::{EntityId, Timestamp, Value};
use serde::{Deserialize, Serialize};

/// Error thrown out of an invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Arbitrary value attached as the error's cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Value>,
}

impl InvocationError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            cause: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: Value) -> Self {
        self.cause = Some(cause);
        self
    }
}

impl std::fmt::Display for InvocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// One recorded execution of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub args: Vec<Value>,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
}

impl Invocation {
    pub fn new(args: Vec<Value>, timestamp: Timestamp) -> Self {
        Self {
            args,
            timestamp,
            output: None,
            error: None,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: InvocationError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Arguments as a single array value (the unit the linker pools)
    pub fn args_value(&self) -> Value {
        Value::Array(self.args.clone())
    }
}

/// A function or call-site together with its invocations, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEntity {
    pub id: EntityId,
    pub invocations: Vec<Invocation>,
}

impl CapturedEntity {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            invocations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_invocations(mut self, invocations: Vec<Invocation>) -> Self {
        self.invocations = invocations;
        self
    }

    /// Most recent activity: the largest invocation timestamp
    pub fn recency(&self) -> Option<Timestamp> {
        self.invocations.iter().map(|inv| inv.timestamp).max()
    }

    pub fn last_mut(&mut self) -> Option<&mut Invocation> {
        self.invocations.last_mut()
    }

    pub fn has_error(&self) -> bool {
        self.invocations.iter().any(Invocation::has_error)
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str) -> CapturedEntity {
        CapturedEntity::new(EntityId::new(id).unwrap())
    }

    #[test]
    fn test_invocation_builders() {
        let inv = Invocation::new(vec![Value::from(1)], Timestamp::from_raw(3))
            .with_output(Value::from("ok"));
        assert_eq!(inv.output, Some(Value::from("ok")));
        assert!(!inv.has_error());

        let inv = inv.with_error(InvocationError::new("TypeError", "boom"));
        assert!(inv.has_error());
    }

    #[test]
    fn test_recency_is_max_timestamp() {
        let e = entity("a.ts::f").with_invocations(vec![
            Invocation::new(vec![], Timestamp::from_raw(5)),
            Invocation::new(vec![], Timestamp::from_raw(9)),
            Invocation::new(vec![], Timestamp::from_raw(7)),
        ]);
        assert_eq!(e.recency(), Some(Timestamp::from_raw(9)));
        assert_eq!(entity("b.ts::g").recency(), None);
    }

    #[test]
    fn test_invocation_json_omits_absent_fields() {
        let inv = Invocation::new(vec![Value::from(true)], Timestamp::from_raw(1));
        let json = serde_json::to_string(&inv).unwrap();
        assert!(!json.contains("output"));
        assert!(!json.contains("error"));

        let back: Invocation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inv);
    }

    #[test]
    fn test_error_display() {
        let err = InvocationError::new("RangeError", "index 4 out of bounds").with_stack("at f");
        assert_eq!(err.to_string(), "RangeError: index 4 out of bounds");
    }
}

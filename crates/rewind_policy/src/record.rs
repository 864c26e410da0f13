//! Recording live host values into a capture session.
//!
//! Host graphs are sanitized on entry, so the event log only ever holds
//! trees that serialize.

use crate::host::HostValue;
use crate::sanitize::Sanitizer;
use rewind_core::{EntityId, EntityKind, Timestamp, Value};
use rewind_log::{CaptureSession, InvocationError, LogError};

/// Convert a thrown host value into an invocation error
pub fn host_error(thrown: &HostValue, sanitizer: &mut Sanitizer) -> InvocationError {
    match thrown {
        HostValue::Error {
            name,
            message,
            stack,
        } => {
            let err = InvocationError::new(name.clone(), message.clone());
            match stack {
                Some(stack) => err.with_stack(stack.clone()),
                None => err,
            }
        }
        HostValue::Object(_) | HostValue::Instance { .. } => {
            let text = |key: &str| match thrown.get(key) {
                Some(HostValue::String(s)) => Some(s),
                _ => None,
            };
            let mut err = InvocationError::new(
                text("name").unwrap_or_else(|| "Error".to_string()),
                text("message").unwrap_or_default(),
            );
            if let Some(stack) = text("stack") {
                err = err.with_stack(stack);
            }
            match thrown.get("cause") {
                Some(cause) => err.with_cause(sanitizer.sanitize(&cause)),
                None => err,
            }
        }
        HostValue::String(message) => InvocationError::new("Error", message.clone()),
        other => InvocationError::new("Error", format!("non-error value thrown ({})", other.type_name()))
            .with_cause(sanitizer.sanitize(other)),
    }
}

/// Recording entry points that take host values
pub trait RecordHost {
    /// Sanitize `args` and append an invocation stamped by the session clock
    fn record_host(&mut self, kind: EntityKind, id: EntityId, args: &[HostValue]) -> Timestamp;

    /// Sanitize `output` and attach it to the latest invocation
    ///
    /// # Errors
    ///
    /// Returns error if the id was never recorded
    fn attach_host_output(
        &mut self,
        kind: EntityKind,
        id: &EntityId,
        output: &HostValue,
    ) -> Result<(), LogError>;

    /// Convert `thrown` and attach it to the latest invocation
    ///
    /// # Errors
    ///
    /// Returns error if the id was never recorded
    fn attach_host_error(
        &mut self,
        kind: EntityKind,
        id: &EntityId,
        thrown: &HostValue,
    ) -> Result<(), LogError>;
}

impl RecordHost for CaptureSession {
    fn record_host(&mut self, kind: EntityKind, id: EntityId, args: &[HostValue]) -> Timestamp {
        let mut sanitizer = Sanitizer::new();
        let args: Vec<Value> = sanitizer.sanitize_all(args);
        let replaced = sanitizer.stats().total();
        if replaced > 0 {
            tracing::trace!(%id, replaced, "sanitized arguments");
        }
        self.record_now(kind, id, args)
    }

    fn attach_host_output(
        &mut self,
        kind: EntityKind,
        id: &EntityId,
        output: &HostValue,
    ) -> Result<(), LogError> {
        let output = Sanitizer::new().sanitize(output);
        self.attach_output(kind, id, output)
    }

    fn attach_host_error(
        &mut self,
        kind: EntityKind,
        id: &EntityId,
        thrown: &HostValue,
    ) -> Result<(), LogError> {
        let error = host_error(thrown, &mut Sanitizer::new());
        self.attach_error(kind, id, error)
    }
}

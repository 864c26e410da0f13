//! Sanitizer: turn a live host graph into a tree that is safe to serialize.
//!
//! Two concerns, both recursive walks with O(depth) auxiliary state:
//!
//! * Cycle removal. Each descent carries its own copy of the ancestor set, so
//!   a node is `CIRCULAR` only when it is its own ancestor on the current
//!   path. A node shared along two disjoint paths (a diamond) is visited, and
//!   captured, once per path. Wide diamond fan-out therefore costs repeated
//!   work, never a wrong result.
//! * Replacement. Anything outside plain containers, primitives and the
//!   allow-listed built-ins becomes a sentinel.
//!
//! Containers nested deeper than [`MAX_DEPTH`] become `UNSERIALIZABLE`,
//! which also bounds the walk's stack use.
//!
//! [`repair_invocation`] is the last line of defense for values that are
//! already trees but still fail the serialize probe.

use crate::host::HostValue;
use chrono::{DateTime, SecondsFormat};
use rewind_core::{BuiltInKind, SentinelKind, Value};
use rewind_log::{Invocation, probe};
use std::collections::{BTreeMap, HashSet};

/// Deepest container nesting kept; the JSON decoder rejects much more anyway
pub const MAX_DEPTH: usize = 128;

/// Sentinels produced by a sanitizer, by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeStats {
    counts: BTreeMap<SentinelKind, usize>,
}

impl SanitizeStats {
    /// Count for one kind
    #[must_use]
    pub fn count(&self, kind: SentinelKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Total sentinels produced
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    fn bump(&mut self, kind: SentinelKind) {
        *self.counts.entry(kind).or_default() += 1;
    }
}

/// Ancestors of the node being visited, on the current path only
#[derive(Debug, Clone, Default)]
struct PathGuard {
    ancestors: HashSet<usize>,
    depth: usize,
}

impl PathGuard {
    fn is_ancestor(&self, value: &HostValue) -> bool {
        value
            .identity()
            .is_some_and(|id| self.ancestors.contains(&id))
    }

    /// Guard for the children of `value`
    fn descend(&self, value: &HostValue) -> PathGuard {
        let mut next = self.clone();
        if let Some(id) = value.identity() {
            next.ancestors.insert(id);
        }
        next.depth += 1;
        next
    }
}

/// Converts host graphs into capture-safe value trees
#[derive(Debug, Default)]
pub struct Sanitizer {
    stats: SanitizeStats,
}

impl Sanitizer {
    /// Create a sanitizer with empty stats
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats accumulated so far
    #[must_use]
    pub fn stats(&self) -> &SanitizeStats {
        &self.stats
    }

    /// Sanitize one host value
    pub fn sanitize(&mut self, value: &HostValue) -> Value {
        self.walk(value, &PathGuard::default())
    }

    /// Sanitize an argument list
    pub fn sanitize_all(&mut self, values: &[HostValue]) -> Vec<Value> {
        values.iter().map(|v| self.sanitize(v)).collect()
    }

    fn sentinel(&mut self, kind: SentinelKind) -> Value {
        self.stats.bump(kind);
        Value::Sentinel(kind)
    }

    fn walk(&mut self, value: &HostValue, guard: &PathGuard) -> Value {
        if guard.is_ancestor(value) {
            return self.sentinel(SentinelKind::Circular);
        }
        if guard.depth >= MAX_DEPTH && value.identity().is_some() {
            tracing::debug!(depth = guard.depth, "value nested too deeply, truncating");
            return self.sentinel(SentinelKind::Unserializable);
        }

        match value {
            HostValue::Undefined => self.sentinel(SentinelKind::Undefined),
            HostValue::Null => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Number(n) => Value::Number(*n),
            HostValue::String(s) => Value::String(s.clone()),
            HostValue::BigInt(_) | HostValue::Symbol(_) | HostValue::Opaque { .. } => {
                self.sentinel(SentinelKind::Unserializable)
            }
            HostValue::Function { .. } => self.sentinel(SentinelKind::Function),
            HostValue::Instance { .. } => self.sentinel(SentinelKind::Class),
            HostValue::Array(items) => {
                let inner = guard.descend(value);
                let items = items.borrow();
                Value::Array(items.iter().map(|v| self.walk(v, &inner)).collect())
            }
            HostValue::Object(map) => {
                let inner = guard.descend(value);
                let map = map.borrow();
                Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), self.walk(v, &inner)))
                        .collect(),
                )
            }
            HostValue::Date(ms) => match date_string(*ms) {
                Some(iso) => Value::built_in(BuiltInKind::Date, Value::String(iso)),
                None => self.sentinel(SentinelKind::Unserializable),
            },
            HostValue::Regex { source, flags } => Value::built_in(
                BuiltInKind::Regex,
                Value::object([
                    ("source", Value::from(source.as_str())),
                    ("flags", Value::from(flags.as_str())),
                ]),
            ),
            HostValue::Url(href) => Value::built_in(BuiltInKind::Url, Value::from(href.as_str())),
            HostValue::Error {
                name,
                message,
                stack,
            } => Value::built_in(
                BuiltInKind::Error,
                Value::object([
                    ("name", Value::from(name.as_str())),
                    ("message", Value::from(message.as_str())),
                    (
                        "stack",
                        stack.as_deref().map_or(Value::Null, Value::from),
                    ),
                ]),
            ),
            HostValue::Map(entries) => {
                let inner = guard.descend(value);
                let entries = entries.borrow();
                let pairs = entries
                    .iter()
                    .map(|(k, v)| Value::Array(vec![self.walk(k, &inner), self.walk(v, &inner)]))
                    .collect();
                Value::built_in(BuiltInKind::Map, Value::Array(pairs))
            }
            HostValue::Set(members) => {
                let inner = guard.descend(value);
                let members = members.borrow();
                let members = members.iter().map(|v| self.walk(v, &inner)).collect();
                Value::built_in(BuiltInKind::Set, Value::Array(members))
            }
        }
    }
}

/// Sanitize a single host value with a throwaway sanitizer
#[must_use]
pub fn sanitize(value: &HostValue) -> Value {
    Sanitizer::new().sanitize(value)
}

fn date_string(ms: f64) -> Option<String> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(ms as i64).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Replace whatever in `invocation` fails the serialize probe.
///
/// Args are repaired element-wise, the output wholesale, the error
/// field-wise. Returns the number of replacements made; a non-zero result
/// never fails the capture.
pub fn repair_invocation(invocation: &mut Invocation) -> usize {
    let mut replaced = 0;

    for arg in &mut invocation.args {
        if !probe(arg) {
            *arg = Value::Sentinel(SentinelKind::Unserializable);
            replaced += 1;
        }
    }

    if let Some(output) = &mut invocation.output {
        if !probe(output) {
            *output = Value::Sentinel(SentinelKind::Unserializable);
            replaced += 1;
        }
    }

    if let Some(cause) = invocation.error.as_mut().and_then(|e| e.cause.as_mut()) {
        if !probe(cause) {
            *cause = Value::Sentinel(SentinelKind::Unserializable);
            replaced += 1;
        }
    }

    if replaced > 0 {
        tracing::debug!(replaced, timestamp = %invocation.timestamp, "replaced values failing the serialize probe");
    }
    replaced
}

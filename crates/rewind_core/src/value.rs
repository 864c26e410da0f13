//! Captured value trees.
//!
//! A [`Value`] is the serializable form of anything that flowed through an
//! instrumented function: arguments, return values, error causes. Values are
//! trees. Cycles and constructs with no faithful serialized form have already
//! been replaced by a [`Sentinel`](Value::Sentinel) by the time a `Value` exists.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder kinds standing in for values that cannot be captured verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentinelKind {
    /// Value has no serializable representation
    Unserializable,
    /// A function or closure
    Function,
    /// Back-reference to an ancestor on the current path
    Circular,
    /// Instance of a user-defined class
    Class,
    /// The host's `undefined`
    Undefined,
}

impl SentinelKind {
    /// All sentinel kinds, in declaration order
    pub const ALL: [SentinelKind; 5] = [
        Self::Unserializable,
        Self::Function,
        Self::Circular,
        Self::Class,
        Self::Undefined,
    ];

    /// Wire marker for this kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unserializable => "UNSERIALIZABLE",
            Self::Function => "FUNCTION",
            Self::Circular => "CIRCULAR",
            Self::Class => "CLASS",
            Self::Undefined => "UNDEFINED",
        }
    }
}

impl fmt::Display for SentinelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow-listed built-in object kinds that survive sanitization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuiltInKind {
    /// Date, payload is an RFC 3339 string
    Date,
    /// Map, payload is an array of `[key, value]` pairs
    Map,
    /// Set, payload is an array of members
    Set,
    /// Regular expression, payload is `{source, flags}`
    Regex,
    /// URL, payload is the serialized href
    Url,
    /// Error object, payload is `{name, message, stack}`
    Error,
}

impl BuiltInKind {
    /// Name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Map => "map",
            Self::Set => "set",
            Self::Regex => "regex",
            Self::Url => "url",
            Self::Error => "error",
        }
    }
}

/// A captured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Bool(bool),
    /// Number (host numbers are IEEE doubles)
    Number(f64),
    /// String
    String(String),
    /// Plain array
    Array(Vec<Value>),
    /// Plain object. Equality ignores key order.
    Object(IndexMap<String, Value>),
    /// Placeholder for a value that was not captured verbatim
    Sentinel(SentinelKind),
    /// Allow-listed built-in
    BuiltIn {
        /// Which built-in
        kind: BuiltInKind,
        /// Structured payload
        payload: Box<Value>,
    },
}

impl Value {
    /// Sentinel value of the given kind
    #[must_use]
    pub const fn sentinel(kind: SentinelKind) -> Self {
        Self::Sentinel(kind)
    }

    /// Built-in value with the given payload
    #[must_use]
    pub fn built_in(kind: BuiltInKind, payload: Value) -> Self {
        Self::BuiltIn {
            kind,
            payload: Box::new(payload),
        }
    }

    /// Object from key/value pairs, preserving order
    #[must_use]
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Array from values
    #[must_use]
    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Self::Array(items.into_iter().collect())
    }

    /// Check for `null` or the `undefined` sentinel
    #[must_use]
    pub const fn is_nullish(&self) -> bool {
        matches!(self, Self::Null | Self::Sentinel(SentinelKind::Undefined))
    }

    /// Get the sentinel kind, if this is a sentinel
    #[must_use]
    pub const fn as_sentinel(&self) -> Option<SentinelKind> {
        match self {
            Self::Sentinel(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Borrow as array elements
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as object entries
    #[must_use]
    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Short type name used in diagnostics
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Sentinel(_) => "sentinel",
            Self::BuiltIn { kind, .. } => kind.as_str(),
        }
    }

    /// Count sentinels anywhere in the tree
    #[must_use]
    pub fn sentinel_count(&self) -> usize {
        match self {
            Self::Sentinel(_) => 1,
            Self::Array(items) => items.iter().map(Self::sentinel_count).sum(),
            Self::Object(map) => map.values().map(Self::sentinel_count).sum(),
            Self::BuiltIn { payload, .. } => payload.sentinel_count(),
            _ => 0,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<SentinelKind> for Value {
    fn from(kind: SentinelKind) -> Self {
        Self::Sentinel(kind)
    }
}

/// Plain JSON maps onto the null/bool/number/string/array/object subset
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_equality_ignores_key_order() {
        let a = Value::object([("x", Value::from(1)), ("y", Value::from(2))]);
        let b = Value::object([("y", Value::from(2)), ("x", Value::from(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_array_equality_is_ordered() {
        let a = Value::array([Value::from(1), Value::from(2)]);
        let b = Value::array([Value::from(2), Value::from(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sentinel_wire_name() {
        let json = serde_json::to_string(&Value::sentinel(SentinelKind::Circular)).unwrap();
        assert_eq!(json, r#"{"sentinel":"CIRCULAR"}"#);
        assert_eq!(SentinelKind::Unserializable.to_string(), "UNSERIALIZABLE");
    }

    #[test]
    fn test_from_json() {
        let v = Value::from(serde_json::json!({"a": [1, "two", null], "b": true}));
        let expected = Value::object([
            (
                "a",
                Value::array([Value::from(1), Value::from("two"), Value::Null]),
            ),
            ("b", Value::from(true)),
        ]);
        assert_eq!(v, expected);
    }

    #[test]
    fn test_nullish() {
        assert!(Value::Null.is_nullish());
        assert!(Value::sentinel(SentinelKind::Undefined).is_nullish());
        assert!(!Value::sentinel(SentinelKind::Function).is_nullish());
        assert!(!Value::from(0).is_nullish());
    }

    #[test]
    fn test_sentinel_count() {
        let v = Value::object([
            ("f", Value::sentinel(SentinelKind::Function)),
            (
                "nested",
                Value::array([Value::sentinel(SentinelKind::Circular), Value::from(1)]),
            ),
        ]);
        assert_eq!(v.sentinel_count(), 2);
    }

    #[test]
    fn test_built_in_roundtrip() {
        let v = Value::built_in(BuiltInKind::Date, Value::from("2024-01-01T00:00:00Z"));
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
        assert_eq!(v.type_name(), "date");
    }
}

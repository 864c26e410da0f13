//! Replay merge: overlay a captured value onto the value seen live.
//!
//! Sentinels and nulls in the capture are holes filled from the live value.
//! Containers are walked in lockstep. Everything else comes from the
//! capture, since it was recorded faithfully.

use chrono::DateTime;
use indexmap::IndexMap;
use rewind_core::{BuiltInKind, Value};
use rewind_policy::HostValue;

/// Merge errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// Live value no longer has the captured shape
    #[error("shape mismatch at {path:?}: captured {expected}, live {found}")]
    ShapeMismatch {
        /// Pointer-style path to the node, `""` for the root
        path: String,
        /// Shape in the capture
        expected: &'static str,
        /// Type of the live value
        found: String,
    },
}

impl From<MergeError> for rewind_core::CoreError {
    fn from(err: MergeError) -> Self {
        rewind_core::CoreError::Data {
            reason: err.to_string(),
        }
    }
}

/// A value observed during replay that captured data can be merged into
pub trait LiveValue: Clone {
    /// The host's `undefined`
    fn undefined() -> Self;

    /// Live form of a captured value that is not a hole
    fn from_captured(value: &Value) -> Self;

    /// Build an array
    fn from_elements(items: Vec<Self>) -> Self;

    /// Build an object
    fn from_fields(fields: IndexMap<String, Self>) -> Self;

    /// Elements, if array-shaped
    fn elements(&self) -> Option<Vec<Self>>;

    /// Whether this value is object-shaped
    fn is_object(&self) -> bool;

    /// Field by key; `None` when absent or not object-shaped
    fn field(&self, key: &str) -> Option<Self>;

    /// Type name for diagnostics
    fn kind_name(&self) -> &'static str;
}

/// Overlay `captured` onto `live`
///
/// # Errors
///
/// Returns [`MergeError::ShapeMismatch`] if a captured array or object meets
/// a live value of another shape
pub fn merge<L: LiveValue>(captured: &Value, live: &L) -> Result<L, MergeError> {
    merge_at(captured, live, &mut String::new())
}

/// Merge a captured argument list against the live arguments
///
/// # Errors
///
/// Returns error if any argument's shape no longer matches
pub fn merge_args<L: LiveValue>(captured: &[Value], live: &[L]) -> Result<Vec<L>, MergeError> {
    let mut path = String::new();
    let mut merged = Vec::with_capacity(captured.len().max(live.len()));
    for (i, value) in captured.iter().enumerate() {
        let live = live.get(i).cloned().unwrap_or_else(L::undefined);
        merged.push(descend(&mut path, &i.to_string(), |path| {
            merge_at(value, &live, path)
        })?);
    }
    // Extra live arguments pass through
    merged.extend(live.iter().skip(captured.len()).cloned());
    Ok(merged)
}

fn descend<T>(path: &mut String, segment: &str, f: impl FnOnce(&mut String) -> T) -> T {
    let len = path.len();
    path.push('/');
    path.push_str(segment);
    let out = f(path);
    path.truncate(len);
    out
}

fn merge_at<L: LiveValue>(captured: &Value, live: &L, path: &mut String) -> Result<L, MergeError> {
    match captured {
        Value::Sentinel(_) | Value::Null => Ok(live.clone()),
        Value::Array(items) => {
            let Some(live_items) = live.elements() else {
                return Err(MergeError::ShapeMismatch {
                    path: path.clone(),
                    expected: "array",
                    found: live.kind_name().to_string(),
                });
            };
            let merged = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let live = live_items.get(i).cloned().unwrap_or_else(L::undefined);
                    descend(path, &i.to_string(), |path| merge_at(item, &live, path))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(L::from_elements(merged))
        }
        Value::Object(fields) => {
            if !live.is_object() {
                return Err(MergeError::ShapeMismatch {
                    path: path.clone(),
                    expected: "object",
                    found: live.kind_name().to_string(),
                });
            }
            let mut merged = IndexMap::with_capacity(fields.len());
            for (key, value) in fields {
                let live = live.field(key).unwrap_or_else(L::undefined);
                let value = descend(path, key, |path| merge_at(value, &live, path))?;
                merged.insert(key.clone(), value);
            }
            Ok(L::from_fields(merged))
        }
        Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::BuiltIn { .. } => {
            Ok(L::from_captured(captured))
        }
    }
}

impl LiveValue for Value {
    fn undefined() -> Self {
        Value::Sentinel(rewind_core::SentinelKind::Undefined)
    }

    fn from_captured(value: &Value) -> Self {
        value.clone()
    }

    fn from_elements(items: Vec<Self>) -> Self {
        Value::Array(items)
    }

    fn from_fields(fields: IndexMap<String, Self>) -> Self {
        Value::Object(fields)
    }

    fn elements(&self) -> Option<Vec<Self>> {
        self.as_array().map(<[Value]>::to_vec)
    }

    fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    fn field(&self, key: &str) -> Option<Self> {
        self.as_object()?.get(key).cloned()
    }

    fn kind_name(&self) -> &'static str {
        self.type_name()
    }
}

impl LiveValue for HostValue {
    fn undefined() -> Self {
        HostValue::Undefined
    }

    fn from_captured(value: &Value) -> Self {
        to_host(value)
    }

    fn from_elements(items: Vec<Self>) -> Self {
        HostValue::array(items)
    }

    fn from_fields(fields: IndexMap<String, Self>) -> Self {
        HostValue::object(fields)
    }

    fn elements(&self) -> Option<Vec<Self>> {
        match self {
            HostValue::Array(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }

    fn is_object(&self) -> bool {
        matches!(self, HostValue::Object(_) | HostValue::Instance { .. })
    }

    fn field(&self, key: &str) -> Option<Self> {
        self.get(key)
    }

    fn kind_name(&self) -> &'static str {
        self.type_name()
    }
}

/// Rebuild a host value from a captured one. Holes become `undefined`.
#[must_use]
pub fn to_host(value: &Value) -> HostValue {
    match value {
        Value::Null => HostValue::Null,
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Number(n) => HostValue::Number(*n),
        Value::String(s) => HostValue::String(s.clone()),
        Value::Array(items) => HostValue::array(items.iter().map(to_host).collect()),
        Value::Object(fields) => {
            HostValue::object(fields.iter().map(|(k, v)| (k.clone(), to_host(v))))
        }
        Value::Sentinel(_) => HostValue::Undefined,
        Value::BuiltIn { kind, payload } => built_in_to_host(*kind, payload),
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn built_in_to_host(kind: BuiltInKind, payload: &Value) -> HostValue {
    let field = |key: &str| payload.as_object().and_then(|o| o.get(key));
    let pairs = |payload: &Value| -> Vec<Value> { payload.as_array().map(<[Value]>::to_vec).unwrap_or_default() };
    match kind {
        BuiltInKind::Date => {
            let ms = match payload {
                Value::String(s) => DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.timestamp_millis() as f64)
                    .unwrap_or(f64::NAN),
                _ => f64::NAN,
            };
            HostValue::Date(ms)
        }
        BuiltInKind::Regex => HostValue::Regex {
            source: text(field("source")),
            flags: text(field("flags")),
        },
        BuiltInKind::Url => HostValue::Url(text(Some(payload))),
        BuiltInKind::Error => HostValue::Error {
            name: text(field("name")),
            message: text(field("message")),
            stack: match field("stack") {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            },
        },
        BuiltInKind::Map => HostValue::map(
            pairs(payload)
                .iter()
                .filter_map(|pair| match pair.as_array() {
                    Some([k, v]) => Some((to_host(k), to_host(v))),
                    _ => None,
                })
                .collect(),
        ),
        BuiltInKind::Set => HostValue::set(pairs(payload).iter().map(to_host).collect()),
    }
}

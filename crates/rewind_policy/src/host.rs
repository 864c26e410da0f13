//! Host-side value graph.
//!
//! [`HostValue`] models a live runtime value as the instrumented program sees
//! it: containers are shared (`Rc<RefCell<_>>`), so the same node can be
//! reachable along several paths and a node can contain itself.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable container handle
pub type HostRef<T> = Rc<RefCell<T>>;

/// A live runtime value
#[derive(Clone)]
pub enum HostValue {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(f64),
    /// String
    String(String),
    /// Arbitrary-precision integer
    BigInt(i128),
    /// Symbol with its description
    Symbol(String),
    /// Function or closure
    Function {
        /// Function name, empty for anonymous functions
        name: String,
    },
    /// Plain array
    Array(HostRef<Vec<HostValue>>),
    /// Plain object
    Object(HostRef<IndexMap<String, HostValue>>),
    /// Instance of a user-defined class
    Instance {
        /// Class name
        class: String,
        /// Own enumerable fields
        fields: HostRef<IndexMap<String, HostValue>>,
    },
    /// Date as epoch milliseconds; NaN for an invalid date
    Date(f64),
    /// Regular expression
    Regex {
        /// Pattern source
        source: String,
        /// Flags
        flags: String,
    },
    /// URL href
    Url(String),
    /// Error object
    Error {
        /// Error name
        name: String,
        /// Error message
        message: String,
        /// Stack trace
        stack: Option<String>,
    },
    /// Map with insertion-ordered entries
    Map(HostRef<Vec<(HostValue, HostValue)>>),
    /// Set with insertion-ordered members
    Set(HostRef<Vec<HostValue>>),
    /// Any other host object (promises, weak maps, DOM nodes, ...)
    Opaque {
        /// Host type name
        type_name: String,
    },
}

impl HostValue {
    /// String value
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Named function
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function { name: name.into() }
    }

    /// New array node
    #[must_use]
    pub fn array(items: Vec<HostValue>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    /// New object node
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        Self::Object(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// New class instance node
    pub fn instance<K, I>(class: impl Into<String>, fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        Self::Instance {
            class: class.into(),
            fields: Rc::new(RefCell::new(
                fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            )),
        }
    }

    /// New map node
    #[must_use]
    pub fn map(entries: Vec<(HostValue, HostValue)>) -> Self {
        Self::Map(Rc::new(RefCell::new(entries)))
    }

    /// New set node
    #[must_use]
    pub fn set(members: Vec<HostValue>) -> Self {
        Self::Set(Rc::new(RefCell::new(members)))
    }

    /// Node identity for containers; `None` for values without identity
    #[must_use]
    pub fn identity(&self) -> Option<usize> {
        match self {
            Self::Array(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Self::Object(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Self::Instance { fields, .. } => Some(Rc::as_ptr(fields) as *const () as usize),
            Self::Map(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Self::Set(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            _ => None,
        }
    }

    /// Whether both handles point at the same container
    #[must_use]
    pub fn same_ref(&self, other: &HostValue) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Append to an array node. Returns false for non-arrays.
    pub fn push(&self, value: HostValue) -> bool {
        match self {
            Self::Array(items) => {
                items.borrow_mut().push(value);
                true
            }
            _ => false,
        }
    }

    /// Set a field on an object or instance node. Returns false otherwise.
    pub fn insert(&self, key: impl Into<String>, value: HostValue) -> bool {
        match self {
            Self::Object(map) | Self::Instance { fields: map, .. } => {
                map.borrow_mut().insert(key.into(), value);
                true
            }
            _ => false,
        }
    }

    /// Read a field of an object or instance node
    #[must_use]
    pub fn get(&self, key: &str) -> Option<HostValue> {
        match self {
            Self::Object(map) | Self::Instance { fields: map, .. } => map.borrow().get(key).cloned(),
            _ => None,
        }
    }

    /// Read an element of an array node
    #[must_use]
    pub fn index(&self, i: usize) -> Option<HostValue> {
        match self {
            Self::Array(items) => items.borrow().get(i).cloned(),
            _ => None,
        }
    }

    /// Host `typeof`-style name used in diagnostics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::BigInt(_) => "bigint",
            Self::Symbol(_) => "symbol",
            Self::Function { .. } => "function",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Instance { .. } => "instance",
            Self::Date(_) => "date",
            Self::Regex { .. } => "regex",
            Self::Url(_) => "url",
            Self::Error { .. } => "error",
            Self::Map(_) => "map",
            Self::Set(_) => "set",
            Self::Opaque { .. } => "opaque",
        }
    }
}

// Shallow on purpose: graphs may be cyclic.
impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
            Self::BigInt(n) => write!(f, "{}n", n),
            Self::Symbol(s) => write!(f, "Symbol({})", s),
            Self::Function { name } => write!(f, "[Function {}]", name),
            Self::Array(items) => write!(f, "Array(len={})", items.borrow().len()),
            Self::Object(map) => write!(f, "Object(keys={})", map.borrow().len()),
            Self::Instance { class, .. } => write!(f, "{} {{..}}", class),
            Self::Date(ms) => write!(f, "Date({})", ms),
            Self::Regex { source, flags } => write!(f, "/{}/{}", source, flags),
            Self::Url(href) => write!(f, "URL({})", href),
            Self::Error { name, message, .. } => write!(f, "{}: {}", name, message),
            Self::Map(entries) => write!(f, "Map(size={})", entries.borrow().len()),
            Self::Set(members) => write!(f, "Set(size={})", members.borrow().len()),
            Self::Opaque { type_name } => write!(f, "[{}]", type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_shared_between_clones() {
        let obj = HostValue::object([("a", HostValue::Number(1.0))]);
        let alias = obj.clone();
        assert!(obj.same_ref(&alias));

        let other = HostValue::object([("a", HostValue::Number(1.0))]);
        assert!(!obj.same_ref(&other));
    }

    #[test]
    fn test_primitives_have_no_identity() {
        assert_eq!(HostValue::Number(1.0).identity(), None);
        assert!(!HostValue::Null.same_ref(&HostValue::Null));
    }

    #[test]
    fn test_mutation_through_alias() {
        let arr = HostValue::array(vec![]);
        let alias = arr.clone();
        assert!(alias.push(HostValue::Bool(true)));
        assert!(matches!(arr.index(0), Some(HostValue::Bool(true))));
        assert!(!HostValue::Null.push(HostValue::Null));
    }

    #[test]
    fn test_insert_and_get() {
        let inst = HostValue::instance("Cart", [("items", HostValue::array(vec![]))]);
        assert!(inst.insert("total", HostValue::Number(3.0)));
        assert!(matches!(inst.get("total"), Some(HostValue::Number(n)) if n == 3.0));
        assert!(inst.get("missing").is_none());
    }

    #[test]
    fn test_debug_on_cycle_terminates() {
        let obj = HostValue::object(Vec::<(String, HostValue)>::new());
        obj.insert("me", obj.clone());
        assert_eq!(format!("{:?}", obj), "Object(keys=1)");
    }
}

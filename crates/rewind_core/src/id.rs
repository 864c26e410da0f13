//! Identifiers for captured entities and captures.
//!
//! Entity ids are minted by the instrumentation pass and are opaque here,
//! except that they start with the source file path of the instrumented code:
//! `<file path>::<local name>`.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Separator between the file path prefix and the rest of an entity id
pub const FILE_SEPARATOR: &str = "::";

/// Stable identifier of an instrumented function or call-site
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create from a string
    ///
    /// # Errors
    ///
    /// Returns error if the id is empty
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::InvalidId {
                reason: "entity id is empty".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Get the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Source file path encoded in the id.
    ///
    /// Everything before the first `::`; the whole id when there is none.
    /// Paths never contain `::`, nested local names may.
    #[must_use]
    pub fn file(&self) -> &str {
        match self.0.find(FILE_SEPARATOR) {
            Some(pos) => &self.0[..pos],
            None => &self.0,
        }
    }

    /// Local part of the id (after the file prefix)
    #[must_use]
    pub fn local_name(&self) -> &str {
        match self.0.find(FILE_SEPARATOR) {
            Some(pos) => &self.0[pos + FILE_SEPARATOR.len()..],
            None => &self.0,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Flavor of captured entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// A function definition
    Function,
    /// A call expression
    Call,
}

impl EntityKind {
    /// Name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Call => "call",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture identifier - identifies one transmitted capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureId(Uuid);

impl CaptureId {
    /// Create a new random CaptureId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// File name used by on-disk caches
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl Default for CaptureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CaptureId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidId {
                reason: format!("invalid capture id {:?}: {}", s, e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_file_prefix() {
        let id = EntityId::new("src/cart/total.ts::computeTotal").unwrap();
        assert_eq!(id.file(), "src/cart/total.ts");
        assert_eq!(id.local_name(), "computeTotal");
    }

    #[test]
    fn test_entity_file_uses_first_separator() {
        let id = EntityId::new("src/a.ts::Cart::add").unwrap();
        assert_eq!(id.file(), "src/a.ts");
        assert_eq!(id.local_name(), "Cart::add");
    }

    #[test]
    fn test_entity_without_separator() {
        let id = EntityId::new("src/main.ts").unwrap();
        assert_eq!(id.file(), "src/main.ts");
    }

    #[test]
    fn test_entity_empty_rejected() {
        assert!(EntityId::new("").is_err());
    }

    #[test]
    fn test_capture_id_roundtrip() {
        let id = CaptureId::new();
        let parsed: CaptureId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(id.file_name().ends_with(".json"));
    }

    #[test]
    fn test_capture_id_invalid() {
        assert!("not-a-uuid".parse::<CaptureId>().is_err());
    }

    #[test]
    fn test_entity_kind_serde() {
        let json = serde_json::to_string(&EntityKind::Call).unwrap();
        assert_eq!(json, "\"call\"");
    }
}

//! The outbound capture.

use chrono::{DateTime, Utc};
use rewind_core::CaptureId;
use rewind_log::{CanonicalDecode, CanonicalEncode, EncodeError, InvocationError, LinkedEntity};
use serde::{Deserialize, Serialize};

/// What set off a capture
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureTrigger {
    /// The error that escaped
    pub error: InvocationError,
    /// Name override; defaults to `"<error name>: <message>"`
    pub name: Option<String>,
    /// End user the failure happened to
    pub user: Option<String>,
}

impl CaptureTrigger {
    /// Trigger for an error
    #[must_use]
    pub fn new(error: InvocationError) -> Self {
        Self {
            error,
            name: None,
            user: None,
        }
    }

    /// Override the capture name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attribute the capture to a user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Human-readable name, matched against ignore rules
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.error.to_string())
    }
}

/// An encrypted, linked capture ready for transport
///
/// `args`, `outputs`, `errors` and `error` are ciphertexts of the
/// JSON-encoded args pool, outputs pool, errors pool and triggering error.
/// The linked entities hold only ids, timestamps and pool indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    /// Capture id, also the cache key
    pub capture_id: CaptureId,
    /// Project the capture belongs to
    pub project_id: String,
    /// Build of the instrumented program
    pub build_id: String,
    /// End user the failure happened to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_user_id: Option<String>,
    /// Human-readable name
    pub name: String,
    /// Encrypted args pool
    pub args: String,
    /// Encrypted outputs pool
    pub outputs: String,
    /// Encrypted pool of errors thrown by invocations
    pub errors: String,
    /// Linked function entities
    pub functions: Vec<LinkedEntity>,
    /// Linked call-site entities
    pub calls: Vec<LinkedEntity>,
    /// Encrypted triggering error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the capture was built
    pub created_at: DateTime<Utc>,
}

impl Capture {
    /// Encode as JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, EncodeError> {
        self.encode_string()
    }

    /// Decode from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a capture
    pub fn from_json(text: &str) -> Result<Self, EncodeError> {
        Self::decode(text)
    }

    /// Linked invocations across both flavors
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.functions
            .iter()
            .chain(&self.calls)
            .map(|e| e.invocations.len())
            .sum()
    }
}

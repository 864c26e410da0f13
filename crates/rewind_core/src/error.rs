//! Core error types for REWIND.
//!
//! Every crate-level error converts into [`CoreError`] so hosts embedding the
//! engine only need to handle one type at the outermost boundary.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid encoding
    InvalidEncoding {
        /// What failed to encode or decode
        reason: String,
    },

    /// Invalid entity identifier
    InvalidId {
        /// Why the id was rejected
        reason: String,
    },

    /// Configuration could not be used
    Configuration {
        /// Offending setting
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Captured data is malformed
    Data {
        /// Why the data was rejected
        reason: String,
    },

    /// Key material or ciphertext was rejected
    Crypto {
        /// Why the operation failed
        reason: String,
    },

    /// Transmission or fetch failed
    Transport {
        /// Why the transport failed
        reason: String,
    },

    /// Not found
    NotFound {
        /// Kind of thing looked up
        kind: String,
        /// Identifier used
        id: String,
    },

    /// Internal state is inconsistent. Never caused by user input.
    Invariant {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Whether this error signals an internal inconsistency rather than bad input
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant { .. })
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding { reason } => write!(f, "Invalid encoding: {}", reason),
            Self::InvalidId { reason } => write!(f, "Invalid ID: {}", reason),
            Self::Configuration { field, reason } => {
                write!(f, "Invalid configuration for {}: {}", field, reason)
            }
            Self::Data { reason } => write!(f, "Invalid captured data: {}", reason),
            Self::Crypto { reason } => write!(f, "Crypto error: {}", reason),
            Self::Transport { reason } => write!(f, "Transport error: {}", reason),
            Self::NotFound { kind, id } => write!(f, "{} not found: {}", kind, id),
            Self::Invariant { message } => write!(f, "Invariant state: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::NotFound {
            kind: "Capture".to_string(),
            id: "cap_123".to_string(),
        };
        assert_eq!(format!("{}", err), "Capture not found: cap_123");
    }

    #[test]
    fn test_invariant_is_fatal() {
        let err = CoreError::Invariant {
            message: "pool miss".to_string(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().starts_with("Invariant state"));

        let err = CoreError::Data {
            reason: "bad index".to_string(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::InvalidEncoding { .. }));
    }
}

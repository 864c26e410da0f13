//! JSON encoding used for size accounting and the serialize probe.
//!
//! The byte length of a value's JSON encoding is the size every budget is
//! measured in, because that is what ends up (encrypted) on the wire.

use rewind_core::Value;
use serde::{Deserialize, Serialize};

/// Trait for the wire encoding
pub trait CanonicalEncode: Serialize {
    /// Encode to JSON bytes
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized
    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(self).map_err(|e| EncodeError::Serialize {
            reason: e.to_string(),
        })
    }

    /// Encode to a JSON string
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized
    fn encode_string(&self) -> Result<String, EncodeError> {
        serde_json::to_string(self).map_err(|e| EncodeError::Serialize {
            reason: e.to_string(),
        })
    }

    /// Get encoded length, `usize::MAX` if the value cannot be encoded
    fn encoded_len(&self) -> usize {
        self.encode().map(|v| v.len()).unwrap_or(usize::MAX)
    }
}

impl<T: Serialize + ?Sized> CanonicalEncode for T {}

/// Trait for decoding the wire encoding
pub trait CanonicalDecode: for<'de> Deserialize<'de> {
    /// Decode from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid encoding of `Self`
    fn decode(data: &str) -> Result<Self, EncodeError>
    where
        Self: Sized,
    {
        serde_json::from_str(data).map_err(|e| EncodeError::Deserialize {
            reason: e.to_string(),
        })
    }
}

impl<T: for<'de> Deserialize<'de>> CanonicalDecode for T {}

/// Encoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Value could not be serialized
    #[error("serialize failed: {reason}")]
    Serialize {
        /// Serializer message
        reason: String,
    },
    /// Text could not be deserialized
    #[error("deserialize failed: {reason}")]
    Deserialize {
        /// Deserializer message
        reason: String,
    },
}

impl From<EncodeError> for rewind_core::CoreError {
    fn from(err: EncodeError) -> Self {
        rewind_core::CoreError::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}

/// Serialize probe: does `value` survive an encode/decode round trip intact?
///
/// Non-finite numbers (encoded as `null`) and trees nested deeper than the
/// decoder's recursion limit fail.
#[must_use]
pub fn probe(value: &Value) -> bool {
    let Ok(text) = value.encode_string() else {
        return false;
    };
    match Value::decode(&text) {
        Ok(decoded) => decoded == *value,
        Err(_) => false,
    }
}

//! Codec errors.

use rewind_core::CoreError;

/// Errors from key handling and the capture codec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Key string does not start with the expected prefix
    #[error("key must start with {expected:?}")]
    MissingPrefix {
        /// Expected prefix
        expected: &'static str,
    },
    /// Key or ciphertext chunk is not valid base64
    #[error("invalid base64 in {what}")]
    InvalidBase64 {
        /// What was being decoded
        what: &'static str,
    },
    /// Key bytes could not be imported or exported
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Import failure
        reason: String,
    },
    /// RSA encryption of a chunk failed
    #[error("encryption failed: {reason}")]
    Encryption {
        /// Library message
        reason: String,
    },
    /// RSA decryption of a chunk failed (wrong key or corrupt ciphertext)
    #[error("decryption failed at chunk {chunk}")]
    Decryption {
        /// Zero-based chunk index
        chunk: usize,
    },
    /// Decrypted bytes are not UTF-8
    #[error("decrypted plaintext is not valid UTF-8")]
    InvalidUtf8,
    /// Key pair generation failed
    #[error("key generation failed: {reason}")]
    KeyGeneration {
        /// Library message
        reason: String,
    },
}

impl From<CryptoError> for CoreError {
    fn from(err: CryptoError) -> Self {
        CoreError::Crypto {
            reason: err.to_string(),
        }
    }
}

//! RSA key pairs and their `pk_`/`sk_` string forms.
//!
//! A public key string is `pk_` followed by the base64 of its SPKI DER
//! encoding; a private key string is `sk_` followed by the base64 of its
//! PKCS#8 DER encoding.

use crate::error::CryptoError;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Prefix of public key strings
pub const PUBLIC_PREFIX: &str = "pk_";
/// Prefix of private key strings
pub const PRIVATE_PREFIX: &str = "sk_";
/// Modulus size of generated keys
pub const KEY_BITS: usize = 2048;

fn strip<'a>(text: &'a str, prefix: &'static str) -> Result<&'a str, CryptoError> {
    text.trim()
        .strip_prefix(prefix)
        .ok_or(CryptoError::MissingPrefix { expected: prefix })
}

/// Public half: encrypts captures
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Parse a `pk_…` string
    ///
    /// # Errors
    ///
    /// Returns error if the prefix, base64 or SPKI encoding is wrong
    pub fn parse(text: &str) -> Result<Self, CryptoError> {
        let der = STANDARD
            .decode(strip(text, PUBLIC_PREFIX)?)
            .map_err(|_| CryptoError::InvalidBase64 { what: "public key" })?;
        let inner = RsaPublicKey::from_public_key_der(&der).map_err(|e| CryptoError::InvalidKey {
            reason: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    /// Encode as a `pk_…` string
    ///
    /// # Errors
    ///
    /// Returns error if the key cannot be SPKI-encoded
    pub fn encode(&self) -> Result<String, CryptoError> {
        let der = self
            .inner
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKey {
                reason: e.to_string(),
            })?;
        Ok(format!("{}{}", PUBLIC_PREFIX, STANDARD.encode(der.as_bytes())))
    }

    pub(crate) fn rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey").finish_non_exhaustive()
    }
}

/// Private half: decrypts captures during replay
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    /// Parse an `sk_…` string
    ///
    /// # Errors
    ///
    /// Returns error if the prefix, base64 or PKCS#8 encoding is wrong
    pub fn parse(text: &str) -> Result<Self, CryptoError> {
        let der = Zeroizing::new(
            STANDARD
                .decode(strip(text, PRIVATE_PREFIX)?)
                .map_err(|_| CryptoError::InvalidBase64 { what: "private key" })?,
        );
        let inner = RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| CryptoError::InvalidKey {
            reason: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    /// Encode as an `sk_…` string
    ///
    /// # Errors
    ///
    /// Returns error if the key cannot be PKCS#8-encoded
    pub fn encode(&self) -> Result<Zeroizing<String>, CryptoError> {
        let der = self.inner.to_pkcs8_der().map_err(|e| CryptoError::InvalidKey {
            reason: e.to_string(),
        })?;
        Ok(Zeroizing::new(format!(
            "{}{}",
            PRIVATE_PREFIX,
            STANDARD.encode(der.as_bytes())
        )))
    }

    /// Matching public key
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: RsaPublicKey::from(&self.inner),
        }
    }

    pub(crate) fn rsa(&self) -> &RsaPrivateKey {
        &self.inner
    }
}

impl FromStr for PrivateKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Never print key material.
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// A freshly generated key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Public half
    pub public: PublicKey,
    /// Private half
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generate a new 2048-bit pair
    ///
    /// # Errors
    ///
    /// Returns error if the system RNG or prime search fails
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(|e| {
            CryptoError::KeyGeneration {
                reason: e.to_string(),
            }
        })?;
        let private = PrivateKey { inner: private };
        tracing::debug!(bits = KEY_BITS, "generated key pair");
        Ok(Self {
            public: private.public_key(),
            private,
        })
    }

    /// Public key string
    ///
    /// # Errors
    ///
    /// Returns error if the key cannot be encoded
    pub fn public_key_string(&self) -> Result<String, CryptoError> {
        self.public.encode()
    }

    /// Private key string
    ///
    /// # Errors
    ///
    /// Returns error if the key cannot be encoded
    pub fn private_key_string(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.private.encode()
    }
}

//! Chunked RSA-OAEP codec.
//!
//! Plaintext is UTF-8 encoded and split into chunks of at most
//! [`CHUNK_SIZE`] bytes. Each chunk is encrypted on its own with
//! RSA-OAEP/SHA-256, base64 encoded, and the chunks are joined with `|`.

use crate::error::CryptoError;
use crate::keys::{PrivateKey, PublicKey};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;

/// Largest plaintext chunk a 2048-bit key can carry under OAEP/SHA-256
pub const CHUNK_SIZE: usize = 190;

/// Separator between encrypted chunks
pub const SEPARATOR: char = '|';

/// Encrypt `plaintext` for the holder of `key`'s private half.
///
/// An empty plaintext still yields one chunk, so decrypting it with the
/// wrong key fails like any other.
///
/// # Errors
///
/// Returns error if RSA encryption of a chunk fails
pub fn encrypt(key: &PublicKey, plaintext: &str) -> Result<String, CryptoError> {
    let bytes = plaintext.as_bytes();
    let mut chunks: Vec<&[u8]> = bytes.chunks(CHUNK_SIZE).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    let mut rng = OsRng;
    let mut out = String::with_capacity(chunks.len() * 345);
    for (i, chunk) in chunks.iter().enumerate() {
        let cipher = key
            .rsa()
            .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
            .map_err(|e| CryptoError::Encryption {
                reason: e.to_string(),
            })?;
        if i > 0 {
            out.push(SEPARATOR);
        }
        STANDARD.encode_string(&cipher, &mut out);
    }
    tracing::trace!(bytes = bytes.len(), chunks = chunks.len(), "encrypted payload");
    Ok(out)
}

/// Decrypt a payload produced by [`encrypt`].
///
/// # Errors
///
/// Returns error on malformed base64, a wrong key, truncated ciphertext, or
/// plaintext that is not UTF-8
pub fn decrypt(key: &PrivateKey, ciphertext: &str) -> Result<String, CryptoError> {
    let mut plain = Vec::with_capacity(ciphertext.len() / 2);
    for (chunk, part) in ciphertext.split(SEPARATOR).enumerate() {
        let cipher = STANDARD
            .decode(part)
            .map_err(|_| CryptoError::InvalidBase64 { what: "ciphertext" })?;
        let bytes = key
            .rsa()
            .decrypt(Oaep::new::<Sha256>(), &cipher)
            .map_err(|_| CryptoError::Decryption { chunk })?;
        plain.extend_from_slice(&bytes);
    }
    String::from_utf8(plain).map_err(|_| CryptoError::InvalidUtf8)
}

/// [`encrypt`] with the key given as a `pk_…` string
///
/// # Errors
///
/// Returns error if the key does not parse or encryption fails
pub fn encrypt_with(public_key: &str, plaintext: &str) -> Result<String, CryptoError> {
    encrypt(&PublicKey::parse(public_key)?, plaintext)
}

/// [`decrypt`] with the key given as an `sk_…` string
///
/// # Errors
///
/// Returns error if the key does not parse or decryption fails
pub fn decrypt_with(private_key: &str, ciphertext: &str) -> Result<String, CryptoError> {
    decrypt(&PrivateKey::parse(private_key)?, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use crate::keys::tests::TEST_KEYS;
    use once_cell::sync::Lazy;
    use proptest::prelude::*;

    static OTHER_KEYS: Lazy<KeyPair> = Lazy::new(|| KeyPair::generate().expect("key generation"));

    fn round_trip(text: &str) {
        let cipher = encrypt(&TEST_KEYS.public, text).unwrap();
        assert_eq!(decrypt(&TEST_KEYS.private, &cipher).unwrap(), text);
    }

    #[test]
    fn test_round_trip_empty() {
        round_trip("");
        let cipher = encrypt(&TEST_KEYS.public, "").unwrap();
        assert!(!cipher.is_empty());
        assert!(!cipher.contains(SEPARATOR));
    }

    #[test]
    fn test_round_trip_single_char() {
        round_trip("x");
    }

    #[test]
    fn test_round_trip_long() {
        let text: String = "captured payload ✓ ".repeat(1100);
        assert!(text.len() > 19_000);
        round_trip(&text);

        let cipher = encrypt(&TEST_KEYS.public, &text).unwrap();
        let chunks = cipher.split(SEPARATOR).count();
        assert_eq!(chunks, text.len().div_ceil(CHUNK_SIZE));
    }

    #[test]
    fn test_chunk_boundary_splits_multibyte_char() {
        // A 3-byte char straddling the 190-byte boundary
        let text = format!("{}✓tail", "a".repeat(CHUNK_SIZE - 1));
        round_trip(&text);
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = encrypt(&TEST_KEYS.public, "secret").unwrap();
        assert_eq!(
            decrypt(&OTHER_KEYS.private, &cipher),
            Err(CryptoError::Decryption { chunk: 0 })
        );

        let empty = encrypt(&TEST_KEYS.public, "").unwrap();
        assert!(decrypt(&OTHER_KEYS.private, &empty).is_err());
    }

    #[test]
    fn test_malformed_ciphertext() {
        assert_eq!(
            decrypt(&TEST_KEYS.private, "%%%"),
            Err(CryptoError::InvalidBase64 { what: "ciphertext" })
        );

        let cipher = encrypt(&TEST_KEYS.public, &"z".repeat(400)).unwrap();
        let mut parts: Vec<&str> = cipher.split(SEPARATOR).collect();
        let second = parts[1];
        parts[1] = &second[..second.len() - 8];
        assert!(decrypt(&TEST_KEYS.private, &parts.join("|")).is_err());
    }

    #[test]
    fn test_string_key_wrappers() {
        let pk = TEST_KEYS.public_key_string().unwrap();
        let sk = TEST_KEYS.private_key_string().unwrap();
        let cipher = encrypt_with(&pk, "hello").unwrap();
        assert_eq!(decrypt_with(&sk, &cipher).unwrap(), "hello");
        assert!(matches!(
            encrypt_with("nope", "hello"),
            Err(CryptoError::MissingPrefix { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_chunk_count_follows_byte_length(text in "\\PC{0,400}") {
            let cipher = encrypt(&TEST_KEYS.public, &text).unwrap();
            let expected = text.len().div_ceil(CHUNK_SIZE).max(1);
            prop_assert_eq!(cipher.split(SEPARATOR).count(), expected);
            prop_assert_eq!(decrypt(&TEST_KEYS.private, &cipher).unwrap(), text);
        }
    }
}

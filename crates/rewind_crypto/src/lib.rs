//! REWIND Crypto
//!
//! Captures leave the host encrypted with the project's public key and are
//! only readable by whoever holds the private key.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod keys;

pub use codec::{CHUNK_SIZE, SEPARATOR, decrypt, decrypt_with, encrypt, encrypt_with};
pub use error::CryptoError;
pub use keys::{KEY_BITS, KeyPair, PRIVATE_PREFIX, PUBLIC_PREFIX, PrivateKey, PublicKey};

//! Structural hashes over captured values.
//!
//! Uses BLAKE3 over a canonical walk of the value tree. Two values that are
//! deep-equal always hash the same, which lets the linker bucket values by
//! hash before falling back to exact comparison.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A BLAKE3 hash (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructuralHash([u8; 32]);

impl StructuralHash {
    /// The number of bytes in a hash
    pub const LEN: usize = 32;

    /// Hash a value tree
    #[must_use]
    pub fn of(value: &Value) -> Self {
        let mut hasher = blake3::Hasher::new();
        feed(&mut hasher, value);
        Self(*hasher.finalize().as_bytes())
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StructuralHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Tags keep e.g. the string "1" and the number 1 apart.
const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_ARRAY: u8 = 4;
const TAG_OBJECT: u8 = 5;
const TAG_SENTINEL: u8 = 6;
const TAG_BUILT_IN: u8 = 7;

fn feed(hasher: &mut blake3::Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(&[TAG_NULL]);
        }
        Value::Bool(b) => {
            hasher.update(&[TAG_BOOL, u8::from(*b)]);
        }
        Value::Number(n) => {
            // -0.0 == 0.0 under PartialEq, so they must share a hash
            let n = if *n == 0.0 { 0.0 } else { *n };
            hasher.update(&[TAG_NUMBER]);
            hasher.update(&n.to_bits().to_le_bytes());
        }
        Value::String(s) => {
            feed_str(hasher, TAG_STRING, s);
        }
        Value::Array(items) => {
            hasher.update(&[TAG_ARRAY]);
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                feed(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update(&[TAG_OBJECT]);
            hasher.update(&(map.len() as u64).to_le_bytes());
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                feed_str(hasher, TAG_STRING, key);
                feed(hasher, &map[key]);
            }
        }
        Value::Sentinel(kind) => {
            feed_str(hasher, TAG_SENTINEL, kind.as_str());
        }
        Value::BuiltIn { kind, payload } => {
            feed_str(hasher, TAG_BUILT_IN, kind.as_str());
            feed(hasher, payload);
        }
    }
}

fn feed_str(hasher: &mut blake3::Hasher, tag: u8, s: &str) {
    hasher.update(&[tag]);
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

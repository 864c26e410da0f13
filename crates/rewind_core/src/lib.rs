//! REWIND Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! All types are serializable with stable, cross-platform encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod id;
pub mod time;
pub mod value;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use hash::StructuralHash;
pub use id::{CaptureId, EntityId, EntityKind};
pub use time::{CaptureClock, Timestamp};
pub use value::{BuiltInKind, SentinelKind, Value};

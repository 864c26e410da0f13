//! REWIND Policy
//!
//! Turns live host values into capture-safe trees and decides which
//! failures are not worth capturing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod host;
pub mod ignore;
pub mod record;
pub mod sanitize;

pub use host::{HostRef, HostValue};
pub use ignore::{IgnoreError, IgnorePattern, IgnoreRule, IgnoreSet, MessagePredicate};
pub use record::{RecordHost, host_error};
pub use sanitize::{MAX_DEPTH, SanitizeStats, Sanitizer, repair_invocation, sanitize};

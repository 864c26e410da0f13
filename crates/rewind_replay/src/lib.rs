//! REWIND Replay
//!
//! Decrypts a capture and feeds its recorded values back into a re-run of
//! the program, overlaying them onto the values the re-run produces.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod merge;
pub mod session;

pub use merge::{LiveValue, MergeError, merge, merge_args, to_host};
pub use session::{DecodedCapture, ReplayError, ReplaySession};

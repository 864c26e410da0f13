//! REWIND Capture
//!
//! The host-facing side of the engine: configuration, the capture pipeline
//! that turns the event log into an encrypted [`Capture`], and the transport
//! seam captures leave through.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capture;
pub mod config;
pub mod pipeline;
pub mod transport;

pub use capture::{Capture, CaptureTrigger};
pub use config::{ConfigError, DEFAULT_CACHE_DIR, RewindConfig};
pub use pipeline::{CaptureError, CaptureOutcome, Capturer};
pub use transport::{CaptureTransport, MemoryTransport, StoreTransport, TransportError};

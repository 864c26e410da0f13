//! REWIND Event Log
//!
//! The in-process log of instrumented invocations for one capture cycle,
//! plus the linker that deduplicates captured values into pools.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod invocation;
pub mod pool;
pub mod session;

pub use encoding::{CanonicalDecode, CanonicalEncode, EncodeError, probe};
pub use invocation::{CapturedEntity, Invocation, InvocationError};
pub use pool::{
    LinkError, LinkedEntity, LinkedInvocation, PoolField, ValuePool, build_error_pool, build_pool, link,
    revive,
};
pub use session::{CaptureSession, LogError, LogSnapshot, SharedSession};

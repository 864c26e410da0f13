//! Capture-time clock.
//!
//! Invocations are ordered by a monotonic logical counter, not wall-clock
//! time, so two invocations recorded in the same millisecond still compare.

use serde::{Deserialize, Serialize};

/// Capture timestamp - monotonically increasing counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Timestamp zero
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Source of monotonic capture timestamps
#[derive(Debug, Clone, Default)]
pub struct CaptureClock {
    next: u64,
}

impl CaptureClock {
    /// Create a clock starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Take the next timestamp
    pub fn tick(&mut self) -> Timestamp {
        let ts = Timestamp(self.next);
        self.next += 1;
        ts
    }

    /// Peek at the timestamp the next tick will return
    #[must_use]
    pub const fn peek(&self) -> Timestamp {
        Timestamp(self.next)
    }

    /// Make sure future ticks are strictly after `ts`
    pub fn observe(&mut self, ts: Timestamp) {
        if ts.0 >= self.next {
            self.next = ts.0 + 1;
        }
    }
}

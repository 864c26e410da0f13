//! REWIND Storage
//!
//! Everything that decides how much of a capture survives and where
//! captures rest until replay: budgets, eviction and the local cache.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod budget;
pub mod cache;
pub mod evict;

pub use budget::{Budget, BudgetError, MIN_BYTES};
pub use cache::{CaptureStore, FsCaptureStore, MemoryCaptureStore, StoreError};
pub use evict::{EvictionReport, Evictor, Retained};

//! Transport seam: where finished captures go and where replay fetches them.

use crate::capture::Capture;
use async_trait::async_trait;
use rewind_core::{CaptureId, CoreError};
use rewind_log::EncodeError;
use rewind_storage::{CaptureStore, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The receiving end refused the capture
    #[error("capture rejected: {reason}")]
    Rejected {
        /// Refusal reason
        reason: String,
    },
    /// No capture with that id
    #[error("capture {id} not found")]
    NotFound {
        /// Capture id
        id: CaptureId,
    },
    /// Backing store failed
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Capture did not encode or decode
    #[error(transparent)]
    Encoding(#[from] EncodeError),
    /// Blocking worker panicked or was cancelled
    #[error("transport task failed: {reason}")]
    Task {
        /// Join failure
        reason: String,
    },
}

impl From<TransportError> for CoreError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotFound { id } | TransportError::Store(StoreError::NotFound { id }) => {
                CoreError::NotFound {
                    kind: "capture".to_string(),
                    id: id.to_string(),
                }
            }
            TransportError::Encoding(e) => e.into(),
            other => CoreError::Transport {
                reason: other.to_string(),
            },
        }
    }
}

/// Sends captures out and fetches them back for replay
#[async_trait]
pub trait CaptureTransport: Send + Sync {
    /// Deliver a capture
    ///
    /// # Errors
    ///
    /// Returns error if the capture was not delivered
    async fn send(&self, capture: &Capture) -> Result<(), TransportError>;

    /// Fetch a previously delivered capture
    ///
    /// # Errors
    ///
    /// Returns error if the capture is unknown or unreadable
    async fn fetch(&self, id: &CaptureId) -> Result<Capture, TransportError>;
}

/// In-process transport
#[derive(Debug, Default)]
pub struct MemoryTransport {
    captures: Mutex<HashMap<CaptureId, Capture>>,
    reject: AtomicBool,
}

impl MemoryTransport {
    /// Create an empty transport
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Captures delivered so far
    #[must_use]
    pub fn sent(&self) -> Vec<Capture> {
        self.captures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CaptureTransport for MemoryTransport {
    async fn send(&self, capture: &Capture) -> Result<(), TransportError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected {
                reason: "transport is rejecting".to_string(),
            });
        }
        self.captures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capture.capture_id, capture.clone());
        Ok(())
    }

    async fn fetch(&self, id: &CaptureId) -> Result<Capture, TransportError> {
        self.captures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or(TransportError::NotFound { id: *id })
    }
}

/// Transport backed by a local capture store
#[derive(Clone)]
pub struct StoreTransport {
    store: Arc<dyn CaptureStore>,
}

impl StoreTransport {
    /// Wrap a store
    pub fn new(store: Arc<dyn CaptureStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CaptureStore> {
        &self.store
    }
}

#[async_trait]
impl CaptureTransport for StoreTransport {
    async fn send(&self, capture: &Capture) -> Result<(), TransportError> {
        let data = capture.to_json()?;
        let store = Arc::clone(&self.store);
        let id = capture.capture_id;
        tokio::task::spawn_blocking(move || store.put(&id, data.as_bytes()))
            .await
            .map_err(|e| TransportError::Task {
                reason: e.to_string(),
            })??;
        Ok(())
    }

    async fn fetch(&self, id: &CaptureId) -> Result<Capture, TransportError> {
        let store = Arc::clone(&self.store);
        let key = *id;
        let data = tokio::task::spawn_blocking(move || store.get(&key))
            .await
            .map_err(|e| TransportError::Task {
                reason: e.to_string(),
            })??;
        let text = String::from_utf8_lossy(&data);
        Ok(Capture::from_json(&text)?)
    }
}

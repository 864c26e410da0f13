//! Capture session: the append-only event log for one capture cycle.
//!
//! The session is owned by the host integration layer and passed by
//! reference to whatever records into it. It performs no locking itself;
//! hosts with more than one thread share it through [`SharedSession`].

use crate::invocation::{CapturedEntity, Invocation, InvocationError};
use indexmap::IndexMap;
use rewind_core::{CaptureClock, CoreError, EntityId, EntityKind, Timestamp, Value};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Event log errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    /// Output or error attached to an id that was never recorded
    #[error("no {kind} recorded with id {id}")]
    UnknownEntity {
        /// Flavor that was looked up
        kind: EntityKind,
        /// Id that was looked up
        id: String,
    },
}

impl From<LogError> for CoreError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::UnknownEntity { kind, id } => CoreError::NotFound {
                kind: kind.to_string(),
                id,
            },
        }
    }
}

/// Owned copy of the log contents at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSnapshot {
    /// Function entities, in first-record order
    pub functions: Vec<CapturedEntity>,
    /// Call-site entities, in first-record order
    pub calls: Vec<CapturedEntity>,
}

impl LogSnapshot {
    /// Entities of one flavor
    #[must_use]
    pub fn entities(&self, kind: EntityKind) -> &[CapturedEntity] {
        match kind {
            EntityKind::Function => &self.functions,
            EntityKind::Call => &self.calls,
        }
    }

    /// Total invocations across both flavors
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.functions
            .iter()
            .chain(&self.calls)
            .map(CapturedEntity::len)
            .sum()
    }

    /// Check if nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.calls.is_empty()
    }
}

/// The event log for one capture cycle
#[derive(Debug, Clone, Default)]
pub struct CaptureSession {
    functions: IndexMap<EntityId, CapturedEntity>,
    calls: IndexMap<EntityId, CapturedEntity>,
    clock: CaptureClock,
}

impl CaptureSession {
    /// Create an empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, kind: EntityKind) -> &IndexMap<EntityId, CapturedEntity> {
        match kind {
            EntityKind::Function => &self.functions,
            EntityKind::Call => &self.calls,
        }
    }

    fn collection_mut(&mut self, kind: EntityKind) -> &mut IndexMap<EntityId, CapturedEntity> {
        match kind {
            EntityKind::Function => &mut self.functions,
            EntityKind::Call => &mut self.calls,
        }
    }

    /// Append an invocation, creating the entity on first sight
    pub fn record(&mut self, kind: EntityKind, id: EntityId, args: Vec<Value>, timestamp: Timestamp) {
        self.clock.observe(timestamp);
        self.collection_mut(kind)
            .entry(id)
            .or_insert_with_key(|id| CapturedEntity::new(id.clone()))
            .invocations
            .push(Invocation::new(args, timestamp));
    }

    /// Append an invocation stamped by the session clock
    pub fn record_now(&mut self, kind: EntityKind, id: EntityId, args: Vec<Value>) -> Timestamp {
        let timestamp = self.clock.tick();
        self.record(kind, id, args, timestamp);
        timestamp
    }

    fn last_invocation(
        &mut self,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<&mut Invocation, LogError> {
        self.collection_mut(kind)
            .get_mut(id)
            .and_then(CapturedEntity::last_mut)
            .ok_or_else(|| LogError::UnknownEntity {
                kind,
                id: id.to_string(),
            })
    }

    /// Attach the return value to the entity's latest invocation
    ///
    /// # Errors
    ///
    /// Returns error if the id was never recorded
    pub fn attach_output(
        &mut self,
        kind: EntityKind,
        id: &EntityId,
        output: Value,
    ) -> Result<(), LogError> {
        self.last_invocation(kind, id)?.output = Some(output);
        Ok(())
    }

    /// Attach a thrown error to the entity's latest invocation
    ///
    /// # Errors
    ///
    /// Returns error if the id was never recorded
    pub fn attach_error(
        &mut self,
        kind: EntityKind,
        id: &EntityId,
        error: InvocationError,
    ) -> Result<(), LogError> {
        self.last_invocation(kind, id)?.error = Some(error);
        Ok(())
    }

    /// Reset both collections. The clock keeps running.
    pub fn clear(&mut self) {
        tracing::debug!(invocations = self.invocation_count(), "clearing capture log");
        self.functions.clear();
        self.calls.clear();
    }

    /// Look up an entity
    #[must_use]
    pub fn get(&self, kind: EntityKind, id: &EntityId) -> Option<&CapturedEntity> {
        self.collection(kind).get(id)
    }

    /// Entities of one flavor, in first-record order
    pub fn entities(&self, kind: EntityKind) -> impl Iterator<Item = &CapturedEntity> {
        self.collection(kind).values()
    }

    /// Function entities
    pub fn functions(&self) -> impl Iterator<Item = &CapturedEntity> {
        self.entities(EntityKind::Function)
    }

    /// Call-site entities
    pub fn calls(&self) -> impl Iterator<Item = &CapturedEntity> {
        self.entities(EntityKind::Call)
    }

    /// Copy the current contents
    #[must_use]
    pub fn snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            functions: self.functions.values().cloned().collect(),
            calls: self.calls.values().cloned().collect(),
        }
    }

    /// Total invocations across both flavors
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.functions
            .values()
            .chain(self.calls.values())
            .map(CapturedEntity::len)
            .sum()
    }

    /// Check if the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.calls.is_empty()
    }

    /// Session clock
    pub fn clock_mut(&mut self) -> &mut CaptureClock {
        &mut self.clock
    }
}

/// A session shared between threads under a single-writer lock
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<Mutex<CaptureSession>>,
}

impl SharedSession {
    /// Wrap a session
    #[must_use]
    pub fn new(session: CaptureSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Lock the session. A panic in another holder does not poison the log:
    /// recording is best-effort and must never take the host down.
    pub fn lock(&self) -> MutexGuard<'_, CaptureSession> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut CaptureSession) -> R) -> R {
        f(&mut self.lock())
    }
}

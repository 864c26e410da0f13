//! Replay sessions.
//!
//! A session is built from one decrypted capture and feeds its invocations
//! back, in order, to the replayed program. Each entity has its own FIFO
//! cursor: `next_args` advances it, `next_output` reads the output of the
//! invocation whose args were taken last.

use crate::merge::{LiveValue, MergeError, merge, merge_args};
use rewind_capture::Capture;
use rewind_core::{CoreError, EntityId, EntityKind, Value};
use rewind_crypto::{CryptoError, PrivateKey, decrypt};
use rewind_log::{
    CanonicalDecode, CapturedEntity, EncodeError, Invocation, InvocationError, LinkError, ValuePool,
    revive,
};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Replay errors
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Capture did not decrypt
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Decrypted payload did not decode
    #[error(transparent)]
    Encoding(#[from] EncodeError),
    /// Linked indices do not fit the pools
    #[error(transparent)]
    Link(#[from] LinkError),
    /// Live values no longer fit the capture
    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl From<ReplayError> for CoreError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::Crypto(e) => e.into(),
            ReplayError::Encoding(e) => e.into(),
            ReplayError::Link(e) => e.into(),
            ReplayError::Merge(e) => e.into(),
        }
    }
}

/// A capture with its pools decrypted and its entities revived
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedCapture {
    /// Capture name
    pub name: String,
    /// Decrypted pools
    pub pool: ValuePool,
    /// Revived function entities
    pub functions: Vec<CapturedEntity>,
    /// Revived call-site entities
    pub calls: Vec<CapturedEntity>,
    /// Triggering error
    pub error: Option<InvocationError>,
}

impl DecodedCapture {
    /// Decrypt and revive `capture`
    ///
    /// # Errors
    ///
    /// Returns error if a payload does not decrypt or decode, or an index is
    /// out of range
    pub fn decode(capture: &Capture, key: &PrivateKey) -> Result<Self, ReplayError> {
        let pool = ValuePool {
            args: Vec::<Value>::decode(&decrypt(key, &capture.args)?)?,
            outputs: Vec::<Value>::decode(&decrypt(key, &capture.outputs)?)?,
            errors: Vec::<InvocationError>::decode(&decrypt(key, &capture.errors)?)?,
        };
        let functions = revive(&capture.functions, &pool)?;
        let calls = revive(&capture.calls, &pool)?;
        let error = match &capture.error {
            Some(cipher) => Some(InvocationError::decode(&decrypt(key, cipher)?)?),
            None => None,
        };
        tracing::debug!(
            capture_id = %capture.capture_id,
            functions = functions.len(),
            calls = calls.len(),
            "decoded capture"
        );
        Ok(Self {
            name: capture.name.clone(),
            pool,
            functions,
            calls,
            error,
        })
    }
}

#[derive(Debug, Default)]
struct Cursor {
    queue: VecDeque<Invocation>,
    current: Option<Invocation>,
}

fn cursors(entities: Vec<CapturedEntity>) -> HashMap<EntityId, Cursor> {
    entities
        .into_iter()
        .map(|e| {
            let cursor = Cursor {
                queue: e.invocations.into(),
                current: None,
            };
            (e.id, cursor)
        })
        .collect()
}

/// Feeds a capture back to a replayed program
#[derive(Debug)]
pub struct ReplaySession {
    name: String,
    functions: HashMap<EntityId, Cursor>,
    calls: HashMap<EntityId, Cursor>,
    error: Option<InvocationError>,
}

impl ReplaySession {
    /// Decrypt `capture` and start replaying it
    ///
    /// # Errors
    ///
    /// Returns error if the capture cannot be decoded with `key`
    pub fn from_capture(capture: &Capture, key: &PrivateKey) -> Result<Self, ReplayError> {
        Ok(Self::from_decoded(DecodedCapture::decode(capture, key)?))
    }

    /// Start replaying an already decoded capture
    #[must_use]
    pub fn from_decoded(decoded: DecodedCapture) -> Self {
        Self {
            name: decoded.name,
            functions: cursors(decoded.functions),
            calls: cursors(decoded.calls),
            error: decoded.error,
        }
    }

    fn cursor(&mut self, kind: EntityKind, id: &EntityId) -> Option<&mut Cursor> {
        match kind {
            EntityKind::Function => self.functions.get_mut(id),
            EntityKind::Call => self.calls.get_mut(id),
        }
    }

    /// Merge the next captured argument list for `id` into `live`.
    ///
    /// With nothing left to replay for `id`, `live` is returned as is.
    ///
    /// # Errors
    ///
    /// Returns error if an argument no longer has its captured shape
    pub fn next_args<L: LiveValue>(
        &mut self,
        kind: EntityKind,
        id: &EntityId,
        live: &[L],
    ) -> Result<Vec<L>, ReplayError> {
        let Some(cursor) = self.cursor(kind, id) else {
            tracing::debug!(%kind, %id, "no captured invocations, using live args");
            return Ok(live.to_vec());
        };
        let Some(invocation) = cursor.queue.pop_front() else {
            cursor.current = None;
            tracing::debug!(%kind, %id, "captured invocations exhausted, using live args");
            return Ok(live.to_vec());
        };
        let merged = merge_args(&invocation.args, live)?;
        cursor.current = Some(invocation);
        Ok(merged)
    }

    /// Merge the captured output of the current invocation of `id` into
    /// `live`. Advances the cursor if args were not taken first.
    ///
    /// # Errors
    ///
    /// Returns error if the output no longer has its captured shape
    pub fn next_output<L: LiveValue>(
        &mut self,
        kind: EntityKind,
        id: &EntityId,
        live: &L,
    ) -> Result<L, ReplayError> {
        let invocation = self
            .cursor(kind, id)
            .and_then(|c| c.current.take().or_else(|| c.queue.pop_front()));
        match invocation.and_then(|inv| inv.output) {
            Some(output) => Ok(merge(&output, live)?),
            None => Ok(live.clone()),
        }
    }

    /// Error recorded on the current invocation of `id`
    #[must_use]
    pub fn current_error(&self, kind: EntityKind, id: &EntityId) -> Option<&InvocationError> {
        let cursors = match kind {
            EntityKind::Function => &self.functions,
            EntityKind::Call => &self.calls,
        };
        cursors.get(id)?.current.as_ref()?.error.as_ref()
    }

    /// Captured invocations of `id` not yet replayed
    #[must_use]
    pub fn remaining(&self, kind: EntityKind, id: &EntityId) -> usize {
        let cursors = match kind {
            EntityKind::Function => &self.functions,
            EntityKind::Call => &self.calls,
        };
        cursors.get(id).map_or(0, |c| c.queue.len())
    }

    /// Whether every captured invocation has been replayed
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.functions
            .values()
            .chain(self.calls.values())
            .all(|c| c.queue.is_empty())
    }

    /// The error that triggered the capture
    #[must_use]
    pub fn captured_error(&self) -> Option<&InvocationError> {
        self.error.as_ref()
    }

    /// Capture name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use rewind_capture::{CaptureTrigger, Capturer};
    use rewind_core::SentinelKind;
    use rewind_crypto::KeyPair;
    use rewind_log::CaptureSession;
    use rewind_policy::{HostValue, RecordHost};

    static KEYS: Lazy<KeyPair> = Lazy::new(|| KeyPair::generate().expect("key generation"));

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    fn captured() -> Capture {
        let mut session = CaptureSession::new();
        let total = id("cart.ts::total");

        let cart = HostValue::object([
            ("items", HostValue::array(vec![HostValue::Number(2.0), HostValue::Number(3.0)])),
            ("onChange", HostValue::function("onChange")),
        ]);
        session.record_host(EntityKind::Function, total.clone(), &[cart]);
        session.attach_output(EntityKind::Function, &total, Value::from(5)).unwrap();

        session.record_host(EntityKind::Function, total.clone(), &[HostValue::Null]);
        session
            .attach_error(EntityKind::Function, &total, InvocationError::new("TypeError", "cart is null"))
            .unwrap();

        let trigger = CaptureTrigger::new(InvocationError::new("TypeError", "cart is null"));
        Capturer::new("p", "b", KEYS.public.clone())
            .build(&session.snapshot(), &trigger)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_decode_capture() {
        let decoded = DecodedCapture::decode(&captured(), &KEYS.private).unwrap();
        assert_eq!(decoded.functions.len(), 1);
        assert_eq!(decoded.functions[0].len(), 2);
        assert_eq!(decoded.error.unwrap().message, "cart is null");
    }

    #[test]
    fn test_replay_in_order() {
        let total = id("cart.ts::total");
        let mut session = ReplaySession::from_capture(&captured(), &KEYS.private).unwrap();
        assert_eq!(session.remaining(EntityKind::Function, &total), 2);

        let live_cart = HostValue::object([
            ("items", HostValue::array(vec![HostValue::Number(9.0), HostValue::Number(9.0)])),
            ("onChange", HostValue::function("liveHandler")),
        ]);
        let args = session
            .next_args(EntityKind::Function, &total, &[live_cart])
            .unwrap();
        // Captured primitives win, the function hole is filled live
        assert!(matches!(args[0].get("items").unwrap().index(0), Some(HostValue::Number(n)) if n == 2.0));
        assert!(matches!(
            args[0].get("onChange"),
            Some(HostValue::Function { name }) if name == "liveHandler"
        ));
        let out = session
            .next_output(EntityKind::Function, &total, &HostValue::Undefined)
            .unwrap();
        assert!(matches!(out, HostValue::Number(n) if n == 5.0));

        session
            .next_args(EntityKind::Function, &total, &[HostValue::Null])
            .unwrap();
        assert_eq!(
            session.current_error(EntityKind::Function, &total).unwrap().name,
            "TypeError"
        );
        assert!(session.is_exhausted());
        assert_eq!(session.captured_error().unwrap().message, "cart is null");
    }

    #[test]
    fn test_unknown_id_uses_live_values() {
        let mut session = ReplaySession::from_capture(&captured(), &KEYS.private).unwrap();
        let live = vec![Value::from(1)];
        let args = session
            .next_args(EntityKind::Call, &id("x.ts::call_0"), &live)
            .unwrap();
        assert_eq!(args, live);
        let out = session
            .next_output(EntityKind::Call, &id("x.ts::call_0"), &Value::from("live"))
            .unwrap();
        assert_eq!(out, Value::from("live"));
    }

    #[test]
    fn test_exhausted_cursor_uses_live_values() {
        let total = id("cart.ts::total");
        let mut session = ReplaySession::from_capture(&captured(), &KEYS.private).unwrap();
        for _ in 0..2 {
            session.next_args::<Value>(EntityKind::Function, &total, &[]).unwrap();
        }
        let live = vec![Value::from("again")];
        assert_eq!(
            session.next_args(EntityKind::Function, &total, &live).unwrap(),
            live
        );
    }

    #[test]
    fn test_shape_mismatch_surfaces() {
        let total = id("cart.ts::total");
        let mut session = ReplaySession::from_capture(&captured(), &KEYS.private).unwrap();
        let err = session
            .next_args(EntityKind::Function, &total, &[Value::array([])])
            .unwrap_err();
        assert!(matches!(err, ReplayError::Merge(MergeError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_wrong_key_fails_to_decode() {
        let other = KeyPair::generate().unwrap();
        let err = ReplaySession::from_capture(&captured(), &other.private).unwrap_err();
        assert!(matches!(err, ReplayError::Crypto(_)));
    }

    #[test]
    fn test_sentinels_survive_in_pool() {
        let decoded = DecodedCapture::decode(&captured(), &KEYS.private).unwrap();
        let first = &decoded.functions[0].invocations[0].args[0];
        assert_eq!(
            first.as_object().unwrap().get("onChange"),
            Some(&Value::sentinel(SentinelKind::Function))
        );
    }
}

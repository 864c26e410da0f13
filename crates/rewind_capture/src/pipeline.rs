//! Capture pipeline.
//!
//! Turns the event log into an encrypted [`Capture`]:
//! name, ignore check, serialize probe and repair, eviction, pooling and
//! linking, then encryption. [`Capturer::capture`] is what a host calls when
//! an error escapes; it never fails, it reports.

use crate::capture::{Capture, CaptureTrigger};
use crate::config::{ConfigError, RewindConfig};
use crate::transport::CaptureTransport;
use chrono::Utc;
use rewind_core::{CaptureId, CoreError, SentinelKind, Value};
use rewind_crypto::{CryptoError, PublicKey, encrypt};
use rewind_log::{
    CanonicalEncode, CapturedEntity, EncodeError, LinkError, LogSnapshot, SharedSession, ValuePool,
    link, probe,
};
use rewind_policy::{IgnoreSet, repair_invocation};
use rewind_storage::{Budget, Evictor, Retained};

/// Errors while building a capture
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Linking found an inconsistency
    #[error(transparent)]
    Link(#[from] LinkError),
    /// A pool or the trigger did not encode
    #[error(transparent)]
    Encoding(#[from] EncodeError),
    /// Encryption failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<CaptureError> for CoreError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Link(e) => e.into(),
            CaptureError::Encoding(e) => e.into(),
            CaptureError::Crypto(e) => e.into(),
        }
    }
}

/// Result of one capture attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Capture delivered; the log was cleared
    Sent(CaptureId),
    /// An ignore rule matched; the log was cleared
    Ignored,
    /// Building or sending failed; the log was kept for the next attempt
    Failed(String),
}

/// Builds and sends captures for one project
#[derive(Debug, Clone)]
pub struct Capturer {
    project_id: String,
    build_id: String,
    public_key: PublicKey,
    budget: Option<Budget>,
    ignores: IgnoreSet,
    evictor: Evictor,
}

impl Capturer {
    /// Create a capturer with no budget and no ignore rules
    pub fn new(project_id: impl Into<String>, build_id: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            project_id: project_id.into(),
            build_id: build_id.into(),
            public_key,
            budget: None,
            ignores: IgnoreSet::new(),
            evictor: Evictor::new(),
        }
    }

    /// Create from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the public key is missing or invalid. An unusable
    /// budget or ignore pattern is logged and left out instead.
    pub fn from_config(config: &RewindConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(&config.project_id, &config.build_id, config.public_key()?)
            .with_budget(config.budget())
            .with_ignores(IgnoreSet::from_patterns_lossy(&config.capture_ignores)))
    }

    /// Set the budget; `None` disables eviction
    #[must_use]
    pub fn with_budget(mut self, budget: Option<Budget>) -> Self {
        self.budget = budget;
        self
    }

    /// Set the ignore rules
    #[must_use]
    pub fn with_ignores(mut self, ignores: IgnoreSet) -> Self {
        self.ignores = ignores;
        self
    }

    /// Build a capture from a log snapshot.
    ///
    /// Returns `Ok(None)` if an ignore rule matches the capture name.
    ///
    /// # Errors
    ///
    /// Returns error if linking, encoding or encryption fails
    pub fn build(
        &self,
        snapshot: &LogSnapshot,
        trigger: &CaptureTrigger,
    ) -> Result<Option<Capture>, CaptureError> {
        let name = trigger.display_name();
        if let Some(rule) = self.ignores.first_match(&name) {
            tracing::debug!(%name, %rule, "capture ignored");
            return Ok(None);
        }

        let mut functions = snapshot.functions.clone();
        let mut calls = snapshot.calls.clone();
        let repaired: usize = functions
            .iter_mut()
            .chain(calls.iter_mut())
            .flat_map(|e| e.invocations.iter_mut())
            .map(repair_invocation)
            .sum();
        let mut error = trigger.error.clone();
        if let Some(cause) = error.cause.as_mut().filter(|cause| !probe(cause)) {
            *cause = Value::sentinel(SentinelKind::Unserializable);
        }
        if repaired > 0 {
            tracing::warn!(repaired, "replaced values that failed the serialize probe");
        }

        let retained = match &self.budget {
            Some(budget) => self.evictor.apply(&functions, &calls, budget),
            None => Retained::unlimited(&functions, &calls),
        };
        let (functions, calls) = (retained.functions, retained.calls);

        let pool = ValuePool::build(&functions, &calls);
        let linked_functions = link(&functions, &pool)?;
        let linked_calls = link(&calls, &pool)?;
        tracing::debug!(
            args = pool.args.len(),
            outputs = pool.outputs.len(),
            errors = pool.errors.len(),
            invocations = count(&functions) + count(&calls),
            "linked capture"
        );

        let args = encrypt(&self.public_key, &pool.args.encode_string()?)?;
        let outputs = encrypt(&self.public_key, &pool.outputs.encode_string()?)?;
        let errors = encrypt(&self.public_key, &pool.errors.encode_string()?)?;
        let error = encrypt(&self.public_key, &error.encode_string()?)?;

        Ok(Some(Capture {
            capture_id: CaptureId::new(),
            project_id: self.project_id.clone(),
            build_id: self.build_id.clone(),
            captured_user_id: trigger.user.clone(),
            name,
            args,
            outputs,
            errors,
            functions: linked_functions,
            calls: linked_calls,
            error: Some(error),
            created_at: Utc::now(),
        }))
    }

    /// Build and send a capture of `session`.
    ///
    /// The log is cleared when the capture is sent or ignored and kept when
    /// anything fails, so the next attempt carries the backlog.
    pub async fn capture(
        &self,
        session: &SharedSession,
        trigger: &CaptureTrigger,
        transport: &dyn CaptureTransport,
    ) -> CaptureOutcome {
        let snapshot = session.lock().snapshot();

        let capture = match self.build(&snapshot, trigger) {
            Ok(Some(capture)) => capture,
            Ok(None) => {
                session.with(|s| s.clear());
                return CaptureOutcome::Ignored;
            }
            Err(err) => {
                let err = CoreError::from(err);
                tracing::error!(error = %err, fatal = err.is_fatal(), "failed to build capture");
                return CaptureOutcome::Failed(err.to_string());
            }
        };

        match transport.send(&capture).await {
            Ok(()) => {
                session.with(|s| s.clear());
                tracing::info!(capture_id = %capture.capture_id, name = %capture.name, "capture sent");
                CaptureOutcome::Sent(capture.capture_id)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to send capture, keeping log");
                CaptureOutcome::Failed(err.to_string())
            }
        }
    }
}

fn count(entities: &[CapturedEntity]) -> usize {
    entities.iter().map(CapturedEntity::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use once_cell::sync::Lazy;
    use rewind_core::{EntityId, EntityKind};
    use rewind_crypto::{KeyPair, decrypt};
    use rewind_log::{CanonicalDecode, CaptureSession, InvocationError};
    use rewind_policy::{IgnorePattern, IgnoreRule};

    static KEYS: Lazy<KeyPair> = Lazy::new(|| KeyPair::generate().expect("key generation"));

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    fn capturer() -> Capturer {
        Capturer::new("proj", "b1", KEYS.public.clone())
    }

    fn trigger() -> CaptureTrigger {
        CaptureTrigger::new(InvocationError::new("TypeError", "cart is null")).with_user("u-7")
    }

    fn session() -> SharedSession {
        let mut s = CaptureSession::new();
        let f = id("cart.ts::total");
        for n in 0..3 {
            s.record_now(EntityKind::Function, f.clone(), vec![Value::from("same")]);
            s.attach_output(EntityKind::Function, &f, Value::from(n)).unwrap();
        }
        let c = id("cart.ts::call_1");
        s.record_now(EntityKind::Call, c.clone(), vec![Value::from("same")]);
        s.attach_error(EntityKind::Call, &c, InvocationError::new("TypeError", "cart is null"))
            .unwrap();
        SharedSession::new(s)
    }

    #[test]
    fn test_build_links_and_encrypts() {
        let snapshot = session().lock().snapshot();
        let capture = capturer().build(&snapshot, &trigger()).unwrap().unwrap();

        assert_eq!(capture.name, "TypeError: cart is null");
        assert_eq!(capture.captured_user_id.as_deref(), Some("u-7"));
        assert_eq!(capture.invocation_count(), 4);

        // One shared args entry across both flavors
        let args: Vec<Value> = Vec::decode(&decrypt(&KEYS.private, &capture.args).unwrap()).unwrap();
        assert_eq!(args, vec![Value::array([Value::from("same")])]);
        let outputs: Vec<Value> =
            Vec::decode(&decrypt(&KEYS.private, &capture.outputs).unwrap()).unwrap();
        assert_eq!(outputs.len(), 3);

        let error = InvocationError::decode(
            &decrypt(&KEYS.private, capture.error.as_deref().unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(error.message, "cart is null");
    }

    #[test]
    fn test_invocation_errors_are_encrypted() {
        let mut s = CaptureSession::new();
        let f = id("pay.ts::charge");
        s.record_now(EntityKind::Function, f.clone(), vec![]);
        let thrown = InvocationError::new("Error", "declined")
            .with_cause(Value::object([("card", Value::from("card-4242-4242"))]));
        s.attach_error(EntityKind::Function, &f, thrown.clone()).unwrap();

        let capture = capturer()
            .build(&s.snapshot(), &CaptureTrigger::new(thrown.clone()))
            .unwrap()
            .unwrap();
        assert!(!capture.to_json().unwrap().contains("card-4242-4242"));
        assert_eq!(capture.functions[0].invocations[0].error, Some(0));

        let errors: Vec<InvocationError> =
            Vec::decode(&decrypt(&KEYS.private, &capture.errors).unwrap()).unwrap();
        assert_eq!(errors, vec![thrown]);
    }

    #[test]
    fn test_from_config_skips_bad_ignore_pattern() {
        let config = RewindConfig::new("shop")
            .with_public_key(KEYS.public_key_string().unwrap())
            .with_ignore(IgnorePattern::Regex("(unclosed".to_string()))
            .with_ignore(IgnorePattern::Contains("cart".to_string()));
        let capturer = Capturer::from_config(&config).unwrap();
        let snapshot = session().lock().snapshot();
        assert!(capturer.build(&snapshot, &trigger()).unwrap().is_none());
    }

    #[test]
    fn test_build_ignored() {
        let capturer = capturer().with_ignores(IgnoreSet::new().with_rule(IgnoreRule::contains("null")));
        let snapshot = session().lock().snapshot();
        assert!(capturer.build(&snapshot, &trigger()).unwrap().is_none());
    }

    #[test]
    fn test_build_repairs_unserializable_values() {
        let mut s = CaptureSession::new();
        s.record_now(EntityKind::Function, id("m.ts::f"), vec![Value::from(f64::NAN)]);
        let trigger = CaptureTrigger::new(
            InvocationError::new("Error", "nan").with_cause(Value::from(f64::INFINITY)),
        );
        let capture = capturer().build(&s.snapshot(), &trigger).unwrap().unwrap();

        let args: Vec<Value> = Vec::decode(&decrypt(&KEYS.private, &capture.args).unwrap()).unwrap();
        assert_eq!(args, vec![Value::array([Value::sentinel(SentinelKind::Unserializable)])]);
        let error = InvocationError::decode(
            &decrypt(&KEYS.private, capture.error.as_deref().unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(error.cause, Some(Value::sentinel(SentinelKind::Unserializable)));
    }

    #[test]
    fn test_build_applies_budget() {
        let mut s = CaptureSession::new();
        for n in 0..50 {
            s.record_now(EntityKind::Function, id("big.ts::f"), vec![Value::from("x".repeat(100) + &n.to_string())]);
        }
        let capture = capturer()
            .with_budget(Some(Budget::Bytes(1024)))
            .build(&s.snapshot(), &trigger())
            .unwrap()
            .unwrap();
        assert!(capture.invocation_count() < 50);
        assert!(capture.invocation_count() > 0);
    }

    #[tokio::test]
    async fn test_capture_sent_clears_log() {
        let session = session();
        let transport = MemoryTransport::new();
        let outcome = capturer().capture(&session, &trigger(), &transport).await;

        let CaptureOutcome::Sent(capture_id) = outcome else {
            panic!("expected Sent, got {:?}", outcome);
        };
        assert!(session.lock().is_empty());
        assert_eq!(transport.sent()[0].capture_id, capture_id);
    }

    #[tokio::test]
    async fn test_capture_ignored_clears_log() {
        let session = session();
        let capturer = capturer().with_ignores(IgnoreSet::new().with_rule(IgnoreRule::contains("TypeError")));
        let transport = MemoryTransport::new();
        assert_eq!(
            capturer.capture(&session, &trigger(), &transport).await,
            CaptureOutcome::Ignored
        );
        assert!(session.lock().is_empty());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_keeps_log() {
        let session = session();
        let transport = MemoryTransport::new();
        transport.set_rejecting(true);

        let outcome = capturer().capture(&session, &trigger(), &transport).await;
        assert!(matches!(outcome, CaptureOutcome::Failed(_)));
        assert_eq!(session.lock().invocation_count(), 4);

        // The next attempt carries the backlog
        session.with(|s| s.record_now(EntityKind::Function, id("cart.ts::total"), vec![]));
        transport.set_rejecting(false);
        let outcome = capturer().capture(&session, &trigger(), &transport).await;
        assert!(matches!(outcome, CaptureOutcome::Sent(_)));
        assert_eq!(transport.sent()[0].invocation_count(), 5);
    }
}

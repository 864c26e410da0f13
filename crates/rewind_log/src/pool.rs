//! Value pool and linker.
//!
//! Argument lists, outputs and thrown errors repeat a lot across
//! invocations. Linking replaces each with an index into a pool of
//! structurally distinct entries so every distinct value is serialized (and
//! encrypted) once, and nothing captured from the host stays in the linked
//! entities.
//!
//! Values are bucketed by [`StructuralHash`] and compared exactly inside a
//! bucket, which keeps pool construction near-linear in the log size.

use crate::invocation::{CapturedEntity, Invocation, InvocationError};
use rewind_core::{CoreError, EntityId, SentinelKind, StructuralHash, Timestamp, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which invocation field a pool is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolField {
    /// Whole argument lists
    Args,
    /// Return values
    Output,
    /// Thrown errors
    Error,
}

/// Linker errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// A value is missing from the pool built from the very same data
    #[error("invariant state: {field:?} of {id} has no pool entry")]
    InvariantViolation {
        /// Entity whose value was not found
        id: String,
        /// Field that was looked up
        field: PoolField,
    },
    /// A linked index points past the end of its pool
    #[error("{field:?} index {index} of {id} out of range (pool has {len})")]
    IndexOutOfRange {
        /// Entity holding the index
        id: String,
        /// Field of the index
        field: PoolField,
        /// Offending index
        index: usize,
        /// Pool length
        len: usize,
    },
    /// An args pool entry is not an array
    #[error("args pool entry {index} is a {found}, expected array")]
    MalformedArgs {
        /// Pool index
        index: usize,
        /// Type found instead
        found: String,
    },
}

impl From<LinkError> for CoreError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::InvariantViolation { .. } => CoreError::Invariant {
                message: err.to_string(),
            },
            _ => CoreError::Data {
                reason: err.to_string(),
            },
        }
    }
}

/// Invocation whose args, output and error are pool indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedInvocation {
    pub args: usize,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<usize>,
}

/// Entity whose invocations are linked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEntity {
    pub id: EntityId,
    pub invocations: Vec<LinkedInvocation>,
}

/// Deduplicating index over a growing sequence of values
#[derive(Debug, Default)]
struct PoolIndex {
    values: Vec<Value>,
    buckets: HashMap<StructuralHash, Vec<usize>>,
}

impl PoolIndex {
    fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut index = Self::default();
        for value in values {
            index.insert(value);
        }
        index
    }

    fn find_hashed(&self, hash: &StructuralHash, value: &Value) -> Option<usize> {
        self.buckets
            .get(hash)?
            .iter()
            .copied()
            .find(|&i| self.values[i] == *value)
    }

    fn find(&self, value: &Value) -> Option<usize> {
        self.find_hashed(&StructuralHash::of(value), value)
    }

    /// Insert unless a deep-equal value is present; returns its index
    fn insert(&mut self, value: Value) -> usize {
        let hash = StructuralHash::of(&value);
        if let Some(i) = self.find_hashed(&hash, &value) {
            return i;
        }
        let i = self.values.len();
        self.values.push(value);
        self.buckets.entry(hash).or_default().push(i);
        i
    }
}

/// Pool key of an error. Absent stack and cause are kept distinct from
/// present-but-empty ones.
fn error_key(error: &InvocationError) -> Value {
    Value::object([
        ("name", Value::from(error.name.as_str())),
        ("message", Value::from(error.message.as_str())),
        ("stack", error.stack.as_deref().map_or(Value::Sentinel(SentinelKind::Undefined), Value::from)),
        ("cause", Value::array(error.cause.iter().cloned())),
    ])
}

fn field_value(invocation: &Invocation, field: PoolField) -> Option<Value> {
    match field {
        PoolField::Args => Some(invocation.args_value()),
        PoolField::Output => invocation.output.clone(),
        PoolField::Error => invocation.error.as_ref().map(error_key),
    }
}

/// Distinct values of `field`, in first-occurrence log order
pub fn build_pool<'a, I>(entities: I, field: PoolField) -> Vec<Value>
where
    I: IntoIterator<Item = &'a CapturedEntity>,
{
    let mut index = PoolIndex::default();
    for entity in entities {
        for invocation in &entity.invocations {
            if let Some(value) = field_value(invocation, field) {
                index.insert(value);
            }
        }
    }
    index.values
}

/// Distinct thrown errors, in first-occurrence log order
pub fn build_error_pool<'a, I>(entities: I) -> Vec<InvocationError>
where
    I: IntoIterator<Item = &'a CapturedEntity>,
{
    let mut index = PoolIndex::default();
    let mut errors = Vec::new();
    for entity in entities {
        for error in entity.invocations.iter().filter_map(|inv| inv.error.as_ref()) {
            if index.insert(error_key(error)) == errors.len() {
                errors.push(error.clone());
            }
        }
    }
    errors
}

/// Pools shared by both entity flavors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuePool {
    /// Distinct argument lists, each a `Value::Array`
    pub args: Vec<Value>,
    /// Distinct outputs
    pub outputs: Vec<Value>,
    /// Distinct thrown errors
    #[serde(default)]
    pub errors: Vec<InvocationError>,
}

impl ValuePool {
    /// Build every pool from functions then calls
    #[must_use]
    pub fn build(functions: &[CapturedEntity], calls: &[CapturedEntity]) -> Self {
        Self {
            args: build_pool(functions.iter().chain(calls), PoolField::Args),
            outputs: build_pool(functions.iter().chain(calls), PoolField::Output),
            errors: build_error_pool(functions.iter().chain(calls)),
        }
    }

    fn len(&self, field: PoolField) -> usize {
        match field {
            PoolField::Args => self.args.len(),
            PoolField::Output => self.outputs.len(),
            PoolField::Error => self.errors.len(),
        }
    }
}

/// Rewrite invocations to reference pool indices
///
/// # Errors
///
/// Returns [`LinkError::InvariantViolation`] if a value has no pool entry,
/// which can only happen if `pool` was not built from `entities`.
pub fn link(entities: &[CapturedEntity], pool: &ValuePool) -> Result<Vec<LinkedEntity>, LinkError> {
    let args_index = PoolIndex::from_values(pool.args.iter().cloned());
    let outputs_index = PoolIndex::from_values(pool.outputs.iter().cloned());
    let errors_index = PoolIndex::from_values(pool.errors.iter().map(error_key));

    entities
        .iter()
        .map(|entity| -> Result<LinkedEntity, LinkError> {
            let missing = |field| LinkError::InvariantViolation {
                id: entity.id.to_string(),
                field,
            };
            let invocations = entity
                .invocations
                .iter()
                .map(|inv| -> Result<LinkedInvocation, LinkError> {
                    let args = args_index
                        .find(&inv.args_value())
                        .ok_or_else(|| missing(PoolField::Args))?;
                    let output = match &inv.output {
                        Some(out) => Some(
                            outputs_index
                                .find(out)
                                .ok_or_else(|| missing(PoolField::Output))?,
                        ),
                        None => None,
                    };
                    let error = match &inv.error {
                        Some(err) => Some(
                            errors_index
                                .find(&error_key(err))
                                .ok_or_else(|| missing(PoolField::Error))?,
                        ),
                        None => None,
                    };
                    Ok(LinkedInvocation {
                        args,
                        timestamp: inv.timestamp,
                        output,
                        error,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(LinkedEntity {
                id: entity.id.clone(),
                invocations,
            })
        })
        .collect()
}

/// Inverse of [`link`]: substitute pool values back for indices
///
/// # Errors
///
/// Returns error if an index is out of range or an args entry is not an array
pub fn revive(linked: &[LinkedEntity], pool: &ValuePool) -> Result<Vec<CapturedEntity>, LinkError> {
    linked
        .iter()
        .map(|entity| -> Result<CapturedEntity, LinkError> {
            let out_of_range = |field, index| LinkError::IndexOutOfRange {
                id: entity.id.to_string(),
                field,
                index,
                len: pool.len(field),
            };
            let invocations = entity
                .invocations
                .iter()
                .map(|inv| -> Result<Invocation, LinkError> {
                    let args = match pool.args.get(inv.args) {
                        Some(Value::Array(items)) => items.clone(),
                        Some(other) => {
                            return Err(LinkError::MalformedArgs {
                                index: inv.args,
                                found: other.type_name().to_string(),
                            });
                        }
                        None => return Err(out_of_range(PoolField::Args, inv.args)),
                    };
                    let output = match inv.output {
                        Some(i) => Some(
                            pool.outputs
                                .get(i)
                                .cloned()
                                .ok_or_else(|| out_of_range(PoolField::Output, i))?,
                        ),
                        None => None,
                    };
                    let error = match inv.error {
                        Some(i) => Some(
                            pool.errors
                                .get(i)
                                .cloned()
                                .ok_or_else(|| out_of_range(PoolField::Error, i))?,
                        ),
                        None => None,
                    };
                    Ok(Invocation {
                        args,
                        timestamp: inv.timestamp,
                        output,
                        error,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CapturedEntity {
                id: entity.id.clone(),
                invocations,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn inv(args: Vec<Value>, ts: u64, output: Option<Value>) -> Invocation {
        Invocation {
            args,
            timestamp: Timestamp::from_raw(ts),
            output,
            error: None,
        }
    }

    fn entity(id: &str, invocations: Vec<Invocation>) -> CapturedEntity {
        CapturedEntity::new(EntityId::new(id).unwrap()).with_invocations(invocations)
    }

    #[test]
    fn test_build_pool_dedupes_structurally() {
        let obj = |n| Value::object([("n", Value::from(n))]);
        let entities = vec![
            entity("a.ts::f", vec![
                inv(vec![obj(1)], 0, Some(Value::from("x"))),
                inv(vec![obj(1)], 1, Some(Value::from("y"))),
            ]),
            entity("a.ts::g", vec![inv(vec![obj(2)], 2, Some(Value::from("x")))]),
        ];

        let args = build_pool(&entities, PoolField::Args);
        assert_eq!(args, vec![Value::array([obj(1)]), Value::array([obj(2)])]);

        let outputs = build_pool(&entities, PoolField::Output);
        assert_eq!(outputs, vec![Value::from("x"), Value::from("y")]);
    }

    #[test]
    fn test_output_absent_is_not_pooled() {
        let entities = vec![entity("a.ts::f", vec![inv(vec![], 0, None)])];
        assert!(build_pool(&entities, PoolField::Output).is_empty());
        assert_eq!(build_pool(&entities, PoolField::Args), vec![Value::array([])]);
    }

    #[test]
    fn test_link_indices() {
        let functions = vec![entity("a.ts::f", vec![
            inv(vec![Value::from(1)], 0, Some(Value::from(2))),
            inv(vec![Value::from(3)], 1, None),
            inv(vec![Value::from(1)], 2, Some(Value::from(2))),
        ])];
        let pool = ValuePool::build(&functions, &[]);
        let linked = link(&functions, &pool).unwrap();

        let idx: Vec<(usize, Option<usize>)> = linked[0]
            .invocations
            .iter()
            .map(|i| (i.args, i.output))
            .collect();
        assert_eq!(idx, vec![(0, Some(0)), (1, None), (0, Some(0))]);
    }

    #[test]
    fn test_pool_shared_across_flavors() {
        let functions = vec![entity("a.ts::f", vec![inv(vec![Value::from("k")], 0, None)])];
        let calls = vec![entity("a.ts::c", vec![inv(vec![Value::from("k")], 1, None)])];
        let pool = ValuePool::build(&functions, &calls);
        assert_eq!(pool.args.len(), 1);
        assert_eq!(link(&calls, &pool).unwrap()[0].invocations[0].args, 0);
    }

    #[test]
    fn test_link_against_foreign_pool_is_invariant_violation() {
        let functions = vec![entity("a.ts::f", vec![inv(vec![Value::from(1)], 0, None)])];
        let err = link(&functions, &ValuePool::default()).unwrap_err();
        assert!(matches!(err, LinkError::InvariantViolation { field: PoolField::Args, .. }));
        assert!(CoreError::from(err).is_fatal());
    }

    #[test]
    fn test_revive_out_of_range() {
        let linked = vec![LinkedEntity {
            id: EntityId::new("a.ts::f").unwrap(),
            invocations: vec![LinkedInvocation {
                args: 0,
                timestamp: Timestamp::zero(),
                output: Some(5),
                error: None,
            }],
        }];
        let pool = ValuePool {
            args: vec![Value::array([])],
            outputs: vec![],
            errors: vec![],
        };
        let err = revive(&linked, &pool).unwrap_err();
        assert!(matches!(err, LinkError::IndexOutOfRange { index: 5, .. }));
        assert!(!CoreError::from(err).is_fatal());
    }

    #[test]
    fn test_revive_rejects_non_array_args() {
        let linked = vec![LinkedEntity {
            id: EntityId::new("a.ts::f").unwrap(),
            invocations: vec![LinkedInvocation {
                args: 0,
                timestamp: Timestamp::zero(),
                output: None,
                error: None,
            }],
        }];
        let pool = ValuePool {
            args: vec![Value::from("oops")],
            outputs: vec![],
            errors: vec![],
        };
        assert!(matches!(
            revive(&linked, &pool),
            Err(LinkError::MalformedArgs { index: 0, .. })
        ));
    }

    #[test]
    fn test_errors_are_pooled_and_linked_by_index() {
        let boom = InvocationError::new("TypeError", "boom")
            .with_cause(Value::object([("card", Value::from("4242"))]));
        let functions = vec![entity("a.ts::f", vec![
            inv(vec![], 0, None).with_error(boom.clone()),
            inv(vec![], 1, None).with_error(boom.clone()),
            inv(vec![], 2, None).with_error(InvocationError::new("TypeError", "boom")),
        ])];
        let pool = ValuePool::build(&functions, &[]);
        // Same name and message, but one has no cause
        assert_eq!(pool.errors.len(), 2);

        let linked = link(&functions, &pool).unwrap();
        let idx: Vec<Option<usize>> = linked[0].invocations.iter().map(|i| i.error).collect();
        assert_eq!(idx, vec![Some(0), Some(0), Some(1)]);
        assert!(!serde_json::to_string(&linked).unwrap().contains("4242"));
        assert_eq!(revive(&linked, &pool).unwrap(), functions);
    }

    #[test]
    fn test_revive_error_out_of_range() {
        let linked = vec![LinkedEntity {
            id: EntityId::new("a.ts::f").unwrap(),
            invocations: vec![LinkedInvocation {
                args: 0,
                timestamp: Timestamp::zero(),
                output: None,
                error: Some(0),
            }],
        }];
        let pool = ValuePool {
            args: vec![Value::array([])],
            ..ValuePool::default()
        };
        assert!(matches!(
            revive(&linked, &pool),
            Err(LinkError::IndexOutOfRange { field: PoolField::Error, index: 0, .. })
        ));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        // Small domains so duplicates are common
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (0i32..4).prop_map(Value::from),
            "[ab]{0,2}".prop_map(Value::String),
        ];
        leaf.prop_recursive(2, 8, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
                prop::collection::vec(("[xy]", inner), 0..3).prop_map(Value::object),
            ]
        })
    }

    fn arb_entities() -> impl Strategy<Value = Vec<CapturedEntity>> {
        let error = prop::option::of((
            "[ab]",
            prop::option::of(arb_value()),
        ));
        let invocation = (
            prop::collection::vec(arb_value(), 0..3),
            prop::option::of(arb_value()),
            error,
        );
        prop::collection::vec(prop::collection::vec(invocation, 1..4), 0..4).prop_map(|groups| {
            let mut ts = 0;
            groups
                .into_iter()
                .enumerate()
                .map(|(i, invs)| {
                    let invocations = invs
                        .into_iter()
                        .map(|(args, output, error)| {
                            ts += 1;
                            let mut invocation = inv(args, ts, output);
                            invocation.error = error.map(|(message, cause)| InvocationError {
                                cause,
                                ..InvocationError::new("Error", message)
                            });
                            invocation
                        })
                        .collect();
                    entity(&format!("f{}.ts::e{}", i % 2, i), invocations)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_link_revive_roundtrip(entities in arb_entities()) {
            let pool = ValuePool::build(&entities, &[]);
            let linked = link(&entities, &pool).unwrap();
            let revived = revive(&linked, &pool).unwrap();
            prop_assert_eq!(revived, entities);
        }

        #[test]
        fn prop_pool_has_no_duplicates(entities in arb_entities()) {
            let pool = ValuePool::build(&entities, &[]);
            for values in [&pool.args, &pool.outputs] {
                for (i, a) in values.iter().enumerate() {
                    for b in &values[i + 1..] {
                        prop_assert_ne!(a, b);
                    }
                }
            }
        }
    }
}

//! Eviction: cut a log down to a budget before it is sent.
//!
//! A byte budget is filled round by round. Round `r` offers every entity's
//! `r`-th latest invocation, entities taken most-recently-active first, so
//! every entity gets its latest invocation in before any entity gets two.
//! Invocations that carry an error are always kept.

use crate::budget::Budget;
use rewind_log::{CanonicalEncode, CapturedEntity};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;

/// What eviction did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    /// Invocations offered for selection
    pub considered: usize,
    /// Invocations kept
    pub kept: usize,
    /// Encoded size of the kept invocations
    pub kept_bytes: u64,
    /// Error invocations kept past the byte budget
    pub overflow: usize,
    /// Whether the byte budget ran out before every invocation was offered
    pub saturated: bool,
}

/// Entities that survived eviction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retained {
    /// Function entities, most recently active first
    pub functions: Vec<CapturedEntity>,
    /// Call-site entities, most recently active first
    pub calls: Vec<CapturedEntity>,
    /// Selection statistics
    pub report: EvictionReport,
}

impl Retained {
    /// Keep everything, in the same order a budget would emit
    #[must_use]
    pub fn unlimited(functions: &[CapturedEntity], calls: &[CapturedEntity]) -> Self {
        let functions: Vec<CapturedEntity> = by_recency(functions).into_iter().cloned().collect();
        let calls: Vec<CapturedEntity> = by_recency(calls).into_iter().cloned().collect();
        let report = report_for(&functions, &calls);
        Self {
            functions,
            calls,
            report,
        }
    }

    /// Total invocations retained
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.functions
            .iter()
            .chain(&self.calls)
            .map(CapturedEntity::len)
            .sum()
    }
}

fn report_for(functions: &[CapturedEntity], calls: &[CapturedEntity]) -> EvictionReport {
    let mut report = EvictionReport::default();
    for inv in functions.iter().chain(calls).flat_map(|e| &e.invocations) {
        report.considered += 1;
        report.kept += 1;
        report.kept_bytes = report.kept_bytes.saturating_add(inv.encoded_len() as u64);
    }
    report
}

/// Most recently active first. Ties keep log order; entities with no
/// invocations go last.
fn by_recency(entities: &[CapturedEntity]) -> Vec<&CapturedEntity> {
    let mut sorted: Vec<&CapturedEntity> = entities.iter().collect();
    sorted.sort_by_key(|e| Reverse(e.recency()));
    sorted
}

/// Invocation positions of `entity`, latest first
fn latest_first(entity: &CapturedEntity) -> Vec<usize> {
    let mut order: Vec<usize> = (0..entity.invocations.len()).rev().collect();
    order.sort_by_key(|&i| Reverse(entity.invocations[i].timestamp));
    order
}

/// Selection state for one entity list
struct Lane<'a> {
    entities: Vec<&'a CapturedEntity>,
    order: Vec<Vec<usize>>,
    kept: Vec<Vec<usize>>,
}

impl<'a> Lane<'a> {
    fn new(entities: &'a [CapturedEntity]) -> Self {
        let entities = by_recency(entities);
        let order = entities.iter().map(|e| latest_first(e)).collect();
        let kept = vec![Vec::new(); entities.len()];
        Self {
            entities,
            order,
            kept,
        }
    }

    fn depth(&self) -> usize {
        self.order.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn finish(self) -> Vec<CapturedEntity> {
        self.entities
            .into_iter()
            .zip(self.kept)
            .filter(|(_, kept)| !kept.is_empty())
            .map(|(entity, mut kept)| {
                kept.sort_unstable();
                let invocations = kept.into_iter().map(|i| entity.invocations[i].clone()).collect();
                CapturedEntity::new(entity.id.clone()).with_invocations(invocations)
            })
            .collect()
    }
}

/// Applies budgets to captured entities
#[derive(Debug, Clone, Copy, Default)]
pub struct Evictor;

impl Evictor {
    /// Create an evictor
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Cut `functions` and `calls` down to `budget`
    #[must_use]
    pub fn apply(
        &self,
        functions: &[CapturedEntity],
        calls: &[CapturedEntity],
        budget: &Budget,
    ) -> Retained {
        let retained = match *budget {
            Budget::Files(limit) => self.apply_files(functions, calls, limit),
            Budget::Bytes(limit) => self.apply_bytes(functions, calls, limit),
        };
        tracing::debug!(
            %budget,
            considered = retained.report.considered,
            kept = retained.report.kept,
            kept_bytes = retained.report.kept_bytes,
            overflow = retained.report.overflow,
            "evicted capture"
        );
        retained
    }

    fn apply_files(
        &self,
        functions: &[CapturedEntity],
        calls: &[CapturedEntity],
        limit: usize,
    ) -> Retained {
        let mut merged: Vec<&CapturedEntity> = functions.iter().chain(calls).collect();
        merged.sort_by_key(|e| Reverse(e.recency()));

        let mut files: Vec<&str> = Vec::new();
        for entity in merged {
            if files.len() >= limit {
                break;
            }
            let file = entity.id.file();
            if !files.contains(&file) {
                files.push(file);
            }
        }
        let files: HashSet<&str> = files.into_iter().collect();

        let keep = |entities: &[CapturedEntity]| -> Vec<CapturedEntity> {
            by_recency(entities)
                .into_iter()
                .filter(|e| files.contains(e.id.file()))
                .cloned()
                .collect()
        };
        let considered: usize = functions.iter().chain(calls).map(CapturedEntity::len).sum();
        let functions = keep(functions);
        let calls = keep(calls);

        let mut report = report_for(&functions, &calls);
        report.considered = considered;
        Retained {
            functions,
            calls,
            report,
        }
    }

    fn apply_bytes(&self, functions: &[CapturedEntity], calls: &[CapturedEntity], limit: u64) -> Retained {
        let mut lanes = [Lane::new(functions), Lane::new(calls)];
        let rounds = lanes.iter().map(Lane::depth).max().unwrap_or(0);
        let ranks = lanes.iter().map(|l| l.entities.len()).max().unwrap_or(0);
        let mut report = EvictionReport::default();

        for round in 0..rounds {
            for rank in 0..ranks {
                for lane in &mut lanes {
                    let Some(&pos) = lane.order.get(rank).and_then(|o| o.get(round)) else {
                        continue;
                    };
                    let invocation = &lane.entities[rank].invocations[pos];
                    let size = invocation.encoded_len() as u64;
                    let total = report.kept_bytes.saturating_add(size);
                    report.considered += 1;

                    let fits = !report.saturated && total <= limit;
                    if !fits && !invocation.has_error() {
                        report.saturated = true;
                        continue;
                    }
                    if !fits {
                        report.overflow += 1;
                    }
                    lane.kept[rank].push(pos);
                    report.kept += 1;
                    report.kept_bytes = total;
                }
            }
        }

        let [functions, calls] = lanes;
        Retained {
            functions: functions.finish(),
            calls: calls.finish(),
            report,
        }
    }
}

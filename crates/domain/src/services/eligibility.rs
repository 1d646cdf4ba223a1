//! Eligibility and grouping engine for export runs.
//!
//! Selection decides who participates in a run; partitioning turns the
//! selected candidates into one batch per cohort so the destination mailbox
//! receives one consolidated report per class.

use std::collections::BTreeMap;

use crate::models::{ExportCandidate, UserRole};

/// Bucket for candidates without an assigned cohort. Partitioning is total:
/// nobody is dropped for lacking a group.
pub const UNGROUPED_BUCKET: &str = "Ungrouped";

/// Selects candidates for a scheduled run: students who have opted in.
///
/// The consent gate is consulted per candidate and fails closed; admins and
/// non-consenting students never pass.
pub fn select_scheduled_candidates(candidates: Vec<ExportCandidate>) -> Vec<ExportCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.role == UserRole::Student && c.is_eligible_for_auto_export())
        .collect()
}

/// Partitions candidates into batches keyed by cohort name.
///
/// Every candidate lands in exactly one bucket; candidates without a cohort
/// go to [`UNGROUPED_BUCKET`]. A `BTreeMap` keeps batch order deterministic.
pub fn partition_into_batches(
    candidates: Vec<ExportCandidate>,
) -> BTreeMap<String, Vec<ExportCandidate>> {
    let mut batches: BTreeMap<String, Vec<ExportCandidate>> = BTreeMap::new();

    for candidate in candidates {
        let key = candidate
            .cohort_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNGROUPED_BUCKET.to_string());
        batches.entry(key).or_default().push(candidate);
    }

    batches
}

//! Streaming consolidation of sorted proposals.
//!
//! The scan keeps one open accumulator. Each incoming proposal either extends
//! it or closes it and seeds a new one. A new accumulator is opened when the
//! group changes, when the split configuration fingerprint changes, or when
//! the plan codes partially overlap the accumulated plan codes.
//!
//! The accumulator keeps the id of the proposal that seeded it for its whole
//! life, so every consumption edge points at a survivor.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audit::{AuditTrail, ConsolidationOutcome, ConsumptionRecord, MERGE_REASON};
use crate::conflict::{PlanOverlap, classify};
use crate::error::ConsolidationError;
use crate::proposal::{GroupId, ProposalId, RetainedProposal, SourceProposal};
use crate::sort_key::{OrderingKey, sort_proposals};

/// Why the scan closed one accumulator and opened the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// First proposal of a group (including the very first proposal).
    Group,
    /// Same group, different split configuration.
    Fingerprint,
    /// Same group and configuration, contradicting plan codes.
    PlanConflict,
}

impl Boundary {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Fingerprint => "fingerprint",
            Self::PlanConflict => "plan_conflict",
        }
    }
}

/// What happened to one pushed proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The proposal seeded a new accumulator.
    Opened(Boundary),
    /// The proposal was absorbed into the open accumulator.
    Merged {
        into: ProposalId,
        overlap: PlanOverlap,
    },
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationStats {
    pub input: usize,
    pub retained: usize,
    pub consumed: usize,
    pub group_boundaries: usize,
    pub fingerprint_boundaries: usize,
    pub conflict_boundaries: usize,
}

impl ConsolidationStats {
    fn count_boundary(&mut self, boundary: Boundary) {
        match boundary {
            Boundary::Group => self.group_boundaries += 1,
            Boundary::Fingerprint => self.fingerprint_boundaries += 1,
            Boundary::PlanConflict => self.conflict_boundaries += 1,
        }
    }
}

/// Retained proposal in progress.
#[derive(Debug)]
struct Accumulator {
    proposal: SourceProposal,
}

impl Accumulator {
    fn seed(proposal: SourceProposal) -> Self {
        Self { proposal }
    }

    fn id(&self) -> &ProposalId {
        &self.proposal.id
    }

    /// Widen both ranges and union both code sets. Descriptive attributes
    /// stay those of the seeding proposal.
    fn absorb(&mut self, record: &SourceProposal) {
        self.proposal.date_range.widen(&record.date_range);
        self.proposal
            .effective_date_range
            .widen(&record.effective_date_range);
        self.proposal.product_codes.union_with(&record.product_codes);
        self.proposal.plan_codes.union_with(&record.plan_codes);
    }

    fn close(self) -> RetainedProposal {
        RetainedProposal {
            proposal: self.proposal,
        }
    }
}

enum Decision {
    Open(Boundary),
    Merge(PlanOverlap),
}

/// Scan state for one consolidation run.
///
/// Proposals must be pushed in [`OrderingKey`] order; [`consolidate`] does the
/// sorting. The state is owned by one run and never shared.
#[derive(Debug, Default)]
pub struct Consolidator {
    current_group: Option<GroupId>,
    accumulator: Option<Accumulator>,
    trail: AuditTrail,
    stats: ConsolidationStats,
}

impl Consolidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next proposal in canonical order.
    pub fn push(&mut self, record: SourceProposal) -> Step {
        self.stats.input += 1;
        match self.decide(&record) {
            Decision::Open(boundary) => self.open(record, boundary),
            Decision::Merge(overlap) => self.merge(record, overlap),
        }
    }

    /// Why `id` was consumed so far in this run.
    pub fn reason_for(&self, id: &ProposalId) -> Option<&str> {
        self.trail.reason_for(id)
    }

    /// Flush the open accumulator and seal the audit trail.
    pub fn finish(mut self) -> Result<ConsolidationOutcome, ConsolidationError> {
        self.close();
        info!(
            input = self.stats.input,
            retained = self.stats.retained,
            consumed = self.stats.consumed,
            conflicts = self.stats.conflict_boundaries,
            "consolidation scan complete"
        );
        self.trail.seal(self.stats)
    }

    fn decide(&self, record: &SourceProposal) -> Decision {
        let Some(acc) = &self.accumulator else {
            return Decision::Open(Boundary::Group);
        };
        if self.current_group.as_ref() != Some(&record.group_id) {
            return Decision::Open(Boundary::Group);
        }
        if acc.proposal.split_config_fingerprint != record.split_config_fingerprint {
            return Decision::Open(Boundary::Fingerprint);
        }
        let overlap = classify(&acc.proposal.plan_codes, &record.plan_codes);
        if !overlap.is_compatible() {
            return Decision::Open(Boundary::PlanConflict);
        }
        Decision::Merge(overlap)
    }

    fn open(&mut self, record: SourceProposal, boundary: Boundary) -> Step {
        self.close();
        self.stats.count_boundary(boundary);
        debug!(
            key = %OrderingKey::of(&record).render(),
            boundary = boundary.as_str(),
            "opening accumulator"
        );
        self.current_group = Some(record.group_id.clone());
        self.accumulator = Some(Accumulator::seed(record));
        Step::Opened(boundary)
    }

    fn merge(&mut self, record: SourceProposal, overlap: PlanOverlap) -> Step {
        match &mut self.accumulator {
            Some(acc) => {
                acc.absorb(&record);
                let into = acc.id().clone();
                debug!(
                    consumed = %record.id,
                    retained = %into,
                    overlap = overlap.as_str(),
                    range = %acc.proposal.date_range,
                    "absorbed proposal"
                );
                self.trail.record_consumed(ConsumptionRecord {
                    consumed_id: record.id,
                    retained_id: into.clone(),
                    reason: MERGE_REASON.to_string(),
                });
                self.stats.consumed += 1;
                Step::Merged { into, overlap }
            }
            None => self.open(record, Boundary::Group),
        }
    }

    fn close(&mut self) {
        if let Some(acc) = self.accumulator.take() {
            self.trail.record_retained(acc.close());
            self.stats.retained += 1;
        }
    }
}

/// Consolidate a complete, unordered snapshot of source proposals.
///
/// Empty input yields an empty outcome. An error means the audit trail failed
/// its self-check and nothing from the run may be persisted.
pub fn consolidate(
    mut proposals: Vec<SourceProposal>,
) -> Result<ConsolidationOutcome, ConsolidationError> {
    info!(count = proposals.len(), "consolidating proposals");
    sort_proposals(&mut proposals);
    let mut consolidator = Consolidator::new();
    for proposal in proposals {
        consolidator.push(proposal);
    }
    consolidator.finish()
}

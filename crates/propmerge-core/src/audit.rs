//! Audit trail of a consolidation run.
//!
//! Every source proposal ends up either retained or consumed. Consumption
//! edges are flat: a consumed proposal always points at the retained proposal
//! that absorbed it, never at another consumed proposal.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::consolidate::ConsolidationStats;
use crate::error::ConsolidationError;
use crate::proposal::{ProposalId, RetainedProposal};

/// Reason recorded for every merge.
pub const MERGE_REASON: &str =
    "same split configuration, extended date range and accumulated products";

/// One absorbed source proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub consumed_id: ProposalId,
    pub retained_id: ProposalId,
    pub reason: String,
}

/// Bookkeeping for one run, filled by the consolidator as it scans.
#[derive(Debug, Default)]
pub struct AuditTrail {
    retained: Vec<RetainedProposal>,
    consumed: BTreeMap<ProposalId, ConsumptionRecord>,
    consumed_twice: Option<ProposalId>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_retained(&mut self, retained: RetainedProposal) {
        self.retained.push(retained);
    }

    pub fn record_consumed(&mut self, record: ConsumptionRecord) {
        let id = record.consumed_id.clone();
        if self.consumed.insert(id.clone(), record).is_some() && self.consumed_twice.is_none() {
            self.consumed_twice = Some(id);
        }
    }

    pub fn reason_for(&self, id: &ProposalId) -> Option<&str> {
        self.consumed.get(id).map(|r| r.reason.as_str())
    }

    /// Close the trail and check it before anything is handed out.
    pub fn seal(
        self,
        stats: ConsolidationStats,
    ) -> Result<ConsolidationOutcome, ConsolidationError> {
        if let Some(id) = self.consumed_twice {
            return Err(ConsolidationError::ConsumedTwice(id));
        }
        let outcome = ConsolidationOutcome {
            retained: self.retained,
            consumed: self.consumed,
            stats,
        };
        outcome.verify()?;
        Ok(outcome)
    }
}

/// The complete, checked result of one consolidation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationOutcome {
    /// Survivors in canonical order.
    pub retained: Vec<RetainedProposal>,
    /// Consumed id → the edge that absorbed it.
    pub consumed: BTreeMap<ProposalId, ConsumptionRecord>,
    #[serde(default)]
    pub stats: ConsolidationStats,
}

impl ConsolidationOutcome {
    /// Why `id` was consumed. `None` for retained or unknown ids.
    pub fn reason_for(&self, id: &ProposalId) -> Option<&str> {
        self.consumed.get(id).map(|r| r.reason.as_str())
    }

    pub fn is_retained(&self, id: &ProposalId) -> bool {
        self.retained.iter().any(|r| r.id() == id)
    }

    pub fn retained_ids(&self) -> impl Iterator<Item = &ProposalId> {
        self.retained.iter().map(RetainedProposal::id)
    }

    /// Consumed ids grouped by the retained proposal that absorbed them.
    /// Retained proposals that absorbed nothing map to an empty list.
    pub fn retained_by(&self) -> BTreeMap<&ProposalId, Vec<&ProposalId>> {
        let mut map: BTreeMap<&ProposalId, Vec<&ProposalId>> =
            self.retained_ids().map(|id| (id, Vec::new())).collect();
        for record in self.consumed.values() {
            map.entry(&record.retained_id)
                .or_default()
                .push(&record.consumed_id);
        }
        map
    }

    /// Check identifier uniqueness and referential completeness.
    pub fn verify(&self) -> Result<(), ConsolidationError> {
        let mut retained: HashSet<&ProposalId> = HashSet::with_capacity(self.retained.len());
        for id in self.retained_ids() {
            if !retained.insert(id) {
                return Err(ConsolidationError::DuplicateRetained(id.clone()));
            }
        }
        for (key, record) in &self.consumed {
            if retained.contains(key) {
                return Err(ConsolidationError::RetainedAndConsumed(key.clone()));
            }
            if !retained.contains(&record.retained_id) {
                return Err(ConsolidationError::DanglingConsumption {
                    consumed: key.clone(),
                    retained: record.retained_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check that the outcome accounts for exactly the given input ids.
    pub fn check_partition<'a, I>(&self, input_ids: I) -> Result<(), ConsolidationError>
    where
        I: IntoIterator<Item = &'a ProposalId>,
    {
        let input: BTreeSet<&ProposalId> = input_ids.into_iter().collect();
        let output: BTreeSet<&ProposalId> =
            self.retained_ids().chain(self.consumed.keys()).collect();
        let missing = input.difference(&output).count();
        let unexpected = output.difference(&input).count();
        if missing > 0 || unexpected > 0 {
            return Err(ConsolidationError::PartitionMismatch {
                missing,
                unexpected,
            });
        }
        Ok(())
    }
}

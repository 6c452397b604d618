//! Proposal consolidation engine.
//!
//! Collapses a snapshot of commission-split proposals into the minimal set of
//! non-conflicting, maximal-interval proposals and records which source
//! proposals were absorbed into which survivor.

pub mod audit;
pub mod conflict;
pub mod consolidate;
pub mod error;
pub mod proposal;
pub mod sort_key;

pub use audit::{AuditTrail, ConsolidationOutcome, ConsumptionRecord, MERGE_REASON};
pub use conflict::{PlanOverlap, classify, compatible};
pub use consolidate::{Boundary, ConsolidationStats, Consolidator, Step, consolidate};
pub use error::ConsolidationError;
pub use proposal::{
    CodeSet, DateRange, GroupId, ProposalId, RetainedProposal, SourceProposal, WILDCARD,
};
pub use sort_key::{OrderingKey, sort_proposals};

//! Plan-code conflict detection.
//!
//! Two proposals with the same group and fingerprint may only be merged when
//! their plan codes do not contradict each other. A contradiction is a
//! partial overlap: the sets share some codes but are not identical. Disjoint
//! sets are not a contradiction and remain mergeable.

use crate::proposal::CodeSet;

/// How two plan-code sets relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOverlap {
    /// At least one side is the match-all wildcard.
    Wildcard,
    /// No code in common.
    Disjoint,
    /// Both sets hold exactly the same codes.
    Identical,
    /// Some codes in common, some not.
    Partial,
}

impl PlanOverlap {
    pub fn is_compatible(self) -> bool {
        !matches!(self, Self::Partial)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wildcard => "wildcard",
            Self::Disjoint => "disjoint",
            Self::Identical => "identical",
            Self::Partial => "partial",
        }
    }
}

/// Classify the relation between two plan-code sets.
pub fn classify(a: &CodeSet, b: &CodeSet) -> PlanOverlap {
    let (a, b) = match (a, b) {
        (CodeSet::MatchAll, _) | (_, CodeSet::MatchAll) => return PlanOverlap::Wildcard,
        (CodeSet::Codes(a), CodeSet::Codes(b)) => (a, b),
    };
    if a.is_disjoint(b) {
        return PlanOverlap::Disjoint;
    }
    if a == b {
        return PlanOverlap::Identical;
    }
    PlanOverlap::Partial
}

/// Whether two plan-code sets may be merged into one proposal.
pub fn compatible(a: &CodeSet, b: &CodeSet) -> bool {
    classify(a, b).is_compatible()
}

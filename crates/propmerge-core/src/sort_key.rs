//! Canonical ordering for source proposals.
//!
//! The consolidation scan only merges neighbours, so the order it walks is
//! part of the result. Proposals are ordered by:
//!
//! 1. group id
//! 2. effective date range start
//! 3. split configuration fingerprint (missing fingerprint sorts as `""`)
//! 4. proposal id, so that equal keys never depend on input order
//!
//! The first proposal of every run of mergeable neighbours becomes the
//! survivor, which makes the tie-break on id observable.

use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::proposal::{GroupId, ProposalId, SourceProposal};

/// Borrowed sort key of one proposal. Field order is comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderingKey<'a> {
    pub group_id: &'a GroupId,
    pub effective_from: NaiveDate,
    pub fingerprint: &'a str,
    pub id: &'a ProposalId,
}

impl<'a> OrderingKey<'a> {
    pub fn of(proposal: &'a SourceProposal) -> Self {
        Self {
            group_id: &proposal.group_id,
            effective_from: proposal.effective_date_range.from,
            fingerprint: proposal.fingerprint(),
            id: &proposal.id,
        }
    }

    /// Text form for logs: `group|YYYY-MM-DD|fingerprint|id`.
    ///
    /// Sorts the same way as the key as long as no component contains `|`.
    pub fn render(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.group_id,
            self.effective_from.format("%Y-%m-%d"),
            self.fingerprint,
            self.id
        )
    }
}

/// Compare two proposals by their ordering key.
pub fn compare(a: &SourceProposal, b: &SourceProposal) -> Ordering {
    OrderingKey::of(a).cmp(&OrderingKey::of(b))
}

/// Sort proposals into canonical consolidation order.
pub fn sort_proposals(proposals: &mut [SourceProposal]) {
    proposals.sort_by(compare);
}

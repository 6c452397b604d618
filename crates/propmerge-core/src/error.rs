use thiserror::Error;

use crate::proposal::ProposalId;

/// Invariant violations detected while sealing a consolidation run.
///
/// All of these are fatal: the run produces no output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsolidationError {
    #[error("proposal {0} was retained more than once")]
    DuplicateRetained(ProposalId),

    #[error("proposal {0} was consumed more than once")]
    ConsumedTwice(ProposalId),

    #[error("proposal {0} is both retained and consumed")]
    RetainedAndConsumed(ProposalId),

    #[error("proposal {consumed} points at {retained}, which is not a retained proposal")]
    DanglingConsumption {
        consumed: ProposalId,
        retained: ProposalId,
    },

    #[error("outcome does not cover the input: {missing} missing, {unexpected} unexpected")]
    PartitionMismatch { missing: usize, unexpected: usize },
}

//! Error types for placement and traversal.

use kelp_types::ContainerId;

/// Errors raised while resolving candidates or driving a traversal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("placement resolved to no candidate nodes")]
    NoCandidates,

    #[error("no placement policy for container {0}")]
    UnknownContainer(ContainerId),

    #[error("quorum unreachable in replica group {group}: {succeeded}/{required} succeeded")]
    QuorumUnreachable {
        group: usize,
        required: usize,
        succeeded: usize,
    },
}

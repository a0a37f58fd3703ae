//! Error types for the engine.

use kelp_net::NetError;
use kelp_placement::PlacementError;
use kelp_types::{Address, ContainerId, EncodeError, NodeId};

/// Errors that can occur during object operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// No contacted node holds the object.
    #[error("object {0} not found")]
    NotFound(Address),

    /// The object is covered by a tombstone.
    #[error("object {address} already removed")]
    AlreadyRemoved {
        address: Address,
        tombstone: Option<Address>,
    },

    /// A node refused the request.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A node answered with data that does not match the request.
    #[error("malformed response from {node}: {reason}")]
    MalformedResponse { node: NodeId, reason: String },

    /// Too few nodes succeeded for the placement policy.
    #[error("quorum unreachable in replica group {group}: {succeeded}/{required} succeeded")]
    QuorumUnreachable {
        group: usize,
        required: usize,
        succeeded: usize,
    },

    /// The split chain of a virtual object is cyclic, too deep, or broken.
    #[error("malformed split chain: {0}")]
    MalformedChain(String),

    /// The operation deadline passed.
    #[error("operation timed out")]
    Timeout,

    /// The placement policy resolved to no nodes.
    #[error("no candidate nodes for placement")]
    NoCandidates,

    /// No placement policy is known for the container.
    #[error("unknown container {0}")]
    UnknownContainer(ContainerId),

    /// The request arrived with no hops left.
    #[error("request TTL expired")]
    TtlExpired,

    /// The request lacks something the operation needs.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    /// Encoding or decoding of an object structure failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] EncodeError),

    /// A node-level failure surfaced directly.
    #[error("network error: {0}")]
    Net(NetError),
}

impl ObjectError {
    /// Errors that abort an operation even where node failures are tolerated.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ObjectError::AccessDenied(_) | ObjectError::Timeout)
    }
}

impl From<PlacementError> for ObjectError {
    fn from(e: PlacementError) -> Self {
        match e {
            PlacementError::NoCandidates => ObjectError::NoCandidates,
            PlacementError::UnknownContainer(container) => ObjectError::UnknownContainer(container),
            PlacementError::QuorumUnreachable {
                group,
                required,
                succeeded,
            } => ObjectError::QuorumUnreachable {
                group,
                required,
                succeeded,
            },
        }
    }
}

impl From<NetError> for ObjectError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::AccessDenied { node, reason } => {
                ObjectError::AccessDenied(format!("{node}: {reason}"))
            }
            NetError::Malformed { node, reason } | NetError::StreamOrder { node, reason } => {
                ObjectError::MalformedResponse { node, reason }
            }
            other => ObjectError::Net(other),
        }
    }
}

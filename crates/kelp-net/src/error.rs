//! Error types for per-node object calls.

use kelp_types::NodeId;

/// Errors that can occur while talking to one storage node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetError {
    /// The node refused the request (ACL or token check failed).
    #[error("access denied by {node}: {reason}")]
    AccessDenied { node: NodeId, reason: String },

    /// The node could not be reached.
    #[error("node {0} unreachable")]
    Unreachable(NodeId),

    /// The node answered with something that violates the protocol.
    #[error("malformed response from {node}: {reason}")]
    Malformed { node: NodeId, reason: String },

    /// A put stream message was sent out of order.
    #[error("put stream to {node} out of order: {reason}")]
    StreamOrder { node: NodeId, reason: String },

    /// The stream was closed unexpectedly.
    #[error("stream closed")]
    StreamClosed,

    /// The node reported a failure of its own.
    #[error("remote error from {node}: {reason}")]
    Remote { node: NodeId, reason: String },
}

impl NetError {
    /// Whether this is an authorization failure.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, NetError::AccessDenied { .. })
    }

    /// Node the error came from, when known.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            NetError::AccessDenied { node, .. }
            | NetError::Malformed { node, .. }
            | NetError::StreamOrder { node, .. }
            | NetError::Remote { node, .. } => Some(*node),
            NetError::Unreachable(node) => Some(*node),
            NetError::StreamClosed => None,
        }
    }
}

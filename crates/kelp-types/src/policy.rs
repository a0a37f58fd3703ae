//! Container placement policies.

use serde::{Deserialize, Serialize};

/// One replica group of a placement policy: `count` copies, and the number
/// of confirmations a tracked write needs from the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaGroup {
    /// Number of replicas to keep in this group.
    pub count: u32,
    /// Confirmations needed; defaults to `count`.
    pub quorum: Option<u32>,
}

impl ReplicaGroup {
    /// Effective quorum of the group.
    pub fn quorum(&self) -> u32 {
        self.quorum.unwrap_or(self.count)
    }
}

/// Storage policy attached to a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    /// Replica groups, in traversal order.
    pub replicas: Vec<ReplicaGroup>,
    /// Multiplier on each group's size: nodes beyond `count` are backups
    /// tried when a primary fails.
    pub backup_factor: u32,
}

impl PlacementPolicy {
    /// A single group of `n` replicas with full quorum.
    pub fn rep(n: u32) -> Self {
        Self {
            replicas: vec![ReplicaGroup {
                count: n,
                quorum: None,
            }],
            backup_factor: 1,
        }
    }

    /// Builder-style backup factor setter.
    pub fn with_backup_factor(mut self, factor: u32) -> Self {
        self.backup_factor = factor.max(1);
        self
    }

    /// Append a replica group.
    pub fn and_group(mut self, count: u32, quorum: Option<u32>) -> Self {
        self.replicas.push(ReplicaGroup { count, quorum });
        self
    }
}

//! Immutable topology snapshot and container candidate selection.

use kelp_types::{ContainerId, NodeId, ObjectId, PlacementPolicy};

use crate::ring::{Ring, hash_position};
use crate::traverser::Selection;

/// A point-in-time view of the storage network.
///
/// Snapshots are never mutated; the topology maintainer builds a new one
/// and swaps it into the [`PlacementMap`](crate::PlacementMap).
#[derive(Debug, Clone)]
pub struct Topology {
    epoch: u64,
    ring: Ring,
}

impl Topology {
    /// Wrap a ring observed at `epoch`.
    pub fn new(epoch: u64, ring: Ring) -> Self {
        Self { epoch, ring }
    }

    /// Network epoch this snapshot was taken at.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Underlying ring.
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    /// Nodes of every replica group of `container`, in ring order.
    ///
    /// Group `i` takes `count × backup_factor` distinct nodes clockwise from
    /// `blake3(container ‖ i)`.
    pub fn container_nodes(
        &self,
        container: &ContainerId,
        policy: &PlacementPolicy,
        backup_factor: u32,
    ) -> Vec<Vec<NodeId>> {
        policy
            .replicas
            .iter()
            .enumerate()
            .map(|(index, group)| {
                let mut key = Vec::with_capacity(40);
                key.extend_from_slice(container.as_ref());
                key.extend_from_slice(&(index as u64).to_le_bytes());
                let wanted = group.count as usize * backup_factor.max(1) as usize;
                self.ring.owners(&key, wanted)
            })
            .collect()
    }

    /// Candidate selections for an object of `container`.
    ///
    /// When `object` is given, each group is reordered by rendezvous weight
    /// `blake3(node ‖ object)` so that objects of one container start on
    /// different nodes.
    pub fn selections(
        &self,
        container: &ContainerId,
        policy: &PlacementPolicy,
        backup_factor: u32,
        object: Option<&ObjectId>,
    ) -> Vec<Selection> {
        self.container_nodes(container, policy, backup_factor)
            .into_iter()
            .zip(policy.replicas.iter())
            .map(|(mut nodes, group)| {
                if let Some(object) = object {
                    nodes.sort_by_key(|node| std::cmp::Reverse(rendezvous_weight(node, object)));
                }
                Selection::new(nodes, group.quorum() as usize)
            })
            .collect()
    }
}

fn rendezvous_weight(node: &NodeId, object: &ObjectId) -> u64 {
    let mut input = Vec::with_capacity(64);
    input.extend_from_slice(node.as_ref());
    input.extend_from_slice(object.as_ref());
    hash_position(&input)
}

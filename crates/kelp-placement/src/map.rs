//! Placement map: current topology and container policies.
//!
//! [`PlacementMap`] is the shared, read-mostly structure the engine asks for
//! candidate nodes. The topology is held as an `Arc` snapshot: a traversal
//! works on the snapshot it started with even if the topology maintainer
//! swaps in a new one mid-operation.

use std::collections::HashMap;
use std::sync::Arc;

use kelp_types::{ContainerId, NodeId, ObjectId, PlacementPolicy};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::PlacementError;
use crate::ring::Ring;
use crate::topology::Topology;
use crate::traverser::Selection;

/// Shared placement state for one coordinator node.
pub struct PlacementMap {
    /// This node's identifier.
    local_node: NodeId,
    /// Current topology snapshot.
    topology: RwLock<Arc<Topology>>,
    /// Placement policy per container.
    policies: RwLock<HashMap<ContainerId, PlacementPolicy>>,
    /// Vnodes per node when building rings from a plain node list.
    vnodes_per_node: u16,
    /// Lower bound applied to every policy's backup factor.
    backup_factor: u32,
}

impl PlacementMap {
    /// Create an empty map (epoch 0, no nodes, no containers).
    pub fn new(local_node: NodeId, vnodes_per_node: u16, backup_factor: u32) -> Arc<Self> {
        Arc::new(Self {
            local_node,
            topology: RwLock::new(Arc::new(Topology::new(0, Ring::new(vnodes_per_node)))),
            policies: RwLock::new(HashMap::new()),
            vnodes_per_node,
            backup_factor: backup_factor.max(1),
        })
    }

    /// Return this node's ID.
    pub fn local_node(&self) -> NodeId {
        self.local_node
    }

    /// Replace the topology snapshot.
    pub async fn update_topology(&self, topology: Topology) {
        let epoch = topology.epoch();
        let nodes = topology.ring().node_count();
        *self.topology.write().await = Arc::new(topology);
        info!(epoch, nodes, "topology updated");
    }

    /// Replace the topology with a ring of `nodes` at `epoch`.
    pub async fn set_nodes(&self, epoch: u64, nodes: impl IntoIterator<Item = NodeId>) {
        let ring = Ring::with_nodes(self.vnodes_per_node, nodes);
        self.update_topology(Topology::new(epoch, ring)).await;
    }

    /// Current topology snapshot.
    pub async fn topology(&self) -> Arc<Topology> {
        self.topology.read().await.clone()
    }

    /// Epoch of the current topology.
    pub async fn epoch(&self) -> u64 {
        self.topology.read().await.epoch()
    }

    /// Attach a placement policy to a container.
    pub async fn set_policy(&self, container: ContainerId, policy: PlacementPolicy) {
        debug!(%container, groups = policy.replicas.len(), "container policy set");
        self.policies.write().await.insert(container, policy);
    }

    /// Forget a container's policy.
    pub async fn remove_policy(&self, container: &ContainerId) {
        self.policies.write().await.remove(container);
    }

    /// Policy of a container, if known.
    pub async fn policy(&self, container: &ContainerId) -> Option<PlacementPolicy> {
        self.policies.read().await.get(container).cloned()
    }

    /// Candidate selections for `container` (ordered for `object` when given).
    ///
    /// With `local_only`, the only candidate is this node, provided it
    /// belongs to the container.
    pub async fn selections(
        &self,
        container: &ContainerId,
        object: Option<&ObjectId>,
        local_only: bool,
    ) -> Result<Vec<Selection>, PlacementError> {
        let policy = self
            .policy(container)
            .await
            .ok_or(PlacementError::UnknownContainer(*container))?;
        let topology = self.topology().await;
        let backup_factor = policy.backup_factor.max(self.backup_factor);

        if local_only {
            let member = topology
                .container_nodes(container, &policy, backup_factor)
                .iter()
                .any(|group| group.contains(&self.local_node));
            if !member {
                return Err(PlacementError::NoCandidates);
            }
            return Ok(vec![Selection::new(vec![self.local_node], 1)]);
        }

        let selections = topology.selections(container, &policy, backup_factor, object);
        if selections.iter().all(|s| s.nodes.is_empty()) {
            return Err(PlacementError::NoCandidates);
        }
        Ok(selections)
    }
}

//! Shared test harness for Kelp integration tests.
//!
//! Provides [`IntegrationCluster`]: N coordinator nodes over one in-memory
//! storage network. Every node has its own placement map (same topology,
//! different local node) and its own [`ObjectService`], so any node can
//! coordinate any operation, as in a real deployment.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use kelp_engine::{CoordinatorConfig, ManualEpoch, ObjectService};
use kelp_net::MemoryNetwork;
use kelp_placement::PlacementMap;
use kelp_types::{Address, ContainerId, NodeId, Object, OwnerId, PlacementPolicy};

/// Topology epoch the cluster starts in.
pub const START_EPOCH: u64 = 100;

/// N coordinator nodes sharing one memory network.
pub struct IntegrationCluster {
    network: Arc<MemoryNetwork>,
    epochs: Arc<ManualEpoch>,
    nodes: Vec<NodeId>,
    services: Vec<ObjectService>,
    placements: Vec<Arc<PlacementMap>>,
    container: ContainerId,
    owner: OwnerId,
}

impl IntegrationCluster {
    /// `n` nodes, one container stored with `policy`, default config.
    pub async fn new(n: usize, policy: PlacementPolicy) -> Self {
        Self::with_config(n, policy, CoordinatorConfig::default()).await
    }

    /// `n` nodes with an explicit coordinator config.
    pub async fn with_config(n: usize, policy: PlacementPolicy, config: CoordinatorConfig) -> Self {
        let nodes: Vec<NodeId> = (0..n)
            .map(|i| NodeId::from_data(format!("kelp-node-{i}").as_bytes()))
            .collect();
        let network = Arc::new(MemoryNetwork::with_nodes(nodes.iter().copied()));
        let epochs = Arc::new(ManualEpoch::new(START_EPOCH));
        let container = ContainerId::from_data(b"integration-container");
        let owner = OwnerId::from_data(b"integration-owner");

        let mut services = Vec::with_capacity(n);
        let mut placements = Vec::with_capacity(n);
        for &node in &nodes {
            let placement = PlacementMap::new(
                node,
                config.placement.vnodes_per_node,
                config.placement.backup_factor,
            );
            placement.set_nodes(START_EPOCH, nodes.iter().copied()).await;
            placement.set_policy(container, policy.clone()).await;

            services.push(ObjectService::with_epoch_source(
                config.clone(),
                placement.clone(),
                network.clone(),
                owner,
                epochs.clone(),
            ));
            placements.push(placement);
        }

        Self {
            network,
            epochs,
            nodes,
            services,
            placements,
            container,
            owner,
        }
    }

    /// Coordinator running on node `i`.
    pub fn node(&self, i: usize) -> &ObjectService {
        &self.services[i]
    }

    pub fn node_id(&self, i: usize) -> NodeId {
        self.nodes[i]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    pub fn epochs(&self) -> &Arc<ManualEpoch> {
        &self.epochs
    }

    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// Make node `i` unreachable.
    pub fn kill_node(&self, i: usize) {
        self.network.set_down(&self.nodes[i], true);
    }

    /// Make node `i` reachable again.
    pub fn revive_node(&self, i: usize) {
        self.network.set_down(&self.nodes[i], false);
    }

    /// Make node `i` refuse every request.
    pub fn deny_node(&self, i: usize) {
        self.network.set_denied(&self.nodes[i], true);
    }

    /// Slow every answer of node `i`.
    pub fn slow_node(&self, i: usize, latency: Duration) {
        self.network.set_latency(&self.nodes[i], latency);
    }

    /// Replace the container's policy on every node.
    pub async fn set_policy(&self, policy: PlacementPolicy) {
        for placement in &self.placements {
            placement.set_policy(self.container, policy.clone()).await;
        }
    }

    /// Number of nodes storing `address`.
    pub fn copies(&self, address: &Address) -> usize {
        self.nodes
            .iter()
            .filter(|n| self.network.holds(n, address))
            .count()
    }

    /// Number of nodes that consider `address` removed.
    pub fn removed_on(&self, address: &Address) -> usize {
        self.nodes
            .iter()
            .filter(|n| self.network.is_removed(n, address))
            .count()
    }

    /// A regular object in the cluster's container.
    pub fn object(&self, name: &str, payload: impl Into<Bytes>) -> Object {
        Object::builder(self.container, self.owner)
            .epoch(START_EPOCH)
            .attribute("name", name)
            .payload(payload)
    }

    /// Store `object` straight onto node `i`, bypassing any coordinator.
    pub fn seed(&self, i: usize, object: &Object) -> anyhow::Result<Address> {
        self.network
            .seed(&self.nodes[i], object)
            .with_context(|| format!("seeding node {i}"))
    }
}

/// Generate deterministic pseudo-random data from a seed.
pub fn test_data_seeded(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

//! Shared test utilities for kelp-engine tests.

use std::sync::Arc;

use kelp_net::MemoryNetwork;
use kelp_placement::PlacementMap;
use kelp_types::split::{SplitLayout, split_object};
use kelp_types::{
    Address, CommonParams, ContainerId, NodeId, Object, ObjectId, OwnerId, PlacementPolicy,
    SplitId,
};

use crate::config::CoordinatorConfig;
use crate::context::ExecutionContext;
use crate::delete::DeleteCoordinator;
use crate::epoch::ManualEpoch;
use crate::get::ObjectReader;
use crate::head::HeadResolver;
use crate::put::PutStreamer;
use crate::search::SearchExecutor;
use crate::service::ObjectService;
use crate::split::SplitWalker;

pub fn container() -> ContainerId {
    ContainerId::from([7; 32])
}

pub fn owner() -> OwnerId {
    OwnerId::from([9; 32])
}

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

pub fn node(n: u8) -> NodeId {
    NodeId::from([n; 32])
}

/// Config with a short deadline so stuck tests fail fast.
pub fn test_config() -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.coordinator.operation_timeout_ms = 5_000;
    config.split.payload_chunk_size = 1024;
    config
}

/// A memory network of `n` nodes sharing one placement map, seen from node 1.
pub struct TestCluster {
    pub network: Arc<MemoryNetwork>,
    pub placement: Arc<PlacementMap>,
    pub epochs: Arc<ManualEpoch>,
    pub config: CoordinatorConfig,
    pub nodes: Vec<NodeId>,
}

impl TestCluster {
    pub async fn new(n: u8, policy: PlacementPolicy) -> Self {
        Self::with_config(n, policy, test_config()).await
    }

    pub async fn with_config(n: u8, policy: PlacementPolicy, config: CoordinatorConfig) -> Self {
        let nodes: Vec<NodeId> = (1..=n).map(node).collect();
        let network = Arc::new(MemoryNetwork::with_nodes(nodes.iter().copied()));
        let placement = PlacementMap::new(
            nodes[0],
            config.placement.vnodes_per_node,
            config.placement.backup_factor,
        );
        placement.set_nodes(10, nodes.iter().copied()).await;
        placement.set_policy(container(), policy).await;

        Self {
            network,
            placement,
            epochs: Arc::new(ManualEpoch::new(10)),
            config,
            nodes,
        }
    }

    pub fn ctx(&self, target: Option<ObjectId>) -> ExecutionContext {
        self.ctx_with(target, CommonParams::default())
    }

    pub fn ctx_with(&self, target: Option<ObjectId>, params: CommonParams) -> ExecutionContext {
        let ctx = ExecutionContext::new(container(), owner(), params, &self.config).unwrap();
        match target {
            Some(object) => ctx.with_target(object),
            None => ctx,
        }
    }

    pub fn heads(&self) -> HeadResolver {
        HeadResolver::new(self.placement.clone(), self.network.clone())
    }

    pub fn search(&self) -> SearchExecutor {
        SearchExecutor::new(self.placement.clone(), self.network.clone())
    }

    pub fn put(&self) -> PutStreamer {
        PutStreamer::new(
            self.placement.clone(),
            self.network.clone(),
            self.config.split.payload_chunk_size,
        )
    }

    pub fn walker(&self) -> SplitWalker {
        SplitWalker::new(self.heads(), self.config.split.max_split_chain_depth)
    }

    pub fn reader(&self) -> ObjectReader {
        ObjectReader::new(self.placement.clone(), self.network.clone(), self.walker())
    }

    pub fn deleter(&self) -> DeleteCoordinator {
        DeleteCoordinator::new(
            self.heads(),
            self.search(),
            self.walker(),
            self.reader(),
            self.put(),
            self.epochs.clone(),
            self.config.tombstone.lifetime_epochs,
        )
    }

    pub fn service(&self) -> ObjectService {
        ObjectService::with_epoch_source(
            self.config.clone(),
            self.placement.clone(),
            self.network.clone(),
            owner(),
            self.epochs.clone(),
        )
    }

    /// Store `object` directly on every node.
    pub fn seed_everywhere(&self, object: &Object) -> Address {
        let mut address = None;
        for node in &self.nodes {
            address = Some(self.network.seed(node, object).unwrap());
        }
        address.unwrap()
    }

    /// Store every part of `layout` on every node.
    pub fn seed_layout(&self, layout: &SplitLayout) {
        for object in layout.objects() {
            self.seed_everywhere(object);
        }
    }
}

/// A regular object in the test container.
pub fn object(payload: impl Into<bytes::Bytes>) -> Object {
    Object::builder(container(), owner()).epoch(10).payload(payload)
}

/// An object with a distinguishing attribute.
pub fn tagged(tag: &str, payload: impl Into<bytes::Bytes>) -> Object {
    Object::builder(container(), owner())
        .epoch(10)
        .attribute("tag", tag)
        .payload(payload)
}

/// Split `object` into chunks of `max` bytes.
pub fn split(object: &Object, max: usize) -> SplitLayout {
    split_object(object, max, SplitId::random()).unwrap()
}

pub fn addr(id: ObjectId) -> Address {
    Address::new(container(), id)
}

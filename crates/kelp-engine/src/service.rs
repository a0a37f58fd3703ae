//! [`ObjectService`]: the coordinator facade.
//!
//! Owns one instance of every component, wired to a shared placement map
//! and a network, and builds a fresh [`ExecutionContext`] per call.

use std::collections::BTreeSet;
use std::sync::Arc;

use kelp_net::ObjectNetwork;
use kelp_placement::PlacementMap;
use kelp_types::split::split_object;
use kelp_types::{
    Address, CommonParams, ContainerId, NodeId, Object, ObjectId, OwnerId, SearchFilter, SplitId,
};
use tracing::{debug, info};

use crate::config::CoordinatorConfig;
use crate::context::ExecutionContext;
use crate::delete::{DeleteCoordinator, DeleteOutcome};
use crate::engine::ObjectEngine;
use crate::epoch::EpochSource;
use crate::error::ObjectError;
use crate::get::ObjectReader;
use crate::head::{HeadOutcome, HeadResolver};
use crate::put::{PutOutcome, PutStreamer};
use crate::search::SearchExecutor;
use crate::split::SplitWalker;

/// Object lifecycle coordinator for one node.
pub struct ObjectService {
    config: CoordinatorConfig,
    placement: Arc<PlacementMap>,
    /// Principal objects are attributed to when a request has no session.
    owner: OwnerId,
    heads: HeadResolver,
    search: SearchExecutor,
    put: PutStreamer,
    reader: ObjectReader,
    deleter: DeleteCoordinator,
}

impl ObjectService {
    /// Create a service over `network`, taking epochs from the placement map.
    pub fn new<N>(
        config: CoordinatorConfig,
        placement: Arc<PlacementMap>,
        network: Arc<N>,
        owner: OwnerId,
    ) -> Self
    where
        N: ObjectNetwork + 'static,
    {
        let epochs: Arc<dyn EpochSource> = placement.clone();
        Self::with_epoch_source(config, placement, network, owner, epochs)
    }

    /// Create a service with an explicit epoch source.
    pub fn with_epoch_source<N>(
        config: CoordinatorConfig,
        placement: Arc<PlacementMap>,
        network: Arc<N>,
        owner: OwnerId,
        epochs: Arc<dyn EpochSource>,
    ) -> Self
    where
        N: ObjectNetwork + 'static,
    {
        let heads = HeadResolver::new(placement.clone(), network.clone());
        let search = SearchExecutor::new(placement.clone(), network.clone());
        let put = PutStreamer::new(
            placement.clone(),
            network.clone(),
            config.split.payload_chunk_size,
        );
        let walker = SplitWalker::new(heads.clone(), config.split.max_split_chain_depth);
        let reader = ObjectReader::new(placement.clone(), network, walker.clone());
        let deleter = DeleteCoordinator::new(
            heads.clone(),
            search.clone(),
            walker,
            reader.clone(),
            put.clone(),
            epochs,
            config.tombstone.lifetime_epochs,
        );

        Self {
            config,
            placement,
            owner,
            heads,
            search,
            put,
            reader,
            deleter,
        }
    }

    /// This node's id.
    pub fn node_id(&self) -> NodeId {
        self.placement.local_node()
    }

    pub fn placement(&self) -> &Arc<PlacementMap> {
        &self.placement
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Request parameters with the configured default TTL.
    pub fn default_params(&self) -> CommonParams {
        CommonParams::default().with_ttl(self.config.coordinator.default_ttl)
    }

    /// Build a context for one operation.
    pub fn context(
        &self,
        container: ContainerId,
        target: Option<ObjectId>,
        params: CommonParams,
    ) -> Result<ExecutionContext, ObjectError> {
        let ctx = ExecutionContext::new(container, self.owner, params, &self.config)?;
        Ok(match target {
            Some(object) => ctx.with_target(object),
            None => ctx,
        })
    }

    /// Store a payload over `max_object_size` as a split chain plus link.
    async fn put_split(
        &self,
        ctx: &ExecutionContext,
        object: &Object,
    ) -> Result<PutOutcome, ObjectError> {
        let layout = split_object(object, self.config.split.max_object_size, SplitId::random())?;
        debug!(
            parent = %layout.parent_id,
            chunks = layout.chunks.len(),
            "storing object as split chain"
        );

        let mut failures = Vec::new();
        let mut stored_on = Vec::new();
        for part in layout.objects() {
            let outcome = self.put.put(ctx, part, false).await?;
            failures.extend(outcome.failures);
            stored_on = outcome.stored_on;
        }

        info!(parent = %layout.parent_id, chunks = layout.chunks.len(), "split put complete");
        Ok(PutOutcome {
            object_id: layout.parent_id,
            stored_on,
            failures,
        })
    }
}

#[async_trait::async_trait]
impl ObjectEngine for ObjectService {
    async fn put(&self, object: Object, params: CommonParams) -> Result<PutOutcome, ObjectError> {
        let id = object.id()?;
        let ctx = self.context(object.header.container, Some(id), params)?;
        if object.payload.len() > self.config.split.max_object_size {
            return self.put_split(&ctx, &object).await;
        }
        self.put.put(&ctx, &object, false).await
    }

    async fn get(&self, address: Address, params: CommonParams) -> Result<Object, ObjectError> {
        let ctx = self.context(address.container, Some(address.object), params)?;
        self.reader.get(&ctx, address).await
    }

    async fn head(
        &self,
        address: Address,
        params: CommonParams,
    ) -> Result<HeadOutcome, ObjectError> {
        let ctx = self.context(address.container, Some(address.object), params)?;
        self.heads.resolve(&ctx, address).await
    }

    async fn search(
        &self,
        container: ContainerId,
        filters: Vec<SearchFilter>,
        params: CommonParams,
    ) -> Result<BTreeSet<ObjectId>, ObjectError> {
        let ctx = self.context(container, None, params)?;
        self.search.search(&ctx, container, &filters).await
    }

    async fn delete(
        &self,
        address: Address,
        params: CommonParams,
    ) -> Result<DeleteOutcome, ObjectError> {
        let ctx = self.context(address.container, Some(address.object), params)?;
        self.deleter.delete(&ctx).await
    }
}

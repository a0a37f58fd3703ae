//! Per-operation execution context.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use kelp_placement::{PlacementError, Selection, TraversalMode, Traverser};
use kelp_types::{Address, CommonParams, ContainerId, NodeId, ObjectId, OwnerId, SplitInfo};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::config::CoordinatorConfig;
use crate::error::ObjectError;

/// Everything one operation carries from start to finish: target, request
/// parameters, deadline, fan-out limiter and the split info learned on the
/// way. Built per call and dropped with it.
#[derive(Debug)]
pub struct ExecutionContext {
    container: ContainerId,
    target: Option<ObjectId>,
    owner: OwnerId,
    params: CommonParams,
    deadline: Instant,
    limiter: Arc<Semaphore>,
    /// Nodes no traversal of this operation may contact.
    excluded: Vec<NodeId>,
    split_info: OnceLock<SplitInfo>,
}

impl ExecutionContext {
    /// Create a context for an operation on `container`.
    ///
    /// `owner` is the principal objects created by this operation are
    /// attributed to when the request carries no session token. Fails with
    /// [`ObjectError::TtlExpired`] if the request has no hops left.
    pub fn new(
        container: ContainerId,
        owner: OwnerId,
        params: CommonParams,
        config: &CoordinatorConfig,
    ) -> Result<Self, ObjectError> {
        if params.ttl == 0 {
            return Err(ObjectError::TtlExpired);
        }
        Ok(Self {
            container,
            target: None,
            owner: params.effective_owner(owner),
            params,
            deadline: Instant::now() + config.operation_timeout(),
            limiter: Arc::new(Semaphore::new(config.coordinator.max_concurrency.max(1))),
            excluded: Vec::new(),
            split_info: OnceLock::new(),
        })
    }

    /// Context targeting one address.
    pub fn for_address(
        address: Address,
        owner: OwnerId,
        params: CommonParams,
        config: &CoordinatorConfig,
    ) -> Result<Self, ObjectError> {
        Ok(Self::new(address.container, owner, params, config)?.with_target(address.object))
    }

    /// Set the target object.
    pub fn with_target(mut self, object: ObjectId) -> Self {
        self.target = Some(object);
        self
    }

    /// Override the deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }

    /// Keep every traversal of this operation away from `nodes`.
    pub fn with_excluded(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.excluded.extend(nodes);
        self
    }

    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// Target address, if the operation has one.
    pub fn target(&self) -> Option<Address> {
        self.target.map(|object| Address::new(self.container, object))
    }

    /// Principal objects created by this operation belong to.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Parameters as received.
    pub fn params(&self) -> &CommonParams {
        &self.params
    }

    /// Parameters to attach to per-node calls (one hop spent).
    pub fn forwarded_params(&self) -> CommonParams {
        self.params.forwarded()
    }

    /// Whether traversals must stay on the local node.
    pub fn is_local_only(&self) -> bool {
        self.params.is_local()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Fail with [`ObjectError::Timeout`] once the deadline has passed.
    pub fn check_deadline(&self) -> Result<(), ObjectError> {
        if Instant::now() >= self.deadline {
            return Err(ObjectError::Timeout);
        }
        Ok(())
    }

    /// Semaphore bounding concurrent node calls of this operation.
    pub fn limiter(&self) -> Arc<Semaphore> {
        self.limiter.clone()
    }

    pub fn excluded(&self) -> &[NodeId] {
        &self.excluded
    }

    /// Start a traversal over `groups` that skips the excluded nodes.
    pub fn traverser(
        &self,
        mode: TraversalMode,
        groups: Vec<Selection>,
    ) -> Result<Traverser, PlacementError> {
        Traverser::new(mode, groups, self.excluded.iter().copied())
    }

    /// Split info cached for the target, if any was seen.
    pub fn split_info(&self) -> Option<&SplitInfo> {
        self.split_info.get()
    }

    /// Cache split info for the target. The first value sticks.
    pub fn cache_split_info(&self, info: SplitInfo) {
        let _ = self.split_info.set(info);
    }
}

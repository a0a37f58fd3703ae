//! Walking the physical parts of a split object.
//!
//! Two independent ways lead to the chunks of a virtual object:
//!
//! - forward: the linking object lists every chunk in order;
//! - backward: starting at the last chunk, each chunk names its
//!   predecessor until the first chunk, which names none.
//!
//! Nodes may know only one of the two, so both walks are offered. The
//! backward walk is bounded by a visited set and a depth limit.

use std::collections::HashSet;

use kelp_types::{Address, ContainerId, ObjectId};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::ObjectError;
use crate::head::{HeadOutcome, HeadResolver};

/// Cycle and depth guard for a previous-link walk.
#[derive(Debug)]
pub(crate) struct ChainGuard {
    visited: HashSet<ObjectId>,
    max_depth: usize,
}

impl ChainGuard {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            visited: HashSet::new(),
            max_depth,
        }
    }

    /// Record a step onto `id`.
    pub(crate) fn visit(&mut self, id: ObjectId) -> Result<(), ObjectError> {
        if !self.visited.insert(id) {
            return Err(ObjectError::MalformedChain(format!(
                "chunk {id} reached twice"
            )));
        }
        if self.visited.len() > self.max_depth {
            return Err(ObjectError::MalformedChain(format!(
                "chain longer than {} chunks",
                self.max_depth
            )));
        }
        Ok(())
    }
}

/// Resolves chunk lists through the link object or the previous-link chain.
#[derive(Clone)]
pub struct SplitWalker {
    heads: HeadResolver,
    max_depth: usize,
}

impl SplitWalker {
    pub fn new(heads: HeadResolver, max_depth: usize) -> Self {
        Self { heads, max_depth }
    }

    /// Children listed by the linking object `link`, in payload order.
    pub async fn children(
        &self,
        ctx: &ExecutionContext,
        container: ContainerId,
        link: ObjectId,
    ) -> Result<Vec<ObjectId>, ObjectError> {
        let address = Address::new(container, link);
        match self.heads.resolve(ctx, address).await? {
            HeadOutcome::Found(header) => {
                debug!(%link, children = header.children().len(), "link resolved");
                Ok(header.children().to_vec())
            }
            HeadOutcome::NotFound | HeadOutcome::Split(_) => Err(ObjectError::NotFound(address)),
            HeadOutcome::Removed { tombstone } => {
                Err(ObjectError::AlreadyRemoved { address, tombstone })
            }
        }
    }

    /// Chunks from `last` back to the first chunk (last first).
    ///
    /// A tombstoned chunk ends the walk: it is included, its predecessors
    /// are not. A revisited chunk, a chain longer than the depth limit, or
    /// a chunk that cannot be resolved is a [`ObjectError::MalformedChain`].
    /// Authorization failures and timeouts propagate as they are.
    pub async fn chain(
        &self,
        ctx: &ExecutionContext,
        container: ContainerId,
        last: ObjectId,
    ) -> Result<Vec<ObjectId>, ObjectError> {
        let mut guard = ChainGuard::new(self.max_depth);
        let mut chain = Vec::new();
        let mut current = Some(last);

        while let Some(id) = current {
            guard.visit(id)?;
            let address = Address::new(container, id);
            let header = match self.heads.resolve(ctx, address).await {
                Ok(HeadOutcome::Found(header)) => header,
                Ok(HeadOutcome::Removed { tombstone }) => {
                    debug!(%id, ?tombstone, "chunk already removed, chain walk stops");
                    chain.push(id);
                    break;
                }
                Ok(other) => {
                    return Err(ObjectError::MalformedChain(format!(
                        "chunk {id} unavailable: {other:?}"
                    )));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    return Err(ObjectError::MalformedChain(format!(
                        "chunk {id} unavailable: {e}"
                    )));
                }
            };
            chain.push(id);
            current = header.previous();
        }

        debug!(%last, length = chain.len(), "chain walked");
        Ok(chain)
    }
}

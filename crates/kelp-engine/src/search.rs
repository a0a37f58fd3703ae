//! Filter search across a container's placement groups.

use std::collections::BTreeSet;
use std::sync::Arc;

use kelp_net::SearchCapable;
use kelp_placement::{PlacementError, PlacementMap, ReadQuorum, TraversalMode};
use kelp_types::{ContainerId, ObjectId, SearchFilter};
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::driver::dispatch;
use crate::error::ObjectError;

/// Collects ids of objects matching a filter set.
#[derive(Clone)]
pub struct SearchExecutor {
    placement: Arc<PlacementMap>,
    network: Arc<dyn SearchCapable>,
}

impl SearchExecutor {
    pub fn new(placement: Arc<PlacementMap>, network: Arc<dyn SearchCapable>) -> Self {
        Self { placement, network }
    }

    /// Search `container` for objects matching every filter.
    ///
    /// Every node of a group is asked at once and the answers are unioned.
    /// The search is complete once one group answered in full; if only part
    /// of the candidates answered, what they returned is still the result.
    #[tracing::instrument(skip_all, fields(%container, filters = filters.len()))]
    pub async fn search(
        &self,
        ctx: &ExecutionContext,
        container: ContainerId,
        filters: &[SearchFilter],
    ) -> Result<BTreeSet<ObjectId>, ObjectError> {
        let groups = self
            .placement
            .selections(&container, None, ctx.is_local_only())
            .await?;
        let mut traverser = ctx.traverser(TraversalMode::Read(ReadQuorum::WholeGroup), groups)?;
        let params = ctx.forwarded_params();
        let filters: Arc<[SearchFilter]> = filters.into();

        let mut found = BTreeSet::new();
        let mut answered = 0usize;

        let exhausted = loop {
            let batch = match traverser.next_batch() {
                Ok(Some(batch)) => batch,
                Ok(None) => break None,
                Err(e @ PlacementError::QuorumUnreachable { .. }) => break Some(e),
                Err(e) => return Err(e.into()),
            };

            let network = self.network.clone();
            let mut answers = dispatch(ctx, &batch, |node| {
                let network = network.clone();
                let params = params.clone();
                let filters = filters.clone();
                async move { network.search(node, container, &filters, &params).await }
            })
            .await?;

            for node in batch {
                match answers.remove(&node) {
                    Some(Ok(ids)) => {
                        debug!(%node, found = ids.len(), "search answered");
                        traverser.report(node, true);
                        answered += 1;
                        found.extend(ids);
                    }
                    Some(Err(e)) if e.is_access_denied() => return Err(e.into()),
                    Some(Err(e)) => {
                        debug!(%node, error = %e, "search failed");
                        traverser.report(node, false);
                    }
                    None => traverser.report(node, false),
                }
            }
        };

        match exhausted {
            None => {
                info!(found = found.len(), answered, "search complete");
                Ok(found)
            }
            Some(_) if answered > 0 => {
                warn!(
                    found = found.len(),
                    answered,
                    candidates = traverser.candidate_count(),
                    "search incomplete: no group answered in full"
                );
                Ok(found)
            }
            Some(e) => Err(e.into()),
        }
    }
}

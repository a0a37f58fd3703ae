//! Header resolution across placement candidates.

use std::sync::Arc;

use kelp_net::{HeadCapable, HeadResponse};
use kelp_placement::{PlacementError, PlacementMap, ReadQuorum, TraversalMode};
use kelp_types::{Address, NodeId, ObjectHeader, SplitInfo};
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::driver::dispatch;
use crate::error::ObjectError;

/// What the network knows about an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadOutcome {
    /// A node returned a header matching the address.
    Found(ObjectHeader),
    /// The address is a virtual object; merged split structure.
    Split(SplitInfo),
    /// Every contacted node answered not-found.
    NotFound,
    /// A node reported the address as tombstoned.
    Removed { tombstone: Option<Address> },
}

/// Fetches raw headers, classifying found / split / not found / removed.
#[derive(Clone)]
pub struct HeadResolver {
    placement: Arc<PlacementMap>,
    network: Arc<dyn HeadCapable>,
}

/// Tally of non-conclusive answers seen during one resolution.
#[derive(Default)]
struct Tally {
    split: Option<SplitInfo>,
    not_found: usize,
    unreachable: usize,
    malformed: Option<(NodeId, String)>,
}

impl HeadResolver {
    pub fn new(placement: Arc<PlacementMap>, network: Arc<dyn HeadCapable>) -> Self {
        Self { placement, network }
    }

    /// Resolve `address`, trying candidates one at a time, group by group.
    ///
    /// A matching header or a tombstone ends the walk at once. Split
    /// fragments are merged and the walk continues so other nodes can fill
    /// in what this one did not know.
    #[tracing::instrument(skip_all, fields(%address))]
    pub async fn resolve(
        &self,
        ctx: &ExecutionContext,
        address: Address,
    ) -> Result<HeadOutcome, ObjectError> {
        let groups = self
            .placement
            .selections(&address.container, Some(&address.object), ctx.is_local_only())
            .await?;
        let mut traverser = ctx.traverser(TraversalMode::Read(ReadQuorum::Single), groups)?;
        let params = ctx.forwarded_params();
        let mut tally = Tally::default();

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
                async move { network.head(node, address, &params, true).await }
            })
            .await?;

            for node in batch {
                let Some(answer) = answers.remove(&node) else {
                    traverser.report(node, false);
                    tally.unreachable += 1;
                    continue;
                };

                match answer {
                    Ok(HeadResponse::Header(header)) => match header.id() {
                        Ok(id) if id == address.object => {
                            traverser.report(node, true);
                            debug!(%node, "header found");
                            return Ok(HeadOutcome::Found(header));
                        }
                        Ok(id) => {
                            warn!(%node, returned = %id, "header does not match requested id, dropping node");
                            traverser.report(node, false);
                            tally.malformed = Some((node, format!("header id {id} does not match")));
                        }
                        Err(e) => {
                            warn!(%node, error = %e, "undecodable header, dropping node");
                            traverser.report(node, false);
                            tally.malformed = Some((node, e.to_string()));
                        }
                    },
                    Ok(HeadResponse::Removed { tombstone }) => {
                        traverser.report(node, true);
                        debug!(%node, "object removed");
                        return Ok(HeadOutcome::Removed { tombstone });
                    }
                    Ok(HeadResponse::Split(info)) => {
                        traverser.report(node, false);
                        debug!(%node, link = ?info.link, last_part = ?info.last_part, "split info fragment");
                        match tally.split.as_mut() {
                            Some(merged) => merged.merge(&info),
                            None => tally.split = Some(info),
                        }
                    }
                    Ok(HeadResponse::NotFound) => {
                        traverser.report(node, false);
                        tally.not_found += 1;
                    }
                    Err(e) if e.is_access_denied() => return Err(e.into()),
                    Err(e) => {
                        debug!(%node, error = %e, "head failed");
                        traverser.report(node, false);
                        tally.unreachable += 1;
                    }
                }
            }
        };

        if let Some(info) = tally.split {
            if ctx.target() == Some(address) {
                ctx.cache_split_info(info.clone());
            }
            return Ok(HeadOutcome::Split(info));
        }

        match (tally.not_found, tally.unreachable, tally.malformed) {
            (n, 0, None) if n > 0 => Ok(HeadOutcome::NotFound),
            (0, 0, Some((node, reason))) => Err(ObjectError::MalformedResponse { node, reason }),
            _ => Err(exhausted
                .map(ObjectError::from)
                .unwrap_or(ObjectError::NoCandidates)),
        }
    }
}

//! Delete: resolve everything an address covers, then broadcast one
//! tombstone for all of it.
//!
//! The coordinator is a small state machine:
//!
//! ```text
//! ResolvingHead -> ResolvingSplit -> CollectingMembers -> BuildingTombstone
//!       |       \______________________________________/        |
//!       +-> ReadingTombstone ----------------------------/   Broadcasting -> Done
//! ```
//!
//! An address that is already removed is deleted again with the members of
//! the tombstone that removed it, so repeated deletes agree.
//!
//! Delete reports acceptance, not confirmation: it is done once the
//! tombstone was offered to every candidate node, however many took it.

use std::collections::BTreeSet;
use std::sync::Arc;

use kelp_types::{Address, Object, ObjectType, SearchFilter, SplitId, SplitInfo, TombstoneBody};
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::epoch::EpochSource;
use crate::error::ObjectError;
use crate::get::ObjectReader;
use crate::head::{HeadOutcome, HeadResolver};
use crate::put::{PutOutcome, PutStreamer};
use crate::search::SearchExecutor;
use crate::split::SplitWalker;

/// Result of an accepted delete.
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    /// Address of the broadcast tombstone.
    pub tombstone: Address,
    /// Every address the tombstone covers, sorted.
    pub members: Vec<Address>,
    /// Per-node report of the tombstone broadcast.
    pub broadcast: PutOutcome,
}

/// Where a delete currently is.
#[derive(Debug)]
enum DeleteState {
    ResolvingHead,
    ReadingTombstone(Address),
    ResolvingSplit(SplitInfo),
    CollectingMembers(SplitInfo),
    BuildingTombstone,
    Broadcasting(Object),
    Done(DeleteOutcome),
}

/// Builds and broadcasts tombstones.
#[derive(Clone)]
pub struct DeleteCoordinator {
    heads: HeadResolver,
    search: SearchExecutor,
    walker: SplitWalker,
    reader: ObjectReader,
    put: PutStreamer,
    epochs: Arc<dyn EpochSource>,
    tombstone_lifetime: u64,
}

impl DeleteCoordinator {
    pub fn new(
        heads: HeadResolver,
        search: SearchExecutor,
        walker: SplitWalker,
        reader: ObjectReader,
        put: PutStreamer,
        epochs: Arc<dyn EpochSource>,
        tombstone_lifetime: u64,
    ) -> Self {
        Self {
            heads,
            search,
            walker,
            reader,
            put,
            epochs,
            tombstone_lifetime,
        }
    }

    /// Delete the context's target and, for a split object, every part.
    ///
    /// Deleting an address that is missing still broadcasts a tombstone
    /// for the address alone. An already removed address reuses the
    /// members of its tombstone when that tombstone can be read.
    #[tracing::instrument(skip_all, fields(address = tracing::field::Empty))]
    pub async fn delete(&self, ctx: &ExecutionContext) -> Result<DeleteOutcome, ObjectError> {
        let target = ctx
            .target()
            .ok_or(ObjectError::InvalidRequest("delete needs a target object"))?;
        tracing::Span::current().record("address", tracing::field::display(target));

        let mut members = BTreeSet::from([target]);
        let mut split_id: Option<SplitId> = None;
        let mut state = DeleteState::ResolvingHead;

        loop {
            state = match state {
                DeleteState::ResolvingHead => self.resolve_head(ctx, target).await?,
                DeleteState::ReadingTombstone(tombstone) => {
                    if let Some(body) = self.read_tombstone(ctx, target, tombstone).await? {
                        members.extend(body.members);
                        split_id = body.split_id;
                    }
                    DeleteState::BuildingTombstone
                }
                DeleteState::ResolvingSplit(info) => {
                    debug!(split_id = ?info.split_id, link = ?info.link, last_part = ?info.last_part, "target is split");
                    split_id = Some(info.split_id);
                    DeleteState::CollectingMembers(info)
                }
                DeleteState::CollectingMembers(info) => {
                    self.collect(ctx, target, &info, &mut members).await?;
                    DeleteState::BuildingTombstone
                }
                DeleteState::BuildingTombstone => {
                    let epoch = self.epochs.current_epoch().await;
                    let body = TombstoneBody::new(
                        members.iter().copied(),
                        epoch.saturating_add(self.tombstone_lifetime),
                        split_id,
                    );
                    let tombstone = body.into_object(target.container, ctx.owner(), epoch)?;
                    debug!(members = body.members.len(), expiration_epoch = body.expiration_epoch, "tombstone built");
                    DeleteState::Broadcasting(tombstone)
                }
                DeleteState::Broadcasting(tombstone) => {
                    let address = tombstone.address()?;
                    let broadcast = self.put.put(ctx, &tombstone, true).await?;
                    DeleteState::Done(DeleteOutcome {
                        tombstone: address,
                        members: members.iter().copied().collect(),
                        broadcast,
                    })
                }
                DeleteState::Done(outcome) => {
                    info!(
                        tombstone = %outcome.tombstone,
                        members = outcome.members.len(),
                        stored = outcome.broadcast.stored_on.len(),
                        failed = outcome.broadcast.failures.len(),
                        "delete accepted"
                    );
                    return Ok(outcome);
                }
            };
        }
    }

    /// Head the target and pick the next state from what it is.
    async fn resolve_head(
        &self,
        ctx: &ExecutionContext,
        target: Address,
    ) -> Result<DeleteState, ObjectError> {
        match self.heads.resolve(ctx, target).await {
            Ok(HeadOutcome::Split(info)) => Ok(DeleteState::ResolvingSplit(info)),
            Ok(HeadOutcome::Found(_)) => Ok(DeleteState::BuildingTombstone),
            Ok(HeadOutcome::NotFound) => {
                debug!("target not found, tombstoning the address alone");
                Ok(DeleteState::BuildingTombstone)
            }
            Ok(HeadOutcome::Removed {
                tombstone: Some(tombstone),
            }) => {
                debug!(%tombstone, "target already removed, reading its tombstone");
                Ok(DeleteState::ReadingTombstone(tombstone))
            }
            Ok(HeadOutcome::Removed { tombstone: None }) => {
                debug!("target already removed by an unknown tombstone, tombstoning the address alone");
                Ok(DeleteState::BuildingTombstone)
            }
            Err(e) if e.is_fatal() || matches!(e, ObjectError::NoCandidates) => Err(e),
            Err(e) => {
                warn!(error = %e, "target head unresolved, tombstoning the address alone");
                Ok(DeleteState::BuildingTombstone)
            }
        }
    }

    /// Body of the tombstone that already removed `target`.
    ///
    /// `None` when it cannot be read or does not cover `target`; the delete
    /// then falls back to the address alone.
    async fn read_tombstone(
        &self,
        ctx: &ExecutionContext,
        target: Address,
        tombstone: Address,
    ) -> Result<Option<TombstoneBody>, ObjectError> {
        let object = match self.reader.get(ctx, tombstone).await {
            Ok(object) => object,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(%tombstone, error = %e, "previous tombstone unreadable, tombstoning the address alone");
                return Ok(None);
            }
        };
        if object.header.object_type != ObjectType::Tombstone {
            warn!(%tombstone, "previous tombstone is not a tombstone object");
            return Ok(None);
        }
        match TombstoneBody::decode(&object.payload) {
            Ok(body) if body.members.contains(&target) => {
                debug!(%tombstone, members = body.members.len(), "reusing previous tombstone members");
                Ok(Some(body))
            }
            Ok(_) => {
                warn!(%tombstone, "previous tombstone does not cover the target");
                Ok(None)
            }
            Err(e) => {
                warn!(%tombstone, error = %e, "previous tombstone undecodable");
                Ok(None)
            }
        }
    }

    /// Gather every part of a split object into `members`.
    async fn collect(
        &self,
        ctx: &ExecutionContext,
        target: Address,
        info: &SplitInfo,
        members: &mut BTreeSet<Address>,
    ) -> Result<(), ObjectError> {
        let container = target.container;

        if let Some(link) = info.link {
            match self.walker.children(ctx, container, link).await {
                Ok(children) => {
                    members.insert(Address::new(container, link));
                    members.extend(children.into_iter().map(|c| Address::new(container, c)));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(%link, error = %e, "forward walk failed, continuing"),
            }
        }

        if let Some(last) = info.last_part {
            let chain = self.walker.chain(ctx, container, last).await?;
            members.extend(chain.into_iter().map(|c| Address::new(container, c)));
        }

        let filters = [SearchFilter::SplitId(info.split_id)];
        match self.search.search(ctx, container, &filters).await {
            Ok(found) => members.extend(found.into_iter().map(|id| Address::new(container, id))),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, "split search failed, continuing"),
        }

        debug!(members = members.len(), "split members collected");
        Ok(())
    }
}

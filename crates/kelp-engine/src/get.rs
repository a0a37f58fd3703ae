//! Whole-object reads, reassembling split objects from their chunks.

use std::sync::Arc;

use bytes::BytesMut;
use kelp_net::{GetCapable, GetResponse};
use kelp_placement::{PlacementError, PlacementMap, ReadQuorum, TraversalMode};
use kelp_types::{Address, NodeId, Object, ObjectHeader, ObjectId, SplitInfo};
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::driver::dispatch;
use crate::error::ObjectError;
use crate::split::SplitWalker;

/// One physical read: an object, or the split info of a virtual one.
enum Fetched {
    Object(Object),
    Split(SplitInfo),
}

/// Reads objects, following split chains when the address is virtual.
#[derive(Clone)]
pub struct ObjectReader {
    placement: Arc<PlacementMap>,
    network: Arc<dyn GetCapable>,
    walker: SplitWalker,
}

impl ObjectReader {
    pub fn new(
        placement: Arc<PlacementMap>,
        network: Arc<dyn GetCapable>,
        walker: SplitWalker,
    ) -> Self {
        Self {
            placement,
            network,
            walker,
        }
    }

    /// Fetch the object at `address`, reassembling it if it is split.
    #[tracing::instrument(skip_all, fields(%address))]
    pub async fn get(&self, ctx: &ExecutionContext, address: Address) -> Result<Object, ObjectError> {
        match self.fetch(ctx, address).await? {
            Fetched::Object(object) => Ok(object),
            Fetched::Split(info) => {
                if ctx.target() == Some(address) {
                    ctx.cache_split_info(info.clone());
                }
                self.assemble(ctx, address, &info).await
            }
        }
    }

    async fn fetch(&self, ctx: &ExecutionContext, address: Address) -> Result<Fetched, ObjectError> {
        let groups = self
            .placement
            .selections(&address.container, Some(&address.object), ctx.is_local_only())
            .await?;
        let mut traverser = ctx.traverser(TraversalMode::Read(ReadQuorum::Single), groups)?;
        let params = ctx.forwarded_params();

        let mut split: Option<SplitInfo> = None;
        let mut not_found = 0usize;
        let mut failed = 0usize;
        let mut malformed: Option<(NodeId, String)> = None;

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
                async move { network.get(node, address, &params).await }
            })
            .await?;

            for node in batch {
                match answers.remove(&node) {
                    Some(Ok(GetResponse::Object(object))) => {
                        match verify(&object, &address.object) {
                            Ok(()) => {
                                traverser.report(node, true);
                                debug!(%node, size = object.payload.len(), "object fetched");
                                return Ok(Fetched::Object(object));
                            }
                            Err(reason) => {
                                warn!(%node, %reason, "dropping malformed object");
                                traverser.report(node, false);
                                malformed = Some((node, reason));
                            }
                        }
                    }
                    Some(Ok(GetResponse::Removed { tombstone })) => {
                        return Err(ObjectError::AlreadyRemoved { address, tombstone });
                    }
                    Some(Ok(GetResponse::Split(info))) => {
                        traverser.report(node, false);
                        match split.as_mut() {
                            Some(merged) => merged.merge(&info),
                            None => split = Some(info),
                        }
                    }
                    Some(Ok(GetResponse::NotFound)) => {
                        traverser.report(node, false);
                        not_found += 1;
                    }
                    Some(Err(e)) if e.is_access_denied() => return Err(e.into()),
                    Some(Err(e)) => {
                        debug!(%node, error = %e, "get failed");
                        traverser.report(node, false);
                        failed += 1;
                    }
                    None => {
                        traverser.report(node, false);
                        failed += 1;
                    }
                }
            }
        };

        if let Some(info) = split {
            return Ok(Fetched::Split(info));
        }
        match (not_found, failed, malformed) {
            (n, 0, None) if n > 0 => Err(ObjectError::NotFound(address)),
            (0, 0, Some((node, reason))) => Err(ObjectError::MalformedResponse { node, reason }),
            _ => Err(exhausted
                .map(ObjectError::from)
                .unwrap_or(ObjectError::NoCandidates)),
        }
    }

    /// Rebuild a virtual object from its chunks.
    async fn assemble(
        &self,
        ctx: &ExecutionContext,
        address: Address,
        info: &SplitInfo,
    ) -> Result<Object, ObjectError> {
        let container = address.container;
        let mut children: Option<Vec<ObjectId>> = None;

        if let Some(link) = info.link {
            match self.walker.children(ctx, container, link).await {
                Ok(list) => children = Some(list),
                Err(e) if e.is_fatal() || info.last_part.is_none() => return Err(e),
                Err(e) => warn!(%link, error = %e, "link unavailable, walking the chain instead"),
            }
        }
        let children = match (children, info.last_part) {
            (Some(list), _) => list,
            (None, Some(last)) => {
                let mut chain = self.walker.chain(ctx, container, last).await?;
                chain.reverse();
                chain
            }
            (None, None) => {
                return Err(ObjectError::MalformedChain(format!(
                    "split info for {address} names neither link nor last part"
                )));
            }
        };

        let mut payload = BytesMut::new();
        let mut parent_header: Option<ObjectHeader> = None;
        let mut first_header: Option<ObjectHeader> = None;

        for child in &children {
            let child_address = Address::new(container, *child);
            let object = match self.fetch(ctx, child_address).await {
                Ok(Fetched::Object(object)) => object,
                Ok(Fetched::Split(_)) => {
                    return Err(ObjectError::MalformedChain(format!(
                        "chunk {child} is itself split"
                    )));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    return Err(ObjectError::MalformedChain(format!(
                        "chunk {child} unavailable: {e}"
                    )));
                }
            };
            if let Some(split) = object.header.split.as_ref()
                && let Some(parent) = split.parent_header.as_deref()
            {
                parent_header = Some(parent.clone());
            }
            if first_header.is_none() {
                first_header = Some(object.header.clone());
            }
            payload.extend_from_slice(&object.payload);
        }
        let payload = payload.freeze();

        let object = match (parent_header, first_header) {
            (Some(header), _) => {
                let object = Object { header, payload };
                verify(&object, &address.object).map_err(ObjectError::MalformedChain)?;
                object
            }
            (None, Some(first)) => {
                warn!(%address, "no chunk carries the parent header, synthesizing one");
                Object::builder(first.container, first.owner)
                    .epoch(first.created_epoch)
                    .payload(payload)
            }
            (None, None) => {
                return Err(ObjectError::MalformedChain(format!(
                    "split object {address} has no chunks"
                )));
            }
        };

        info!(%address, chunks = children.len(), size = object.payload.len(), "split object reassembled");
        Ok(object)
    }
}

fn verify(object: &Object, expected: &ObjectId) -> Result<(), String> {
    let id = object.id().map_err(|e| e.to_string())?;
    if id != *expected {
        return Err(format!("object id {id} does not match {expected}"));
    }
    if !object.verify_payload() {
        return Err(format!("payload of {id} does not match its checksum"));
    }
    Ok(())
}

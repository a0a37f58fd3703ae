//! Ordered chunked upload to placement candidates.
//!
//! Each destination gets its own stream: `init` with the header, then the
//! payload in `payload_chunk_size` pieces, each awaited before the next,
//! then `close`. Streams to different nodes run concurrently.

use std::sync::Arc;

use bytes::Bytes;
use kelp_net::{NetError, PutCapable};
use kelp_placement::{PlacementMap, TraversalMode};
use kelp_types::{CommonParams, NodeId, Object, ObjectHeader, ObjectId};
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::driver::dispatch;
use crate::error::ObjectError;

/// A destination that did not store the object.
#[derive(Debug, Clone)]
pub struct PartialBroadcastFailure {
    pub node: NodeId,
    pub error: NetError,
}

/// Result of a put.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    /// Id computed locally (and confirmed by every node in `stored_on`).
    pub object_id: ObjectId,
    /// Nodes that stored the object.
    pub stored_on: Vec<NodeId>,
    /// Nodes that were attempted and failed.
    pub failures: Vec<PartialBroadcastFailure>,
}

impl PutOutcome {
    /// Number of distinct nodes attempted.
    pub fn attempted(&self) -> usize {
        self.stored_on.len() + self.failures.len()
    }
}

/// Streams objects to their placement nodes.
#[derive(Clone)]
pub struct PutStreamer {
    placement: Arc<PlacementMap>,
    network: Arc<dyn PutCapable>,
    chunk_size: usize,
}

impl PutStreamer {
    pub fn new(placement: Arc<PlacementMap>, network: Arc<dyn PutCapable>, chunk_size: usize) -> Self {
        Self {
            placement,
            network,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Store `object` on its placement nodes.
    ///
    /// Tracked (`broadcast == false`): every replica group must reach its
    /// quorum; failed nodes are replaced by backups. Broadcast: every
    /// candidate is attempted exactly once and failures are only reported.
    #[tracing::instrument(skip_all, fields(container = %object.header.container, broadcast = broadcast))]
    pub async fn put(
        &self,
        ctx: &ExecutionContext,
        object: &Object,
        broadcast: bool,
    ) -> Result<PutOutcome, ObjectError> {
        let object_id = object.id()?;
        let container = object.header.container;
        let groups = self
            .placement
            .selections(&container, Some(&object_id), ctx.is_local_only())
            .await?;
        let mut traverser = if broadcast {
            ctx.traverser(TraversalMode::Broadcast, groups)?
        } else {
            ctx.traverser(TraversalMode::Tracked, groups)?
        };

        let header = Arc::new(object.header.clone());
        let payload = object.payload.clone();
        let params = ctx.forwarded_params();
        let chunk_size = self.chunk_size;

        let mut outcome = PutOutcome {
            object_id,
            stored_on: Vec::new(),
            failures: Vec::new(),
        };

        while let Some(batch) = traverser.next_batch()? {
            let network = self.network.clone();
            let mut answers = dispatch(ctx, &batch, |node| {
                let network = network.clone();
                let params = params.clone();
                let header = header.clone();
                let payload = payload.clone();
                async move {
                    stream_to(
                        network.as_ref(),
                        node,
                        &params,
                        &header,
                        payload,
                        chunk_size,
                        object_id,
                    )
                    .await
                }
            })
            .await?;

            for node in batch {
                let result = answers.remove(&node).unwrap_or(Err(NetError::StreamClosed));
                match result {
                    Ok(()) => {
                        debug!(%node, "put stream closed");
                        traverser.report(node, true);
                        outcome.stored_on.push(node);
                    }
                    Err(e) if !broadcast && e.is_access_denied() => return Err(e.into()),
                    Err(e) => {
                        debug!(%node, error = %e, "put stream failed");
                        traverser.report(node, false);
                        outcome.failures.push(PartialBroadcastFailure { node, error: e });
                    }
                }
            }
        }

        if broadcast && !outcome.failures.is_empty() {
            warn!(
                %object_id,
                attempted = outcome.attempted(),
                failed = outcome.failures.len(),
                "partial broadcast failure"
            );
        }
        info!(%object_id, stored = outcome.stored_on.len(), "put complete");
        Ok(outcome)
    }
}

/// One full stream to one node.
async fn stream_to(
    network: &dyn PutCapable,
    node: NodeId,
    params: &CommonParams,
    header: &ObjectHeader,
    payload: Bytes,
    chunk_size: usize,
    expected: ObjectId,
) -> Result<(), NetError> {
    let mut stream = network.open_put(node, params).await?;
    stream.init(header).await?;

    let mut offset = 0;
    while offset < payload.len() {
        let end = (offset + chunk_size).min(payload.len());
        stream.chunk(payload.slice(offset..end)).await?;
        offset = end;
    }

    let stored = stream.close().await?;
    if stored != expected {
        return Err(NetError::Malformed {
            node,
            reason: format!("stored id {stored} differs from {expected}"),
        });
    }
    Ok(())
}

//! Per-node object RPC surface for Kelp.
//!
//! The coordinator talks to storage nodes through narrow capability traits,
//! one per call kind:
//!
//! - [`HeadCapable`]: fetch an object header (or split info).
//! - [`GetCapable`]: fetch a whole physical object.
//! - [`SearchCapable`]: list object ids matching a filter set.
//! - [`PutCapable`]: open an ordered upload stream ([`PutStream`]).
//!
//! Wire encoding, signing and transport live outside this crate; an
//! implementation only has to surface results or a [`NetError`].
//! [`MemoryNetwork`] implements every capability in-process for tests and
//! simulation.

mod error;
mod memory;

pub use error::NetError;
pub use memory::{Call, MemoryNetwork, StreamEvent};

use async_trait::async_trait;
use bytes::Bytes;
use kelp_types::{
    Address, CommonParams, ContainerId, NodeId, Object, ObjectHeader, ObjectId, SearchFilter,
    SplitInfo,
};

/// Answer of a node to a head request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadResponse {
    /// The node holds the object.
    Header(ObjectHeader),
    /// The address is a virtual object; the node knows part of its split
    /// structure.
    Split(SplitInfo),
    /// The node holds nothing under this address.
    NotFound,
    /// The address is covered by a tombstone.
    Removed { tombstone: Option<Address> },
}

/// Answer of a node to a get request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResponse {
    Object(Object),
    Split(SplitInfo),
    NotFound,
    Removed { tombstone: Option<Address> },
}

/// Fetch object headers.
#[async_trait]
pub trait HeadCapable: Send + Sync {
    /// Head `address` on `node`. With `raw`, a virtual object yields its
    /// split info rather than its parent header.
    async fn head(
        &self,
        node: NodeId,
        address: Address,
        params: &CommonParams,
        raw: bool,
    ) -> Result<HeadResponse, NetError>;
}

/// Fetch whole objects.
#[async_trait]
pub trait GetCapable: Send + Sync {
    async fn get(
        &self,
        node: NodeId,
        address: Address,
        params: &CommonParams,
    ) -> Result<GetResponse, NetError>;
}

/// Search objects by filter.
#[async_trait]
pub trait SearchCapable: Send + Sync {
    /// Ids of objects in `container` stored on `node` matching every filter.
    async fn search(
        &self,
        node: NodeId,
        container: ContainerId,
        filters: &[SearchFilter],
        params: &CommonParams,
    ) -> Result<Vec<ObjectId>, NetError>;
}

/// Open upload streams.
#[async_trait]
pub trait PutCapable: Send + Sync {
    async fn open_put(
        &self,
        node: NodeId,
        params: &CommonParams,
    ) -> Result<Box<dyn PutStream>, NetError>;
}

/// One ordered upload to one node: `init`, then `chunk`s, then `close`.
///
/// Each call must complete before the next one is issued.
#[async_trait]
pub trait PutStream: Send {
    /// Send the object header (payload excluded).
    async fn init(&mut self, header: &ObjectHeader) -> Result<(), NetError>;

    /// Send the next payload chunk.
    async fn chunk(&mut self, data: Bytes) -> Result<(), NetError>;

    /// Finish the upload; returns the id the node stored the object under.
    async fn close(&mut self) -> Result<ObjectId, NetError>;
}

/// Every capability at once.
pub trait ObjectNetwork: HeadCapable + GetCapable + SearchCapable + PutCapable {}

impl<T> ObjectNetwork for T where T: HeadCapable + GetCapable + SearchCapable + PutCapable {}

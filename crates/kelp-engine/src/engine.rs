//! [`ObjectEngine`]: the object operations protocol adapters call.
//!
//! Adapters depend on this trait instead of the concrete
//! [`ObjectService`](crate::ObjectService), so they can be driven by any
//! implementation (a test double included).

use std::collections::BTreeSet;

use kelp_types::{Address, CommonParams, ContainerId, Object, ObjectId, SearchFilter};

use crate::delete::DeleteOutcome;
use crate::error::ObjectError;
use crate::head::HeadOutcome;
use crate::put::PutOutcome;

/// The object lifecycle interface.
///
/// - **put**: store an object on its placement nodes
/// - **get**: fetch a full object, reassembling split objects
/// - **head**: fetch the header, or the split info of a virtual object
/// - **search**: list ids matching a filter set
/// - **delete**: tombstone an object and every part of it
#[async_trait::async_trait]
pub trait ObjectEngine: Send + Sync {
    /// Store an object. Payloads over the configured maximum are split.
    async fn put(&self, object: Object, params: CommonParams) -> Result<PutOutcome, ObjectError>;

    /// Retrieve an object with its payload.
    async fn get(&self, address: Address, params: CommonParams) -> Result<Object, ObjectError>;

    /// Retrieve what the network knows about an address without payload.
    async fn head(&self, address: Address, params: CommonParams)
    -> Result<HeadOutcome, ObjectError>;

    /// Ids in `container` matching every filter.
    async fn search(
        &self,
        container: ContainerId,
        filters: Vec<SearchFilter>,
        params: CommonParams,
    ) -> Result<BTreeSet<ObjectId>, ObjectError>;

    /// Tombstone an object.
    async fn delete(
        &self,
        address: Address,
        params: CommonParams,
    ) -> Result<DeleteOutcome, ObjectError>;
}

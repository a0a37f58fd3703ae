//! Tombstone payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Address, ContainerId, EncodeError, Object, ObjectType, OwnerId, SplitId};

/// Attribute carrying the epoch after which a tombstone may be collected.
pub const EXPIRATION_EPOCH_ATTRIBUTE: &str = "__KELP__EXPIRATION_EPOCH";

/// Body of a tombstone object: the set of addresses it deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TombstoneBody {
    /// Addresses removed by this tombstone, sorted and deduplicated.
    pub members: Vec<Address>,
    /// Epoch after which the tombstone itself may be garbage collected.
    pub expiration_epoch: u64,
    /// Split group of the deleted virtual object, when there was one.
    pub split_id: Option<SplitId>,
}

impl TombstoneBody {
    /// Build a body from any collection of members; sorts and deduplicates.
    pub fn new(
        members: impl IntoIterator<Item = Address>,
        expiration_epoch: u64,
        split_id: Option<SplitId>,
    ) -> Self {
        let mut members: Vec<Address> = members.into_iter().collect();
        members.sort();
        members.dedup();
        Self {
            members,
            expiration_epoch,
            split_id,
        }
    }

    /// Serialize with postcard.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Deserialize a postcard-encoded body.
    pub fn decode(bytes: &[u8]) -> Result<Self, EncodeError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// Wrap this body into a tombstone object in `container`.
    pub fn into_object(
        &self,
        container: ContainerId,
        owner: OwnerId,
        epoch: u64,
    ) -> Result<Object, EncodeError> {
        let payload = Bytes::from(self.encode()?);
        Ok(Object::builder(container, owner)
            .epoch(epoch)
            .object_type(ObjectType::Tombstone)
            .attribute(EXPIRATION_EPOCH_ATTRIBUTE, self.expiration_epoch.to_string())
            .payload(payload))
    }
}

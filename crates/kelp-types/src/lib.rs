//! Shared types and identifiers for Kelp.
//!
//! This crate defines the core types used across the Kelp workspace:
//! identifiers ([`ContainerId`], [`ObjectId`], [`NodeId`], [`OwnerId`],
//! [`SplitId`]), the object model ([`Address`], [`ObjectHeader`],
//! [`Object`], [`SplitHeader`], [`SplitInfo`]), tombstones
//! ([`TombstoneBody`]), search filters ([`SearchFilter`]), per-request
//! parameters ([`CommonParams`]) and container placement policies
//! ([`PlacementPolicy`]).

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

mod filter;
mod params;
mod policy;
pub mod split;
mod tombstone;

pub use filter::SearchFilter;
pub use params::{BearerToken, CommonParams, DEFAULT_TTL, SessionToken, SessionVerb};
pub use policy::{PlacementPolicy, ReplicaGroup};
pub use tombstone::{EXPIRATION_EPOCH_ATTRIBUTE, TombstoneBody};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an ID by hashing arbitrary data with BLAKE3.
            pub fn from_data(data: &[u8]) -> Self {
                Self(blake3::hash(data).into())
            }

            /// Return the raw 32-byte representation.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

define_id!(
    /// Identifier of a container: the namespace objects live in and the unit
    /// a placement policy is attached to.
    ContainerId
);

define_id!(
    /// Content-addressed identifier for an object: `blake3(postcard(header))`.
    ObjectId
);

define_id!(
    /// Identifier for a storage node.
    NodeId
);

define_id!(
    /// Identifier of a principal (object owner, token issuer).
    OwnerId
);

/// Identifier shared by every physical chunk of one split upload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SplitId([u8; 16]);

impl SplitId {
    /// Generate a fresh random split identifier.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Return the raw 16-byte representation.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for SplitId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for SplitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SplitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SplitId({self})")
    }
}

/// Failure to encode or decode one of the postcard-serialized structures.
#[derive(Debug, thiserror::Error)]
#[error("encoding error: {0}")]
pub struct EncodeError(pub String);

impl From<postcard::Error> for EncodeError {
    fn from(e: postcard::Error) -> Self {
        Self(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// Fully-qualified location of an object: container plus object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Address {
    /// Container the object belongs to.
    pub container: ContainerId,
    /// Content-addressed object id.
    pub object: ObjectId,
}

impl Address {
    /// Build an address from its parts.
    pub fn new(container: ContainerId, object: ObjectId) -> Self {
        Self { container, object }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.object)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

// ---------------------------------------------------------------------------
// Object model
// ---------------------------------------------------------------------------

/// Kind of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// Plain user data (a whole object or one chunk of a split object).
    Regular,
    /// A marker whose payload lists the addresses it deletes.
    Tombstone,
    /// Index of a split chain: lists every chunk, carries no payload.
    Link,
}

/// Split-chain metadata carried by the physical parts of a split object.
///
/// Every chunk carries the [`SplitId`]. A chunk other than the first points
/// back at its predecessor through `previous`. The last chunk and the
/// linking object additionally carry the parent (virtual object) id and
/// header; the linking object carries the ordered child list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitHeader {
    /// Split group shared by all parts of one logical upload.
    pub split_id: SplitId,
    /// Previous chunk in the chain (`None` for the first chunk).
    pub previous: Option<ObjectId>,
    /// Ordered chunk ids (only on the linking object).
    pub children: Vec<ObjectId>,
    /// Id of the virtual parent object.
    pub parent: Option<ObjectId>,
    /// Header of the virtual parent object.
    pub parent_header: Option<Box<ObjectHeader>>,
}

impl SplitHeader {
    /// A split header with only the group id set.
    pub fn new(split_id: SplitId) -> Self {
        Self {
            split_id,
            previous: None,
            children: Vec::new(),
            parent: None,
            parent_header: None,
        }
    }
}

/// Object header: everything but the payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeader {
    /// Container the object is stored in.
    pub container: ContainerId,
    /// Principal that owns the object.
    pub owner: OwnerId,
    /// Network epoch at which the object was created.
    pub created_epoch: u64,
    /// Kind of object.
    pub object_type: ObjectType,
    /// Payload length in bytes.
    pub payload_len: u64,
    /// BLAKE3 checksum of the payload.
    pub payload_checksum: [u8; 32],
    /// User and system attributes.
    pub attributes: BTreeMap<String, String>,
    /// Split-chain metadata, present only on parts of a split object.
    pub split: Option<SplitHeader>,
}

impl ObjectHeader {
    /// Compute the content-addressed id: `blake3(postcard(header))`.
    ///
    /// The header embeds the payload checksum and length, so the id covers
    /// the payload as well.
    pub fn id(&self) -> Result<ObjectId, EncodeError> {
        let encoded = postcard::to_allocvec(self)?;
        Ok(ObjectId::from_data(&encoded))
    }

    /// Whether this header describes a root object (not part of a split chain).
    pub fn is_root(&self) -> bool {
        self.split.is_none()
    }

    /// Previous-chunk link, if any.
    pub fn previous(&self) -> Option<ObjectId> {
        self.split.as_ref().and_then(|s| s.previous)
    }

    /// Child list of a linking object (empty for anything else).
    pub fn children(&self) -> &[ObjectId] {
        self.split.as_ref().map_or(&[], |s| s.children.as_slice())
    }
}

/// A complete object: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Object header.
    pub header: ObjectHeader,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Object {
    /// Start building an object in `container` owned by `owner`.
    pub fn builder(container: ContainerId, owner: OwnerId) -> ObjectBuilder {
        ObjectBuilder {
            container,
            owner,
            created_epoch: 0,
            object_type: ObjectType::Regular,
            attributes: BTreeMap::new(),
            split: None,
        }
    }

    /// Content-addressed id of this object.
    pub fn id(&self) -> Result<ObjectId, EncodeError> {
        self.header.id()
    }

    /// Full address of this object.
    pub fn address(&self) -> Result<Address, EncodeError> {
        Ok(Address::new(self.header.container, self.id()?))
    }

    /// Check that the payload matches the length and checksum in the header.
    pub fn verify_payload(&self) -> bool {
        self.payload.len() as u64 == self.header.payload_len
            && *blake3::hash(&self.payload).as_bytes() == self.header.payload_checksum
    }
}

/// Builder for [`Object`] values; fills in payload length and checksum.
#[derive(Debug, Clone)]
pub struct ObjectBuilder {
    container: ContainerId,
    owner: OwnerId,
    created_epoch: u64,
    object_type: ObjectType,
    attributes: BTreeMap<String, String>,
    split: Option<SplitHeader>,
}

impl ObjectBuilder {
    /// Set the creation epoch.
    pub fn epoch(mut self, epoch: u64) -> Self {
        self.created_epoch = epoch;
        self
    }

    /// Set the object type.
    pub fn object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }

    /// Add an attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach split-chain metadata.
    pub fn split(mut self, split: SplitHeader) -> Self {
        self.split = Some(split);
        self
    }

    /// Finish the object with the given payload.
    pub fn payload(self, payload: impl Into<Bytes>) -> Object {
        let payload = payload.into();
        Object {
            header: ObjectHeader {
                container: self.container,
                owner: self.owner,
                created_epoch: self.created_epoch,
                object_type: self.object_type,
                payload_len: payload.len() as u64,
                payload_checksum: *blake3::hash(&payload).as_bytes(),
                attributes: self.attributes,
                split: self.split,
            },
            payload,
        }
    }
}

/// Split structure reported in place of a header for a virtual object.
///
/// Different nodes may know different parts: one may hold the linking
/// object, another only the last chunk. Fragments are combined with
/// [`SplitInfo::merge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitInfo {
    /// Split group of the virtual object.
    pub split_id: SplitId,
    /// Linking object enumerating every chunk.
    pub link: Option<ObjectId>,
    /// Last chunk, head of the reverse-linked chain.
    pub last_part: Option<ObjectId>,
}

impl SplitInfo {
    /// Split info with only the group id known.
    pub fn new(split_id: SplitId) -> Self {
        Self {
            split_id,
            link: None,
            last_part: None,
        }
    }

    /// Fill missing fields from `other`; values already set are kept.
    pub fn merge(&mut self, other: &SplitInfo) {
        if self.link.is_none() {
            self.link = other.link;
        }
        if self.last_part.is_none() {
            self.last_part = other.last_part;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

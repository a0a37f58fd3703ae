//! Search filters evaluated against object headers.

use serde::{Deserialize, Serialize};

use crate::{ObjectHeader, ObjectId, ObjectType, SplitId};

/// One predicate of a search request. A search matches objects for which
/// every filter holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchFilter {
    /// Only objects that are not chunks of a split chain. The linking object
    /// and chunks are excluded; a last chunk's virtual parent is not stored
    /// on its own and so never matches.
    RootOnly,
    /// Objects belonging to the given split group.
    SplitId(SplitId),
    /// Objects of the given type.
    Type(ObjectType),
    /// Objects carrying the attribute with exactly this value.
    Attribute { key: String, value: String },
    /// Chunks and links whose virtual parent is this id.
    Parent(ObjectId),
}

impl SearchFilter {
    /// Evaluate this filter against a stored object's id and header.
    pub fn matches(&self, _id: &ObjectId, header: &ObjectHeader) -> bool {
        match self {
            SearchFilter::RootOnly => header.is_root(),
            SearchFilter::SplitId(split_id) => header
                .split
                .as_ref()
                .is_some_and(|s| s.split_id == *split_id),
            SearchFilter::Type(t) => header.object_type == *t,
            SearchFilter::Attribute { key, value } => {
                header.attributes.get(key).is_some_and(|v| v == value)
            }
            SearchFilter::Parent(parent) => header
                .split
                .as_ref()
                .is_some_and(|s| s.parent == Some(*parent)),
        }
    }

    /// Whether every filter in `filters` matches.
    pub fn all_match(filters: &[SearchFilter], id: &ObjectId, header: &ObjectHeader) -> bool {
        filters.iter().all(|f| f.matches(id, header))
    }
}

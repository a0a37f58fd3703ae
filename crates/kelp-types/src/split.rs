//! Cutting a large object into a split chain.
//!
//! An object whose payload exceeds the configured maximum is stored as a
//! chain of chunks plus one linking object:
//!
//! ```text
//!   C1 <- C2 <- ... <- Cn        (previous links)
//!   L = { children: [C1..Cn] }   (link)
//! ```
//!
//! The last chunk and the link carry the parent (virtual object) header so
//! either can be used to rebuild the object.

use bytes::Bytes;

use crate::{EncodeError, Object, ObjectHeader, ObjectId, ObjectType, SplitHeader, SplitId};

/// Physical objects produced by splitting one virtual object.
#[derive(Debug, Clone)]
pub struct SplitLayout {
    /// Header of the virtual parent object.
    pub parent_header: ObjectHeader,
    /// Id of the virtual parent object.
    pub parent_id: ObjectId,
    /// Chunks in payload order.
    pub chunks: Vec<Object>,
    /// Linking object enumerating the chunks.
    pub link: Object,
}

impl SplitLayout {
    /// All physical objects in upload order: chunks first, link last.
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.chunks.iter().chain(std::iter::once(&self.link))
    }
}

/// Split `parent` into chunks of at most `max_size` payload bytes.
///
/// `max_size` must be non-zero. An empty payload still produces one empty
/// chunk.
pub fn split_object(
    parent: &Object,
    max_size: usize,
    split_id: SplitId,
) -> Result<SplitLayout, EncodeError> {
    if max_size == 0 {
        return Err(EncodeError("split size must be non-zero".into()));
    }

    let parent_header = parent.header.clone();
    let parent_id = parent_header.id()?;

    let mut pieces: Vec<Bytes> = Vec::new();
    let mut offset = 0;
    while offset < parent.payload.len() {
        let end = (offset + max_size).min(parent.payload.len());
        pieces.push(parent.payload.slice(offset..end));
        offset = end;
    }
    if pieces.is_empty() {
        pieces.push(Bytes::new());
    }

    let last_index = pieces.len() - 1;
    let mut chunks = Vec::with_capacity(pieces.len());
    let mut children = Vec::with_capacity(pieces.len());
    let mut previous: Option<ObjectId> = None;

    for (i, piece) in pieces.into_iter().enumerate() {
        let mut split = SplitHeader::new(split_id);
        split.previous = previous;
        if i == last_index {
            split.parent = Some(parent_id);
            split.parent_header = Some(Box::new(parent_header.clone()));
        }
        let chunk = Object::builder(parent_header.container, parent_header.owner)
            .epoch(parent_header.created_epoch)
            .split(split)
            .payload(piece);
        let id = chunk.id()?;
        children.push(id);
        previous = Some(id);
        chunks.push(chunk);
    }

    let mut link_split = SplitHeader::new(split_id);
    link_split.children = children;
    link_split.parent = Some(parent_id);
    link_split.parent_header = Some(Box::new(parent_header.clone()));
    let link = Object::builder(parent_header.container, parent_header.owner)
        .epoch(parent_header.created_epoch)
        .object_type(ObjectType::Link)
        .split(link_split)
        .payload(Bytes::new());

    Ok(SplitLayout {
        parent_header,
        parent_id,
        chunks,
        link,
    })
}

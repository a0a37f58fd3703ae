//! Placement for Kelp: which nodes hold an object, and in what order to ask.
//!
//! The topology is a consistent hash ring of storage nodes. Each node gets
//! multiple positions on the ring (vnodes), determined by
//! `blake3(node_id ++ vnode_index)`. A container's placement policy picks,
//! per replica group, a run of distinct nodes clockwise from the group's
//! ring position; per object those candidates are then reordered by
//! rendezvous weight.
//!
//! [`PlacementMap`] holds the current [`Topology`] snapshot and the
//! container policies. A [`Traverser`] is created per operation from the
//! resulting [`Selection`]s and tracks which nodes succeeded or failed.

mod error;
mod map;
mod ring;
mod topology;
mod traverser;

pub use error::PlacementError;
pub use map::PlacementMap;
pub use ring::{NodeInfo, Ring};
pub use topology::Topology;
pub use traverser::{NodeOutcome, ReadQuorum, Selection, TraversalMode, Traverser};

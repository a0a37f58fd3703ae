//! Consistent hashing ring of storage nodes.

use std::collections::{BTreeMap, HashMap};

use kelp_types::NodeId;
use tracing::debug;

/// Metadata about a node on the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Number of vnodes this node owns.
    pub weight: u16,
}

/// Consistent hashing ring.
///
/// Each node is mapped to multiple virtual nodes (vnodes) on a u64 ring.
/// Owners of a key are found by walking clockwise from the key's position
/// until enough distinct physical nodes are collected.
#[derive(Debug, Clone)]
pub struct Ring {
    /// Virtual node positions: ring position -> physical node.
    vnodes: BTreeMap<u64, NodeId>,
    /// Per-node metadata.
    nodes: HashMap<NodeId, NodeInfo>,
    /// Default number of vnodes per node.
    vnodes_per_node: u16,
}

impl Ring {
    /// Create a new empty ring.
    pub fn new(vnodes_per_node: u16) -> Self {
        Self {
            vnodes: BTreeMap::new(),
            nodes: HashMap::new(),
            vnodes_per_node,
        }
    }

    /// Build a ring holding every node in `nodes` with the default weight.
    pub fn with_nodes(vnodes_per_node: u16, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let mut ring = Self::new(vnodes_per_node);
        for node in nodes {
            ring.add_node(node);
        }
        ring
    }

    /// Add a node with the default weight.
    pub fn add_node(&mut self, node_id: NodeId) {
        self.add_node_with_weight(node_id, self.vnodes_per_node);
    }

    /// Add a node with an explicit weight (number of vnodes).
    pub fn add_node_with_weight(&mut self, node_id: NodeId, weight: u16) {
        // Re-adding replaces the previous weight.
        self.remove_node(&node_id);

        for i in 0..weight {
            self.vnodes.insert(vnode_position(&node_id, i), node_id);
        }

        self.nodes.insert(node_id, NodeInfo { weight });
        debug!(%node_id, weight, "added node to ring");
    }

    /// Remove a node from the ring.
    pub fn remove_node(&mut self, node_id: &NodeId) {
        if let Some(info) = self.nodes.remove(node_id) {
            for i in 0..info.weight {
                self.vnodes.remove(&vnode_position(node_id, i));
            }
            debug!(%node_id, "removed node from ring");
        }
    }

    /// Return up to `count` distinct nodes owning `key`.
    ///
    /// Walks clockwise from `blake3(key)`. If fewer distinct nodes exist than
    /// `count`, returns all of them.
    pub fn owners(&self, key: &[u8], count: usize) -> Vec<NodeId> {
        if self.vnodes.is_empty() || count == 0 {
            return Vec::new();
        }

        let pos = key_position(key);
        let max_distinct = count.min(self.nodes.len());
        let mut owners = Vec::with_capacity(max_distinct);

        // Everything >= pos, then wrap around.
        let after = self.vnodes.range(pos..);
        let before = self.vnodes.range(..pos);

        for (_, node_id) in after.chain(before) {
            if !owners.contains(node_id) {
                owners.push(*node_id);
                if owners.len() == max_distinct {
                    break;
                }
            }
        }

        owners
    }

    /// Whether `node_id` is on the ring.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Return the number of physical nodes in the ring.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Return the total number of vnodes in the ring.
    pub fn vnode_count(&self) -> usize {
        self.vnodes.len()
    }

    /// Return info about a specific node, if present.
    pub fn node_info(&self, node_id: &NodeId) -> Option<&NodeInfo> {
        self.nodes.get(node_id)
    }

    /// Return all node IDs in the ring.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }
}

/// First 8 bytes of a BLAKE3 hash as a little-endian u64.
pub(crate) fn hash_position(input: &[u8]) -> u64 {
    let hash = blake3::hash(input);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// A vnode's position on the ring: blake3(node_id ++ vnode_index).
fn vnode_position(node_id: &NodeId, vnode_index: u16) -> u64 {
    let mut input = Vec::with_capacity(34);
    input.extend_from_slice(node_id.as_ref());
    input.extend_from_slice(&vnode_index.to_le_bytes());
    hash_position(&input)
}

fn key_position(key: &[u8]) -> u64 {
    hash_position(key)
}

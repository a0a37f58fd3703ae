//! Traversal over candidate node groups with per-node outcome tracking.
//!
//! A [`Traverser`] is created fresh for one operation and owned by it. The
//! driver loop asks for the next batch of nodes to contact, contacts them
//! concurrently, reports each outcome, and repeats until the traverser says
//! it is done (`Ok(None)`) or that the traversal cannot succeed.
//!
//! A node is contacted at most once per traversal. A node that appears in
//! two groups and already succeeded is credited to both without a second
//! call; a node that failed is never retried.

use std::collections::{HashMap, HashSet};

use kelp_types::NodeId;

use crate::error::PlacementError;

/// One replica group of candidates, in contact order, with the number of
/// confirmations a tracked write needs from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub nodes: Vec<NodeId>,
    pub quorum: usize,
}

impl Selection {
    pub fn new(nodes: Vec<NodeId>, quorum: usize) -> Self {
        Self { nodes, quorum }
    }
}

/// Outcome of one node within a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    Untried,
    Succeeded,
    Failed,
}

/// How many answers satisfy a read group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadQuorum {
    /// Any one node of the group.
    Single,
    /// Every node of the group.
    WholeGroup,
}

/// Traversal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Writes: every group must reach its quorum.
    Tracked,
    /// Reads: the first group (in order) to reach the read quorum satisfies
    /// the traversal.
    Read(ReadQuorum),
    /// Every candidate of every group is attempted once; never fails.
    Broadcast,
}

/// Per-operation traversal state.
#[derive(Debug)]
pub struct Traverser {
    mode: TraversalMode,
    groups: Vec<Selection>,
    current: usize,
    outcomes: HashMap<NodeId, NodeOutcome>,
    excluded: HashSet<NodeId>,
}

impl Traverser {
    /// Create a traversal over `groups`, skipping `excluded` nodes.
    ///
    /// Fails with [`PlacementError::NoCandidates`] if no node remains.
    pub fn new(
        mode: TraversalMode,
        groups: Vec<Selection>,
        excluded: impl IntoIterator<Item = NodeId>,
    ) -> Result<Self, PlacementError> {
        let excluded: HashSet<NodeId> = excluded.into_iter().collect();
        let groups: Vec<Selection> = groups
            .into_iter()
            .map(|g| Selection {
                nodes: g.nodes.into_iter().filter(|n| !excluded.contains(n)).collect(),
                quorum: g.quorum,
            })
            .collect();

        if groups.iter().all(|g| g.nodes.is_empty()) {
            return Err(PlacementError::NoCandidates);
        }

        Ok(Self {
            mode,
            groups,
            current: 0,
            outcomes: HashMap::new(),
            excluded,
        })
    }

    /// Quorum-tracked write traversal.
    pub fn tracked(groups: Vec<Selection>) -> Result<Self, PlacementError> {
        Self::new(TraversalMode::Tracked, groups, [])
    }

    /// Read traversal with the given per-group quorum.
    pub fn read(groups: Vec<Selection>, quorum: ReadQuorum) -> Result<Self, PlacementError> {
        Self::new(TraversalMode::Read(quorum), groups, [])
    }

    /// Best-effort broadcast traversal.
    pub fn broadcast(groups: Vec<Selection>) -> Result<Self, PlacementError> {
        Self::new(TraversalMode::Broadcast, groups, [])
    }

    pub fn mode(&self) -> TraversalMode {
        self.mode
    }

    /// Nodes to contact next.
    ///
    /// `Ok(None)` means the traversal is complete: quorum reached (tracked
    /// and read modes) or every candidate attempted (broadcast). An error
    /// means the traversal can no longer succeed.
    pub fn next_batch(&mut self) -> Result<Option<Vec<NodeId>>, PlacementError> {
        match self.mode {
            TraversalMode::Tracked => self.next_tracked(),
            TraversalMode::Read(quorum) => self.next_read(quorum),
            TraversalMode::Broadcast => Ok(self.next_broadcast()),
        }
    }

    /// Record the outcome of contacting `node`.
    ///
    /// Only the first report for a node counts.
    pub fn report(&mut self, node: NodeId, success: bool) {
        let outcome = if success {
            NodeOutcome::Succeeded
        } else {
            NodeOutcome::Failed
        };
        self.outcomes.entry(node).or_insert(outcome);
    }

    /// Outcome recorded for `node`.
    pub fn outcome(&self, node: &NodeId) -> NodeOutcome {
        self.outcomes
            .get(node)
            .copied()
            .unwrap_or(NodeOutcome::Untried)
    }

    /// Nodes that succeeded, in no particular order.
    pub fn succeeded(&self) -> Vec<NodeId> {
        self.with_outcome(NodeOutcome::Succeeded)
    }

    /// Nodes that failed, in no particular order.
    pub fn failed(&self) -> Vec<NodeId> {
        self.with_outcome(NodeOutcome::Failed)
    }

    /// Number of distinct nodes contacted so far.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of distinct candidate nodes across all groups.
    pub fn candidate_count(&self) -> usize {
        let mut all: HashSet<&NodeId> = HashSet::new();
        for group in &self.groups {
            all.extend(group.nodes.iter());
        }
        all.len()
    }

    /// Whether `node` was excluded at construction.
    pub fn is_excluded(&self, node: &NodeId) -> bool {
        self.excluded.contains(node)
    }

    fn with_outcome(&self, wanted: NodeOutcome) -> Vec<NodeId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| **o == wanted)
            .map(|(n, _)| *n)
            .collect()
    }

    fn count_in_group(&self, group: usize, wanted: NodeOutcome) -> usize {
        self.groups[group]
            .nodes
            .iter()
            .filter(|n| self.outcome(n) == wanted)
            .count()
    }

    fn untried_in_group(&self, group: usize) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.groups[group]
            .nodes
            .iter()
            .filter(|n| self.outcome(n) == NodeOutcome::Untried && seen.insert(**n))
            .copied()
            .collect()
    }

    fn next_tracked(&mut self) -> Result<Option<Vec<NodeId>>, PlacementError> {
        while self.current < self.groups.len() {
            let required = self.groups[self.current].quorum;
            let succeeded = self.count_in_group(self.current, NodeOutcome::Succeeded);
            if succeeded >= required {
                self.current += 1;
                continue;
            }

            let untried = self.untried_in_group(self.current);
            if untried.is_empty() {
                return Err(PlacementError::QuorumUnreachable {
                    group: self.current,
                    required,
                    succeeded,
                });
            }

            let need = required - succeeded;
            return Ok(Some(untried.into_iter().take(need).collect()));
        }
        Ok(None)
    }

    fn next_read(&mut self, quorum: ReadQuorum) -> Result<Option<Vec<NodeId>>, PlacementError> {
        while self.current < self.groups.len() {
            let group_len = self.groups[self.current].nodes.len();
            let succeeded = self.count_in_group(self.current, NodeOutcome::Succeeded);
            let satisfied = match quorum {
                ReadQuorum::Single => succeeded >= 1,
                ReadQuorum::WholeGroup => group_len > 0 && succeeded == group_len,
            };
            if satisfied {
                return Ok(None);
            }

            let untried = self.untried_in_group(self.current);
            if untried.is_empty() {
                self.current += 1;
                continue;
            }

            return Ok(Some(match quorum {
                ReadQuorum::Single => untried.into_iter().take(1).collect(),
                ReadQuorum::WholeGroup => untried,
            }));
        }

        let last = self.groups.len().saturating_sub(1);
        Err(PlacementError::QuorumUnreachable {
            group: last,
            required: match quorum {
                ReadQuorum::Single => 1,
                ReadQuorum::WholeGroup => self.groups.get(last).map_or(0, |g| g.nodes.len()),
            },
            succeeded: self.count_in_group(last, NodeOutcome::Succeeded),
        })
    }

    fn next_broadcast(&mut self) -> Option<Vec<NodeId>> {
        while self.current < self.groups.len() {
            let untried = self.untried_in_group(self.current);
            if untried.is_empty() {
                self.current += 1;
                continue;
            }
            return Some(untried);
        }
        None
    }
}

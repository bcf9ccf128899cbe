// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use internment::Intern;
use smallvec::SmallVec;

use ir_bank::{AsyncState, TaskLaunchRecord, TaskMeta};

/// Position of a node within the graph's master node list. Refreshed in bulk by
/// `reid_nodes` after any structural mutation; stale ids must not be held across one.
pub type NodeId = usize;

///
/// A sorted, deduplicating set of node ids, inline-buffered for the common low-fan-out
/// case so that edge maintenance does not allocate.
///
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SmallNodeSet(SmallVec<[NodeId; 8]>);

impl SmallNodeSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    /// Returns true if the id was newly inserted.
    pub fn insert(&mut self, id: NodeId) -> bool {
        match self.0.binary_search(&id) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, id);
                true
            }
        }
    }

    /// Returns true if the id was present.
    pub fn remove(&mut self, id: NodeId) -> bool {
        match self.0.binary_search(&id) {
            Ok(pos) => {
                self.0.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }

    ///
    /// Rewrites every member through `f`, dropping members mapped to None. Used for bulk id
    /// refreshes after node deletion or reordering.
    ///
    pub fn remap(&mut self, f: impl Fn(NodeId) -> Option<NodeId>) {
        let mut mapped: SmallVec<[NodeId; 8]> = self.0.iter().filter_map(|&id| f(id)).collect();
        mapped.sort_unstable();
        mapped.dedup();
        self.0 = mapped;
    }
}

impl FromIterator<NodeId> for SmallNodeSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> SmallNodeSet {
        let mut set = SmallNodeSet::default();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

///
/// An ordered association from state to the set of neighbor nodes connected via that
/// state. One instance holds one direction of a node's edges; the graph keeps the inbound
/// and outbound instances of all nodes mutually consistent.
///
#[derive(Clone, Debug, Default)]
pub struct StateToNodesMap(SmallVec<[(AsyncState, SmallNodeSet); 4]>);

impl StateToNodesMap {
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|(_, set)| set.is_empty())
    }

    pub fn get(&self, state: AsyncState) -> Option<&SmallNodeSet> {
        self.0
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, set)| set)
    }

    pub fn entry_mut(&mut self, state: AsyncState) -> &mut SmallNodeSet {
        if let Some(pos) = self.0.iter().position(|(s, _)| *s == state) {
            return &mut self.0[pos].1;
        }
        self.0.push((state, SmallNodeSet::default()));
        &mut self.0.last_mut().unwrap().1
    }

    /// Removes `id` from the set for `state`, dropping the entry if it empties.
    pub fn remove(&mut self, state: AsyncState, id: NodeId) -> bool {
        if let Some(pos) = self.0.iter().position(|(s, _)| *s == state) {
            let removed = self.0[pos].1.remove(id);
            if self.0[pos].1.is_empty() {
                self.0.remove(pos);
            }
            removed
        } else {
            false
        }
    }

    /// Removes and returns the whole neighbor set for `state`.
    pub fn remove_state(&mut self, state: AsyncState) -> Option<SmallNodeSet> {
        self.0
            .iter()
            .position(|(s, _)| *s == state)
            .map(|pos| self.0.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AsyncState, &SmallNodeSet)> {
        self.0.iter().map(|(s, set)| (*s, set))
    }

    ///
    /// All distinct neighbor nodes, across states.
    ///
    pub fn nodes(&self) -> SmallNodeSet {
        self.0.iter().flat_map(|(_, set)| set.iter()).collect()
    }

    pub fn remap(&mut self, f: impl Fn(NodeId) -> Option<NodeId>) {
        for (_, set) in self.0.iter_mut() {
            set.remap(&f);
        }
        self.0.retain(|(_, set)| !set.is_empty());
    }
}

///
/// A single task launch in the graph: the launch record to hand to the execution engine,
/// its interned metadata, and the two per-state edge containers.
///
pub struct Node {
    /// None only for the initial sentinel node.
    pub(crate) rec: Option<TaskLaunchRecord>,
    pub(crate) meta: Intern<TaskMeta>,
    pub(crate) is_initial_node: bool,
    pub(crate) node_id: NodeId,
    /// Position within the pending suffix; None once handed to the execution engine.
    pub(crate) pending_node_id: Option<usize>,
    pub(crate) input_edges: StateToNodesMap,
    pub(crate) output_edges: StateToNodesMap,
}

impl Node {
    pub fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    pub fn record(&self) -> Option<&TaskLaunchRecord> {
        self.rec.as_ref()
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn pending_node_id(&self) -> Option<usize> {
        self.pending_node_id
    }

    pub fn is_initial_node(&self) -> bool {
        self.is_initial_node
    }

    pub fn is_pending(&self) -> bool {
        self.pending_node_id.is_some()
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("node_id", &self.node_id)
            .field("pending_node_id", &self.pending_node_id)
            .finish()
    }
}

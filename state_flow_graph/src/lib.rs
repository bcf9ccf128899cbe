// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

mod closure;
mod node;
mod optimize;

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::io;
use std::mem;

use fixedbitset::FixedBitSet;
use fnv::{FnvHashMap as HashMap, FnvHashSet as HashSet};
use indexmap::IndexMap;
use internment::Intern;
use itertools::Itertools;
use log::debug;
use petgraph::graph::DiGraph;

use ir_bank::{AsyncState, IrBank, ResourceId, StateKind, TaskLaunchRecord, TaskMeta};

pub use crate::closure::TransitiveClosure;
pub use crate::node::{Node, NodeId, SmallNodeSet, StateToNodesMap};

/// The initial sentinel node always sits at position zero of the master list.
const INITIAL: NodeId = 0;

///
/// Per-graph optimization switches, consumed at construction.
///
#[derive(Clone, Debug)]
pub struct Options {
    pub fuse: bool,
    pub listgen_dedup: bool,
    pub demote_activation: bool,
    pub dead_store: bool,
    /// Bounds the pending range a single fusion pass computes reachability bitsets for.
    /// None processes the whole pending suffix at once.
    pub fusion_window: Option<usize>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            fuse: true,
            listgen_dedup: true,
            demote_activation: true,
            dead_store: true,
            fusion_window: None,
        }
    }
}

///
/// A dependency graph over an asynchronous stream of task launches.
///
/// Tasks enter in submission order, are connected through the states their metadata
/// declares, survive a suite of semantics-preserving optimizations, and leave as a
/// topologically ordered record sequence for the execution engine. The graph is
/// single-threaded: one owner mutates it, and all operations run to completion on the
/// calling thread.
///
pub struct StateFlowGraph {
    pub(crate) bank: IrBank,
    pub(crate) options: Options,
    /// Master node list: the executed prefix (including the initial sentinel) followed by
    /// the pending suffix, maintained in topological order.
    pub(crate) nodes: Vec<Node>,
    pub(crate) first_pending: usize,
    /// The most recent writer of each state, in state-first-seen order.
    pub(crate) latest_state_owner: IndexMap<AsyncState, NodeId>,
    /// The nodes that read each state since its last writer.
    pub(crate) latest_state_readers: IndexMap<AsyncState, SmallNodeSet>,
    pub(crate) task_name_to_launch_ids: HashMap<String, usize>,
    pub(crate) list_up_to_date: HashMap<ResourceId, bool>,
    /// States observable after the pending window is extracted; dead-store elimination
    /// must preserve their final values.
    pub(crate) live_states: HashSet<AsyncState>,
}

impl StateFlowGraph {
    pub fn new(bank: IrBank) -> StateFlowGraph {
        Self::new_with_options(bank, Options::default())
    }

    pub fn new_with_options(bank: IrBank, options: Options) -> StateFlowGraph {
        let initial = Node {
            rec: None,
            meta: Intern::new(initial_meta()),
            is_initial_node: true,
            node_id: INITIAL,
            pending_node_id: None,
            input_edges: StateToNodesMap::default(),
            output_edges: StateToNodesMap::default(),
        };
        StateFlowGraph {
            bank,
            options,
            nodes: vec![initial],
            first_pending: 1,
            latest_state_owner: IndexMap::new(),
            latest_state_readers: IndexMap::new(),
            task_name_to_launch_ids: HashMap::default(),
            list_up_to_date: HashMap::default(),
            live_states: HashSet::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn num_pending_tasks(&self) -> usize {
        self.nodes.len() - self.first_pending
    }

    pub fn pending_tasks(&self) -> &[Node] {
        &self.nodes[self.first_pending..]
    }

    pub(crate) fn pending_to_master(&self, pending_id: usize) -> NodeId {
        self.first_pending + pending_id
    }

    ///
    /// Declares a state as observable by the world outside the graph. Stores into states
    /// never declared live may be eliminated once no pending task reads them.
    ///
    pub fn mark_state_live(&mut self, state: AsyncState) {
        self.live_states.insert(state);
    }

    ///
    /// Ingests a batch of task launches in submission order, wiring data-flow and hazard
    /// edges against everything already in the graph.
    ///
    /// With `filter_listgen` set, a list-regeneration launch whose target list is already
    /// fresh is dropped without creating a node.
    ///
    pub fn insert_tasks(&mut self, records: Vec<TaskLaunchRecord>, filter_listgen: bool) {
        for rec in records {
            self.insert_task(rec, filter_listgen);
        }
    }

    fn insert_task(&mut self, mut rec: TaskLaunchRecord, filter_listgen: bool) {
        let meta = self.bank.get_or_intern_meta(rec.body);
        rec.meta = meta;

        if filter_listgen {
            if let Some(snode) = meta.listgen_target {
                if self.list_up_to_date.get(&snode).copied().unwrap_or(false) {
                    debug!("Filtered redundant list generation for {snode}");
                    return;
                }
            }
        }

        // Keep list freshness current: a list write refreshes its target, every other kind
        // of write invalidates the target's subtree.
        for state in meta.output_states.iter().copied() {
            if state.kind == StateKind::List {
                self.list_up_to_date.insert(state.resource, true);
            } else {
                self.mark_list_as_dirty(state.resource);
            }
        }

        let launch_ids = self
            .task_name_to_launch_ids
            .entry(meta.name.clone())
            .or_insert(0);
        rec.launch_id = *launch_ids;
        *launch_ids += 1;

        let id = self.nodes.len();
        self.nodes.push(Node {
            rec: Some(rec),
            meta,
            is_initial_node: false,
            node_id: id,
            pending_node_id: Some(self.num_pending_tasks()),
            input_edges: StateToNodesMap::default(),
            output_edges: StateToNodesMap::default(),
        });

        for state in meta.input_states.iter().copied() {
            let owner = self
                .latest_state_owner
                .get(&state)
                .copied()
                .unwrap_or(INITIAL);
            self.insert_edge(owner, id, state);
            self.latest_state_readers
                .entry(state)
                .or_default()
                .insert(id);
        }

        for state in meta.output_states.iter().copied() {
            // Write-after-read: every reader since the last writer must complete first.
            let readers: Vec<NodeId> = self
                .latest_state_readers
                .get(&state)
                .map(|readers| readers.iter().collect())
                .unwrap_or_default();
            for reader in readers {
                if reader != id {
                    self.insert_edge(reader, id, state);
                }
            }
            // Write-after-write against the previous owner (idempotent when the new node
            // already reads the state).
            let owner = self
                .latest_state_owner
                .get(&state)
                .copied()
                .unwrap_or(INITIAL);
            if owner != id {
                self.insert_edge(owner, id, state);
            }
            self.latest_state_owner.insert(state, id);
            self.latest_state_readers.insert(state, SmallNodeSet::default());
        }
    }

    ///
    /// The edge primitive: records `from -(state)-> to` in both adjacency directions.
    /// Idempotent per (from, to, state).
    ///
    pub(crate) fn insert_edge(&mut self, from: NodeId, to: NodeId, state: AsyncState) {
        assert_ne!(from, to, "self edge under {state}");
        self.nodes[from].output_edges.entry_mut(state).insert(to);
        self.nodes[to].input_edges.entry_mut(state).insert(from);
    }

    ///
    /// Clears list freshness for a resource and all of its descendants.
    ///
    pub(crate) fn mark_list_as_dirty(&mut self, resource: ResourceId) {
        for r in self.resource_subtree(resource) {
            self.list_up_to_date.insert(r, false);
        }
    }

    /// The resource and all of its descendants, in preorder.
    pub(crate) fn resource_subtree(&self, resource: ResourceId) -> Vec<ResourceId> {
        let mut subtree = Vec::new();
        let mut stack = vec![resource];
        while let Some(r) = stack.pop() {
            subtree.push(r);
            stack.extend(self.bank.resource_children(r));
        }
        subtree
    }

    ///
    /// Computes reachability over the pending range `[begin, end)` by bit-parallel
    /// propagation along the maintained topological order.
    ///
    pub fn compute_transitive_closure(&self, begin: usize, end: usize) -> TransitiveClosure {
        assert!(begin <= end && end <= self.num_pending_tasks());
        let n = end - begin;
        let in_range = |master: NodeId| -> Option<usize> {
            if master < self.first_pending {
                return None;
            }
            let pending = master - self.first_pending;
            if pending >= begin && pending < end {
                Some(pending - begin)
            } else {
                None
            }
        };

        let mut has_path_from = vec![FixedBitSet::with_capacity(n); n];
        for i in 0..n {
            let node = &self.nodes[self.pending_to_master(begin + i)];
            let (earlier, rest) = has_path_from.split_at_mut(i);
            let row = &mut rest[0];
            for (_, preds) in node.input_edges.iter() {
                for pred in preds.iter() {
                    if let Some(k) = in_range(pred) {
                        debug_assert!(k < i, "predecessor out of topological order");
                        row.union_with(&earlier[k]);
                    }
                }
            }
            row.insert(i);
        }

        let mut has_path_to = vec![FixedBitSet::with_capacity(n); n];
        for i in (0..n).rev() {
            let node = &self.nodes[self.pending_to_master(begin + i)];
            let (rest, later) = has_path_to.split_at_mut(i + 1);
            let row = &mut rest[i];
            for (_, succs) in node.output_edges.iter() {
                for succ in succs.iter() {
                    if let Some(k) = in_range(succ) {
                        debug_assert!(k > i, "successor out of topological order");
                        row.union_with(&later[k - i - 1]);
                    }
                }
            }
            row.insert(i);
        }

        TransitiveClosure::new(begin, has_path_from, has_path_to)
    }

    ///
    /// Kahn's algorithm over the pending suffix, tie-broken by ascending previous pending
    /// position so that re-sorting is deterministic and respects submission order between
    /// unordered tasks. Refreshes all ids afterwards.
    ///
    pub fn topo_sort_nodes(&mut self) {
        let first = self.first_pending;
        let n = self.num_pending_tasks();
        if n == 0 {
            self.reid_nodes();
            self.reid_pending_nodes();
            return;
        }

        let pending_preds = |node: &Node| -> SmallNodeSet {
            node.input_edges
                .nodes()
                .iter()
                .filter(|&id| id >= first)
                .collect()
        };

        let mut indegree = Vec::with_capacity(n);
        for i in 0..n {
            indegree.push(pending_preds(&self.nodes[first + i]).len());
        }

        let mut heap: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = heap.pop() {
            order.push(i);
            let succs: Vec<usize> = self.nodes[first + i]
                .output_edges
                .nodes()
                .iter()
                .filter(|&id| id >= first)
                .map(|id| id - first)
                .collect();
            for k in succs {
                indegree[k] -= 1;
                if indegree[k] == 0 {
                    heap.push(Reverse(k));
                }
            }
        }
        assert_eq!(
            order.len(),
            n,
            "cycle among pending tasks; the graph builder should make this impossible"
        );

        let new_order: Vec<NodeId> = (0..first).chain(order.into_iter().map(|i| first + i)).collect();
        self.apply_order(new_order);
    }

    ///
    /// Reorders the master list to `new_order` (a permutation of current ids) and rewrites
    /// every edge set and bookkeeping reference through the permutation.
    ///
    fn apply_order(&mut self, new_order: Vec<NodeId>) {
        let len = self.nodes.len();
        debug_assert_eq!(new_order.len(), len);
        let mut old_to_new = vec![usize::MAX; len];
        for (new_pos, &old) in new_order.iter().enumerate() {
            old_to_new[old] = new_pos;
        }

        let mut old_nodes: Vec<Option<Node>> =
            mem::take(&mut self.nodes).into_iter().map(Some).collect();
        self.nodes = new_order
            .iter()
            .map(|&old| old_nodes[old].take().unwrap())
            .collect();

        self.remap_references(&old_to_new);
        self.reid_nodes();
        self.reid_pending_nodes();
    }

    fn remap_references(&mut self, old_to_new: &[usize]) {
        let map = |id: NodeId| -> Option<NodeId> {
            let new = old_to_new[id];
            (new != usize::MAX).then_some(new)
        };
        for node in &mut self.nodes {
            node.input_edges.remap(map);
            node.output_edges.remap(map);
        }
        for owner in self.latest_state_owner.values_mut() {
            // A deleted owner falls back to the initial node, which stands for the state's
            // last value as far as future submissions are concerned.
            *owner = map(*owner).unwrap_or(INITIAL);
        }
        for readers in self.latest_state_readers.values_mut() {
            readers.remap(map);
        }
    }

    /// Refreshes `node_id` to each node's position in the master list.
    pub(crate) fn reid_nodes(&mut self) {
        for (id, node) in self.nodes.iter_mut().enumerate() {
            node.node_id = id;
        }
    }

    /// Refreshes `pending_node_id` to each pending node's position in the pending suffix.
    pub(crate) fn reid_pending_nodes(&mut self) {
        let first = self.first_pending;
        for (id, node) in self.nodes.iter_mut().enumerate() {
            node.pending_node_id = if id >= first { Some(id - first) } else { None };
        }
    }

    ///
    /// Re-sorts the pending suffix and hands every pending launch record to the caller in
    /// execution order. The handed-off nodes remain in the graph as executed history, so
    /// later submissions stay ordered against them, but they are no longer candidates for
    /// optimization.
    ///
    pub fn extract_to_execute(&mut self) -> Vec<TaskLaunchRecord> {
        self.topo_sort_nodes();
        let records = self
            .pending_tasks()
            .iter()
            .map(|node| {
                node.rec
                    .clone()
                    .expect("pending nodes always carry a launch record")
            })
            .collect();
        self.mark_pending_tasks_as_executed();
        records
    }

    pub fn mark_pending_tasks_as_executed(&mut self) {
        for node in &mut self.nodes[self.first_pending..] {
            node.pending_node_id = None;
        }
        self.first_pending = self.nodes.len();
    }

    ///
    /// Removes a node from the inbound/outbound sets of all its neighbors and clears its
    /// own edge maps.
    ///
    pub fn disconnect_all(&mut self, id: NodeId) {
        let input = mem::take(&mut self.nodes[id].input_edges);
        for (state, preds) in input.iter() {
            for pred in preds.iter() {
                self.nodes[pred].output_edges.remove(state, id);
            }
        }
        let output = mem::take(&mut self.nodes[id].output_edges);
        for (state, succs) in output.iter() {
            for succ in succs.iter() {
                self.nodes[succ].input_edges.remove(state, id);
            }
        }
    }

    /// Removes the symmetric edge between two nodes on every state.
    pub fn disconnect_with(&mut self, a: NodeId, b: NodeId) {
        for state in self.nodes[a]
            .output_edges
            .iter()
            .map(|(s, _)| s)
            .collect::<Vec<_>>()
        {
            self.nodes[a].output_edges.remove(state, b);
            self.nodes[b].input_edges.remove(state, a);
        }
        for state in self.nodes[a]
            .input_edges
            .iter()
            .map(|(s, _)| s)
            .collect::<Vec<_>>()
        {
            self.nodes[a].input_edges.remove(state, b);
            self.nodes[b].output_edges.remove(state, a);
        }
    }

    ///
    /// Rewrites every edge `a →(s) q` into `b →(s) q`; unless `only_output_edges`, also
    /// rewrites `p →(s) a` into `p →(s) b`. Edges that would connect `b` to itself
    /// collapse. Does not touch bookkeeping; see `replace_in_bookkeeping`.
    ///
    pub fn replace_reference(&mut self, a: NodeId, b: NodeId, only_output_edges: bool) {
        let output = mem::take(&mut self.nodes[a].output_edges);
        for (state, succs) in output.iter() {
            for succ in succs.iter() {
                self.nodes[succ].input_edges.remove(state, a);
                if succ != b {
                    self.nodes[succ].input_edges.entry_mut(state).insert(b);
                    self.nodes[b].output_edges.entry_mut(state).insert(succ);
                }
            }
        }
        if !only_output_edges {
            let input = mem::take(&mut self.nodes[a].input_edges);
            for (state, preds) in input.iter() {
                for pred in preds.iter() {
                    self.nodes[pred].output_edges.remove(state, a);
                    if pred != b {
                        self.nodes[pred].output_edges.entry_mut(state).insert(b);
                        self.nodes[b].input_edges.entry_mut(state).insert(pred);
                    }
                }
            }
        }
    }

    /// Substitutes `b` for `a` wherever the builder bookkeeping references it.
    pub(crate) fn replace_in_bookkeeping(&mut self, a: NodeId, b: NodeId) {
        for owner in self.latest_state_owner.values_mut() {
            if *owner == a {
                *owner = b;
            }
        }
        for readers in self.latest_state_readers.values_mut() {
            if readers.remove(a) {
                readers.insert(b);
            }
        }
    }

    ///
    /// Deletes the given (pending, already- or to-be-disconnected) nodes in one pass:
    /// disconnects them, compacts the master list, rewrites all indices, and refreshes ids.
    ///
    pub fn delete_nodes(&mut self, indices: Vec<NodeId>) {
        if indices.is_empty() {
            return;
        }
        let len = self.nodes.len();
        let mut dead = FixedBitSet::with_capacity(len);
        for &id in &indices {
            assert!(
                !self.nodes[id].is_initial_node,
                "the initial node cannot be deleted"
            );
            assert!(
                self.nodes[id].is_pending(),
                "only pending nodes may be deleted"
            );
            dead.insert(id);
        }
        for id in dead.ones() {
            self.disconnect_all(id);
        }

        let mut old_to_new = vec![usize::MAX; len];
        let mut survivors = Vec::with_capacity(len - dead.count_ones(..));
        for (old, node) in mem::take(&mut self.nodes).into_iter().enumerate() {
            if dead.contains(old) {
                continue;
            }
            old_to_new[old] = survivors.len();
            survivors.push(node);
        }
        self.nodes = survivors;

        self.remap_references(&old_to_new);
        self.reid_nodes();
        self.reid_pending_nodes();
    }

    ///
    /// Checks every structural invariant of the graph, returning a diagnostic for the
    /// first violation found. Optionally confirms that each node's body is still present
    /// in the bank.
    ///
    pub fn verify(&self, check_bodies: bool) -> Result<(), String> {
        let len = self.nodes.len();

        let initial_count = self.nodes.iter().filter(|n| n.is_initial_node).count();
        if initial_count != 1 {
            return Err(format!("expected exactly one initial node, found {initial_count}"));
        }
        if !self.nodes[INITIAL].is_initial_node {
            return Err("the initial node must sit at position zero".to_owned());
        }

        for (id, node) in self.nodes.iter().enumerate() {
            if node.node_id != id {
                return Err(format!(
                    "node_id {} does not match master position {id}",
                    node.node_id
                ));
            }
            let expected_pending = if id >= self.first_pending {
                Some(id - self.first_pending)
            } else {
                None
            };
            if node.pending_node_id != expected_pending {
                return Err(format!(
                    "pending_node_id {:?} of node {id} does not match expected {:?}",
                    node.pending_node_id, expected_pending
                ));
            }
        }

        for (id, node) in self.nodes.iter().enumerate() {
            for (state, succs) in node.output_edges.iter() {
                if !node.is_initial_node && !node.meta.reads(state) && !node.meta.writes(state) {
                    return Err(format!(
                        "edge source {} does not touch state {state}",
                        node.name()
                    ));
                }
                for succ in succs.iter() {
                    if succ == id {
                        return Err(format!("self edge on {} under {state}", node.name()));
                    }
                    if succ >= len {
                        return Err(format!("dangling edge target {succ}"));
                    }
                    let target = &self.nodes[succ];
                    if !target.meta.reads(state) && !target.meta.writes(state) {
                        return Err(format!(
                            "edge target {} does not touch state {state}",
                            target.name()
                        ));
                    }
                    if !target
                        .input_edges
                        .get(state)
                        .is_some_and(|set| set.contains(id))
                    {
                        return Err(format!(
                            "asymmetric edge {} -> {} under {state}",
                            node.name(),
                            target.name()
                        ));
                    }
                }
            }
            for (state, preds) in node.input_edges.iter() {
                for pred in preds.iter() {
                    if !self.nodes[pred]
                        .output_edges
                        .get(state)
                        .is_some_and(|set| set.contains(id))
                    {
                        return Err(format!(
                            "asymmetric inbound edge {} -> {} under {state}",
                            self.nodes[pred].name(),
                            node.name()
                        ));
                    }
                }
            }
        }

        // Acyclicity on the projected node graph.
        let mut pg: DiGraph<NodeId, ()> = DiGraph::with_capacity(len, len * 2);
        let pg_ids: Vec<_> = (0..len).map(|id| pg.add_node(id)).collect();
        for (id, node) in self.nodes.iter().enumerate() {
            for succ in node.output_edges.nodes().iter() {
                pg.update_edge(pg_ids[id], pg_ids[succ], ());
            }
        }
        petgraph::algo::toposort(&pg, None)
            .map_err(|cycle| format!("cycle involving node {}", pg[cycle.node_id()]))?;

        for (state, &owner) in &self.latest_state_owner {
            if owner >= len {
                return Err(format!("dangling state owner {owner} for {state}"));
            }
            let node = &self.nodes[owner];
            if !node.is_initial_node && !node.meta.writes(*state) {
                return Err(format!(
                    "state owner {} does not write {state}",
                    node.name()
                ));
            }
        }
        for (state, readers) in &self.latest_state_readers {
            for reader in readers.iter() {
                if reader >= len {
                    return Err(format!("dangling state reader {reader} for {state}"));
                }
                if !self.nodes[reader].meta.reads(*state) {
                    return Err(format!(
                        "state reader {} does not read {state}",
                        self.nodes[reader].name()
                    ));
                }
            }
        }

        if check_bodies {
            for node in &self.nodes {
                if let Some(rec) = &node.rec {
                    let _ = self.bank.body(rec.body);
                }
            }
        }

        Ok(())
    }

    ///
    /// Emits the graph as GraphViz text. Nodes with fewer output states than
    /// `embed_states_threshold` carry their state labels inline; otherwise states annotate
    /// the outgoing edges. Flow edges render solid, pure dependency edges dashed.
    ///
    pub fn dump_dot(
        &self,
        f: &mut dyn io::Write,
        rankdir: Option<&str>,
        embed_states_threshold: usize,
    ) -> io::Result<()> {
        writeln!(f, "digraph task_graph {{")?;
        if let Some(rankdir) = rankdir {
            writeln!(f, "  rankdir={rankdir};")?;
        }
        for node in &self.nodes {
            let embed_states = node.meta.output_states.len() < embed_states_threshold;
            let label = if node.is_initial_node {
                node.name().to_owned()
            } else {
                let launch_id = node.rec.as_ref().map(|r| r.launch_id).unwrap_or(0);
                let mut label = format!("{} #{launch_id}", node.name());
                if embed_states {
                    for state in &node.meta.output_states {
                        label.push_str("\\n");
                        label.push_str(&self.state_label(*state));
                    }
                }
                label
            };
            let shape = if node.is_initial_node { "box" } else { "ellipse" };
            writeln!(f, "  n{} [label=\"{label}\",shape={shape}];", node.node_id)?;
        }
        for node in &self.nodes {
            let embed_states = node.meta.output_states.len() < embed_states_threshold;
            for (state, succs) in node.output_edges.iter() {
                for succ in succs.iter() {
                    let style = if self.nodes[succ].meta.reads(state) {
                        "solid"
                    } else {
                        "dashed"
                    };
                    if embed_states {
                        writeln!(f, "  n{} -> n{succ} [style={style}];", node.node_id)?;
                    } else {
                        writeln!(
                            f,
                            "  n{} -> n{succ} [style={style},label=\"{}\"];",
                            node.node_id,
                            self.state_label(state)
                        )?;
                    }
                }
            }
        }
        writeln!(f, "}}")
    }

    pub(crate) fn state_label(&self, state: AsyncState) -> String {
        format!(
            "{}${}",
            self.bank.resource_name(state.resource),
            state.kind.suffix()
        )
    }

    ///
    /// Runs all enabled optimization passes to a fixed point. Returns whether anything
    /// changed.
    ///
    pub fn optimize(&mut self) -> bool {
        let mut any = false;
        loop {
            let mut changed = false;
            if self.options.listgen_dedup {
                changed |= self.optimize_listgen();
            }
            if self.options.fuse {
                changed |= self.fuse();
            }
            if self.options.demote_activation {
                changed |= self.demote_activation();
            }
            if self.options.dead_store {
                changed |= self.optimize_dead_store();
            }
            if !changed {
                break;
            }
            any = true;
        }
        any
    }

    /// A compact description of the pending suffix, for logs and debugging.
    pub fn pending_summary(&self) -> String {
        self.pending_tasks().iter().map(|n| n.name()).join(", ")
    }
}

fn initial_meta() -> TaskMeta {
    TaskMeta {
        name: "initial_state".to_owned(),
        input_states: BTreeSet::new(),
        output_states: BTreeSet::new(),
        arch: ir_bank::Arch::X64,
        shape: ir_bank::LaunchShape::Serial,
        element_wise: false,
        block_dim: 0,
        touched_resources: BTreeSet::new(),
        listgen_target: None,
        activates: BTreeSet::new(),
        deactivates: BTreeSet::new(),
        demotable_activation: None,
        has_side_effects: false,
    }
}

#[cfg(test)]
mod tests;

// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::FnvHashMap as HashMap;
use log::debug;

use ir_bank::{AsyncState, Fingerprint, ResourceId, StateKind};

use crate::node::NodeId;
use crate::{StateFlowGraph, INITIAL};

impl StateFlowGraph {
    ///
    /// Scans the pending range `[begin, end)` for fusible pairs, merging each accepted
    /// pair's bodies and rewiring the source's edges onto the target. Fuses are batched: a
    /// node participates in at most one fuse per pass, and sources are returned for the
    /// caller to pass to `delete_nodes` (as `fuse` does).
    ///
    pub fn fuse_range(&mut self, begin: usize, end: usize) -> Vec<NodeId> {
        let n = end - begin;
        if n < 2 {
            return Vec::new();
        }
        let mut tc = self.compute_transitive_closure(begin, end);
        let mut consumed = vec![false; n];
        let mut deleted = Vec::new();

        for i in 0..n {
            if consumed[i] {
                continue;
            }
            let a = self.pending_to_master(begin + i);
            for j in (i + 1)..n {
                if consumed[j] {
                    continue;
                }
                let b = self.pending_to_master(begin + j);
                let (meta_a, meta_b) = (self.nodes[a].meta, self.nodes[b].meta);
                // One write-set must contain the other: the merged write-set then equals
                // the larger parent's, so downstream hazard edges keep their meaning. A
                // writer and the reader of its value have incomparable write-sets and are
                // never candidates.
                if !meta_a.output_states.is_subset(&meta_b.output_states)
                    && !meta_b.output_states.is_subset(&meta_a.output_states)
                {
                    continue;
                }
                if !self.bank.are_fusible(&meta_a, &meta_b) {
                    continue;
                }
                // Nothing else may sit on a path between the pair: the source's work moves
                // to the target's position, and an ordered intermediate would observe it
                // half-done. Earlier fuses in this pass can graft a source's edges onto a
                // later target, so a backward path must also be ruled out.
                if tc.reaches(begin + j, begin + i) {
                    continue;
                }
                if !tc.strictly_between(begin + i, begin + j).is_clear() {
                    continue;
                }
                let body_a = self.nodes[a].rec.as_ref().unwrap().body;
                let body_b = self.nodes[b].rec.as_ref().unwrap().body;
                let Some(merged) = self.bank.fuse_bodies(body_a, body_b) else {
                    continue;
                };
                self.fuse_into(a, b, merged);
                tc.merge(begin + i, begin + j);
                consumed[i] = true;
                consumed[j] = true;
                deleted.push(a);
                break;
            }
        }
        deleted
    }

    ///
    /// Runs `fuse_range` over the whole pending suffix (in windows when configured, to
    /// bound bitset memory) until a pass fuses nothing. Returns whether any fusion
    /// happened.
    ///
    pub fn fuse(&mut self) -> bool {
        let mut any = false;
        loop {
            let n = self.num_pending_tasks();
            if n < 2 {
                break;
            }
            let window = self.options.fusion_window.unwrap_or(n).max(2);
            let mut deleted = Vec::new();
            let mut begin = 0;
            while begin < n {
                let end = (begin + window).min(n);
                deleted.extend(self.fuse_range(begin, end));
                begin = end;
            }
            if deleted.is_empty() {
                break;
            }
            debug!("Fusion deleted {} tasks", deleted.len());
            self.delete_nodes(deleted);
            self.topo_sort_nodes();
            any = true;
        }
        any
    }

    fn fuse_into(&mut self, a: NodeId, b: NodeId, merged: Fingerprint) {
        debug!("Fusing {} into {}", self.nodes[a].name(), self.nodes[b].name());
        let meta = self.bank.get_or_intern_meta(merged);
        {
            let node = &mut self.nodes[b];
            node.meta = meta;
            let rec = node.rec.as_mut().unwrap();
            rec.body = merged;
            rec.meta = meta;
        }
        // The target inherits the source's inbound edges plus its own; the source's other
        // outbound edges transfer; the source→target edges collapse.
        self.replace_reference(a, b, false);
        self.replace_in_bookkeeping(a, b);
    }

    ///
    /// Deletes a pending list-regeneration task when an earlier pending one for the same
    /// resource is still valid, redirecting consumers of the regenerated list to the
    /// surviving task. Returns whether anything was deleted.
    ///
    pub fn optimize_listgen(&mut self) -> bool {
        let first = self.first_pending;
        let n = self.num_pending_tasks();
        let mut last_listgen: HashMap<ResourceId, NodeId> = HashMap::default();
        let mut deleted = Vec::new();

        for i in 0..n {
            let id = first + i;
            let meta = self.nodes[id].meta;
            if let Some(snode) = meta.listgen_target {
                if let Some(&prev) = last_listgen.get(&snode) {
                    debug!(
                        "Deleting redundant list generation {} for {snode}",
                        self.nodes[id].name()
                    );
                    self.replace_reference(id, prev, true);
                    self.disconnect_all(id);
                    self.replace_in_bookkeeping(id, prev);
                    deleted.push(id);
                } else {
                    last_listgen.insert(snode, id);
                }
                continue;
            }
            // Any other write invalidates: non-list writes dirty the target's whole
            // subtree, and a list write outside a dedicated listgen task makes the
            // previous regeneration non-canonical.
            for state in meta.output_states.iter() {
                if state.kind == StateKind::List {
                    last_listgen.remove(&state.resource);
                } else {
                    for r in self.resource_subtree(state.resource) {
                        last_listgen.remove(&r);
                    }
                }
            }
        }

        if deleted.is_empty() {
            return false;
        }
        self.delete_nodes(deleted);
        self.topo_sort_nodes();
        true
    }

    ///
    /// Rewrites activate-then-write tasks into plain writes when a predecessor over the
    /// same launch domain already guarantees the activation and no task that could run in
    /// between deactivates the region. Returns whether any task was rewritten.
    ///
    pub fn demote_activation(&mut self) -> bool {
        let mut changed = false;
        // Each demotion rewires edges, so reachability is recomputed per accepted
        // candidate rather than batched.
        loop {
            let n = self.num_pending_tasks();
            if n == 0 {
                break;
            }
            let tc = self.compute_transitive_closure(0, n);
            let first = self.first_pending;
            let mut did_demote = false;

            'candidates: for i in 0..n {
                let x = first + i;
                let meta_x = self.nodes[x].meta;
                let Some(resource) = meta_x.demotable_activation else {
                    continue;
                };
                // The latest qualifying ancestor minimizes the window a deactivator could
                // slip into.
                let provider = (0..i).rev().find(|&j| {
                    let meta_p = self.nodes[first + j].meta;
                    meta_p.activates.contains(&resource)
                        && meta_p.shape == meta_x.shape
                        && meta_p.element_wise == meta_x.element_wise
                        && tc.reaches(j, i)
                });
                let Some(j) = provider else {
                    continue;
                };
                for c in 0..n {
                    if c == i || c == j {
                        continue;
                    }
                    let deactivates = self.nodes[first + c].meta.deactivates.contains(&resource);
                    if deactivates && !tc.reaches(c, j) {
                        // The deactivation is not provably before the provider, so the
                        // guarantee does not hold at this task.
                        continue 'candidates;
                    }
                }
                self.demote_node(x, resource);
                did_demote = true;
                break;
            }

            if !did_demote {
                break;
            }
            changed = true;
        }
        if changed {
            self.topo_sort_nodes();
        }
        changed
    }

    fn demote_node(&mut self, x: NodeId, resource: ResourceId) {
        debug!(
            "Demoting activation of {resource} in {}",
            self.nodes[x].name()
        );
        let mask = AsyncState::mask(resource);
        let old_body = self.nodes[x].rec.as_ref().unwrap().body;
        let new_body = self.bank.rewrite_for_demotion(old_body, resource);
        let new_meta = self.bank.get_or_intern_meta(new_body);
        {
            let node = &mut self.nodes[x];
            node.meta = new_meta;
            let rec = node.rec.as_mut().unwrap();
            rec.body = new_body;
            rec.meta = new_meta;
        }
        // The demoted task no longer touches the mask; its mask edges dissolve, with the
        // chain through it bridged.
        self.drop_state_edges(x, mask);
    }

    ///
    /// Eliminates stores whose values no pending task reads and which the outside world
    /// will never observe, then deletes any task left with no outputs and no side
    /// effects. Returns whether anything changed.
    ///
    pub fn optimize_dead_store(&mut self) -> bool {
        let first = self.first_pending;
        let n = self.num_pending_tasks();
        let mut changed = false;
        let mut deleted = Vec::new();

        // Reverse topological order, so that eliminating a later writer exposes earlier
        // writers of the same state within this pass.
        for i in (0..n).rev() {
            let x = first + i;
            let meta_x = self.nodes[x].meta;
            let states: Vec<AsyncState> = meta_x.output_states.iter().copied().collect();
            for state in states {
                // Only plain value stores are candidates; mask and list writes shape the
                // structure other tasks iterate over.
                if state.kind != StateKind::Value {
                    continue;
                }
                // By construction every reader of this store has a direct flow edge from
                // it, so "readers before the next writer" are exactly the flow successors.
                let has_reader = self.nodes[x]
                    .output_edges
                    .get(state)
                    .is_some_and(|succs| succs.iter().any(|m| self.nodes[m].meta.reads(state)));
                if has_reader {
                    continue;
                }
                if self.live_states.contains(&state) {
                    // A live value is still dead when a later pending writer over the same
                    // launch domain fully overwrites it before anything reads it.
                    let overwritten = self.nodes[x].output_edges.get(state).is_some_and(|succs| {
                        succs.iter().any(|m| {
                            let meta_m = self.nodes[m].meta;
                            meta_m.writes(state)
                                && meta_m.shape == meta_x.shape
                                && meta_m.element_wise == meta_x.element_wise
                        })
                    });
                    if !overwritten {
                        continue;
                    }
                }

                let old_body = self.nodes[x].rec.as_ref().unwrap().body;
                let new_body = self.bank.remove_stores(old_body, state);
                if new_body == old_body {
                    continue;
                }
                let new_meta = self.bank.get_or_intern_meta(new_body);
                debug!(
                    "Eliminating dead store of {state} from {}",
                    self.nodes[x].name()
                );
                {
                    let node = &mut self.nodes[x];
                    node.meta = new_meta;
                    let rec = node.rec.as_mut().unwrap();
                    rec.body = new_body;
                    rec.meta = new_meta;
                }
                if new_meta.reads(state) {
                    // Dropping the store exposed an upstream read: the node keeps its flow
                    // and hazard edges but is no longer the state's writer.
                    if self.latest_state_owner.get(&state) == Some(&x) {
                        let fallback = self.nodes[x]
                            .input_edges
                            .get(state)
                            .into_iter()
                            .flat_map(|set| set.iter())
                            .find(|&p| {
                                self.nodes[p].is_initial_node || self.nodes[p].meta.writes(state)
                            })
                            .unwrap_or(INITIAL);
                        self.latest_state_owner.insert(state, fallback);
                    }
                    self.latest_state_readers
                        .entry(state)
                        .or_default()
                        .insert(x);
                } else {
                    self.drop_state_edges(x, state);
                }
                changed = true;
            }

            let meta = self.nodes[x].meta;
            if meta.output_states.is_empty() && !meta.has_side_effects {
                let states: Vec<AsyncState> = self.nodes[x]
                    .input_edges
                    .iter()
                    .map(|(s, _)| s)
                    .chain(self.nodes[x].output_edges.iter().map(|(s, _)| s))
                    .collect();
                for state in states {
                    self.drop_state_edges(x, state);
                }
                debug!("Deleting effect-free task {}", self.nodes[x].name());
                deleted.push(x);
                changed = true;
            }
        }

        if !deleted.is_empty() {
            self.delete_nodes(deleted);
            self.topo_sort_nodes();
        }
        changed
    }

    ///
    /// Removes a node's edges under one state in both directions, bridging each old
    /// predecessor to each old successor so the state's hazard chain keeps its order, and
    /// repairs the owner/reader bookkeeping.
    ///
    fn drop_state_edges(&mut self, x: NodeId, state: AsyncState) {
        let preds = self.nodes[x]
            .input_edges
            .remove_state(state)
            .unwrap_or_default();
        let succs = self.nodes[x]
            .output_edges
            .remove_state(state)
            .unwrap_or_default();
        for p in preds.iter() {
            self.nodes[p].output_edges.remove(state, x);
        }
        for q in succs.iter() {
            self.nodes[q].input_edges.remove(state, x);
        }
        for p in preds.iter() {
            for q in succs.iter() {
                if p != q {
                    self.insert_edge(p, q, state);
                }
            }
        }

        if self.latest_state_owner.get(&state) == Some(&x) {
            let fallback = preds
                .iter()
                .find(|&p| self.nodes[p].is_initial_node || self.nodes[p].meta.writes(state))
                .unwrap_or(INITIAL);
            self.latest_state_owner.insert(state, fallback);
        }
        if let Some(readers) = self.latest_state_readers.get_mut(&state) {
            readers.remove(x);
        }
    }
}

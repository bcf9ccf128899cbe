// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fixedbitset::FixedBitSet;

///
/// Reachability bitsets over a half-open range of pending tasks. Row `i` describes the
/// node at pending position `begin + i`; bits are range-relative. Each row includes its
/// own bit, so `has_path_from[i]` is "i plus every in-range ancestor of i" and
/// `has_path_to[i]` is "i plus every in-range descendant of i".
///
/// Valid only until the next structural mutation of the graph.
///
pub struct TransitiveClosure {
    begin: usize,
    has_path_from: Vec<FixedBitSet>,
    has_path_to: Vec<FixedBitSet>,
}

impl TransitiveClosure {
    pub(crate) fn new(
        begin: usize,
        has_path_from: Vec<FixedBitSet>,
        has_path_to: Vec<FixedBitSet>,
    ) -> TransitiveClosure {
        TransitiveClosure {
            begin,
            has_path_from,
            has_path_to,
        }
    }

    pub fn len(&self) -> usize {
        self.has_path_from.len()
    }

    fn rel(&self, pending_id: usize) -> usize {
        debug_assert!(
            pending_id >= self.begin && pending_id < self.begin + self.len(),
            "pending id {} outside closure range [{}, {})",
            pending_id,
            self.begin,
            self.begin + self.len()
        );
        pending_id - self.begin
    }

    ///
    /// Whether a path `from →* to` exists within the range. Reflexive: a node reaches
    /// itself. Arguments are pending positions.
    ///
    pub fn reaches(&self, from: usize, to: usize) -> bool {
        self.has_path_to[self.rel(from)].contains(self.rel(to))
    }

    /// `to` plus its in-range ancestors, as range-relative bits.
    pub fn has_path_from(&self, to: usize) -> &FixedBitSet {
        &self.has_path_from[self.rel(to)]
    }

    /// `from` plus its in-range descendants, as range-relative bits.
    pub fn has_path_to(&self, from: usize) -> &FixedBitSet {
        &self.has_path_to[self.rel(from)]
    }

    ///
    /// The nodes lying on some path `a →* c →* b`, excluding `a` and `b` themselves.
    /// Arguments are pending positions; result bits are range-relative.
    ///
    pub fn strictly_between(&self, a: usize, b: usize) -> FixedBitSet {
        let (a, b) = (self.rel(a), self.rel(b));
        let mut on_path = self.has_path_to[a].clone();
        on_path.intersect_with(&self.has_path_from[b]);
        on_path.set(a, false);
        on_path.set(b, false);
        on_path
    }

    ///
    /// Folds node `a` into node `b` after a fusion: the merged node reaches the union of
    /// what either reached, everything that reached either now reaches that union, and
    /// both positions keep the merged rows (`a` lives on as a conservative alias). One
    /// sweep suffices because the rows were already transitively closed.
    ///
    pub(crate) fn merge(&mut self, a: usize, b: usize) {
        let (a, b) = (self.rel(a), self.rel(b));
        let mut new_to = self.has_path_to[a].clone();
        new_to.union_with(&self.has_path_to[b]);
        let mut new_from = self.has_path_from[a].clone();
        new_from.union_with(&self.has_path_from[b]);
        for row in &mut self.has_path_to {
            if row.contains(a) || row.contains(b) {
                row.union_with(&new_to);
            }
        }
        for row in &mut self.has_path_from {
            if row.contains(a) || row.contains(b) {
                row.union_with(&new_from);
            }
        }
    }
}

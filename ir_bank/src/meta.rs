// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::BTreeSet;
use std::fmt;

use crate::body::{Arch, LaunchShape, Stmt, TaskBody};
use crate::{AsyncState, ResourceId, StateKind};

///
/// Immutable, interned metadata for one distinct task body: the states it reads and writes,
/// its launch-invariant attributes, and the hints the optimization passes consume. Derived
/// once per body fingerprint by `TaskMeta::derive` and shared between all launches of the
/// same body.
///
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TaskMeta {
    pub name: String,
    pub input_states: BTreeSet<AsyncState>,
    pub output_states: BTreeSet<AsyncState>,
    pub arch: Arch,
    pub shape: LaunchShape,
    pub element_wise: bool,
    pub block_dim: u32,
    pub touched_resources: BTreeSet<ResourceId>,
    /// Set when the body does nothing but regenerate the active-cell list of one resource.
    pub listgen_target: Option<ResourceId>,
    /// Resources whose cells this body guarantees activated over its launch domain.
    pub activates: BTreeSet<ResourceId>,
    /// Resources this body deactivates cells of.
    pub deactivates: BTreeSet<ResourceId>,
    /// Set when the body activates a resource only to guard its own stores, making the
    /// activation removable if a predecessor already guarantees it.
    pub demotable_activation: Option<ResourceId>,
    pub has_side_effects: bool,
}

impl TaskMeta {
    pub fn reads(&self, state: AsyncState) -> bool {
        self.input_states.contains(&state)
    }

    pub fn writes(&self, state: AsyncState) -> bool {
        self.output_states.contains(&state)
    }

    pub fn is_listgen(&self) -> bool {
        self.listgen_target.is_some()
    }

    ///
    /// Derives metadata from a body by a single ordered scan of its statements.
    ///
    /// The scan is order-aware: a load of a state the body has already written is a
    /// task-local def-use and does not become an input. This makes derivation compose with
    /// body concatenation: the metadata of `A+B` has exactly
    /// `in = A.in ∪ (B.in \ A.out)` and `out = A.out ∪ B.out`.
    ///
    pub fn derive(body: &TaskBody) -> TaskMeta {
        let mut input_states = BTreeSet::new();
        let mut output_states = BTreeSet::new();
        let mut touched_resources = BTreeSet::new();
        let mut activates = BTreeSet::new();
        let mut deactivates = BTreeSet::new();
        let mut has_side_effects = false;
        let mut list_ops_only = true;
        let mut list_targets = BTreeSet::new();
        let mut stored_values = BTreeSet::new();

        let read = |state: AsyncState,
                        outputs: &BTreeSet<AsyncState>,
                        inputs: &mut BTreeSet<AsyncState>| {
            if !outputs.contains(&state) {
                inputs.insert(state);
            }
        };

        for stmt in &body.stmts {
            match *stmt {
                Stmt::Load { state, .. } => {
                    read(state, &output_states, &mut input_states);
                    touched_resources.insert(state.resource);
                    list_ops_only = false;
                }
                Stmt::Store { state, .. } => {
                    output_states.insert(state);
                    touched_resources.insert(state.resource);
                    if state.kind == StateKind::Value {
                        stored_values.insert(state.resource);
                    }
                    list_ops_only = false;
                }
                Stmt::Activate { resource } => {
                    // Activation is a read-modify-write of the mask.
                    read(
                        AsyncState::mask(resource),
                        &output_states,
                        &mut input_states,
                    );
                    output_states.insert(AsyncState::mask(resource));
                    touched_resources.insert(resource);
                    activates.insert(resource);
                    list_ops_only = false;
                }
                Stmt::Deactivate { resource } => {
                    read(
                        AsyncState::mask(resource),
                        &output_states,
                        &mut input_states,
                    );
                    output_states.insert(AsyncState::mask(resource));
                    touched_resources.insert(resource);
                    deactivates.insert(resource);
                    list_ops_only = false;
                }
                Stmt::ClearList { resource } => {
                    output_states.insert(AsyncState::list(resource));
                    touched_resources.insert(resource);
                    list_targets.insert(resource);
                }
                Stmt::GenerateList { resource } => {
                    // The list is rebuilt from the current mask.
                    read(
                        AsyncState::mask(resource),
                        &output_states,
                        &mut input_states,
                    );
                    output_states.insert(AsyncState::list(resource));
                    touched_resources.insert(resource);
                    list_targets.insert(resource);
                }
                Stmt::Print { .. } => {
                    has_side_effects = true;
                    list_ops_only = false;
                }
                Stmt::LoadConst { .. } | Stmt::Unary { .. } | Stmt::Binary { .. } => {}
            }
        }

        let listgen_target = if list_ops_only && list_targets.len() == 1 {
            list_targets.iter().next().copied()
        } else {
            None
        };

        // An activation is a demotion candidate when it exists only to guard this body's own
        // value stores.
        let mut demotion_candidates = activates
            .iter()
            .filter(|r| stored_values.contains(r))
            .copied();
        let demotable_activation = match (demotion_candidates.next(), demotion_candidates.next()) {
            (Some(resource), None) => Some(resource),
            _ => None,
        };

        TaskMeta {
            name: body.name.clone(),
            input_states,
            output_states,
            arch: body.arch,
            shape: body.shape,
            element_wise: body.element_wise,
            block_dim: body.block_dim,
            touched_resources,
            listgen_target,
            activates,
            deactivates,
            demotable_activation,
            has_side_effects,
        }
    }
}

impl fmt::Display for TaskMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

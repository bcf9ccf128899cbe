// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

mod bank;
mod body;
pub mod const_fold;
mod meta;

use std::fmt;

pub use crate::bank::{IrBank, TaskLaunchRecord};
pub use crate::body::{Arch, BinaryOp, ConstValue, LaunchShape, Reg, Stmt, TaskBody, UnaryOp};
pub use crate::meta::TaskMeta;

pub use hashing::Fingerprint;

///
/// Identifies a registered mutable resource (a data array, or a node of a sparse structure).
/// Resources form a forest: sparse structures have parents and children, and list freshness
/// propagates along that hierarchy.
///
#[derive(Clone, Copy, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct ResourceId(pub(crate) u32);

impl ResourceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

///
/// The component of a resource that a state handle names.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum StateKind {
    /// The stored data of the resource.
    Value,
    /// The active-cell list of a sparse resource.
    List,
    /// The activity mask of a sparse resource.
    Mask,
}

impl StateKind {
    pub fn suffix(self) -> &'static str {
        match self {
            StateKind::Value => "value",
            StateKind::List => "list",
            StateKind::Mask => "mask",
        }
    }
}

///
/// An identity-comparable handle for one mutable state the graph reasons about: a resource
/// paired with the component of it that is read or written.
///
#[derive(Clone, Copy, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct AsyncState {
    pub resource: ResourceId,
    pub kind: StateKind,
}

impl AsyncState {
    pub fn value(resource: ResourceId) -> AsyncState {
        AsyncState {
            resource,
            kind: StateKind::Value,
        }
    }

    pub fn list(resource: ResourceId) -> AsyncState {
        AsyncState {
            resource,
            kind: StateKind::List,
        }
    }

    pub fn mask(resource: ResourceId) -> AsyncState {
        AsyncState {
            resource,
            kind: StateKind::Mask,
        }
    }
}

impl fmt::Debug for AsyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for AsyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}", self.resource, self.kind.suffix())
    }
}

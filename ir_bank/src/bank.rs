// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use fnv::FnvHashMap as HashMap;
use internment::Intern;
use log::trace;
use parking_lot::Mutex;

use hashing::Fingerprint;

use crate::body::{Stmt, TaskBody};
use crate::const_fold;
use crate::meta::TaskMeta;
use crate::{AsyncState, ResourceId};

///
/// One launch of a task: the content-addressed body, its interned metadata, and the ordinal
/// of this launch among launches of the same task name. Opaque to the execution engine
/// apart from these fields.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskLaunchRecord {
    pub body: Fingerprint,
    pub meta: Intern<TaskMeta>,
    pub launch_id: usize,
}

impl TaskLaunchRecord {
    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

struct Resource {
    name: String,
    parent: Option<ResourceId>,
    children: Vec<ResourceId>,
}

struct Inner {
    bodies: HashMap<Fingerprint, Arc<TaskBody>>,
    metas: HashMap<Fingerprint, Intern<TaskMeta>>,
    resources: Vec<Resource>,
}

impl Inner {
    fn intern_body(&mut self, body: TaskBody) -> Fingerprint {
        let fingerprint = body.fingerprint();
        self.bodies
            .entry(fingerprint)
            .or_insert_with(|| Arc::new(body));
        fingerprint
    }

    fn body(&self, fingerprint: Fingerprint) -> Arc<TaskBody> {
        self.bodies
            .get(&fingerprint)
            .unwrap_or_else(|| panic!("Body not present in bank: {fingerprint}"))
            .clone()
    }

    fn get_or_intern_meta(&mut self, fingerprint: Fingerprint) -> Intern<TaskMeta> {
        if let Some(&meta) = self.metas.get(&fingerprint) {
            return meta;
        }
        let body = self.body(fingerprint);
        let meta = Intern::new(TaskMeta::derive(&body));
        self.metas.insert(fingerprint, meta);
        meta
    }
}

///
/// A shared, deduplicating store for task bodies and their metadata. Bodies are
/// content-addressed by fingerprint; metadata is interned, so identical IR submitted from
/// any thread shares one `TaskMeta` allocation.
///
/// The bank guards its own interior mutability with a single mutex; handles it returns
/// (`Arc<TaskBody>`, `Intern<TaskMeta>`) are immutable and freely shareable.
///
#[derive(Clone)]
pub struct IrBank {
    inner: Arc<Mutex<Inner>>,
}

impl IrBank {
    pub fn new() -> IrBank {
        IrBank {
            inner: Arc::new(Mutex::new(Inner {
                bodies: HashMap::default(),
                metas: HashMap::default(),
                resources: Vec::new(),
            })),
        }
    }

    pub fn register_resource(&self, name: &str, parent: Option<ResourceId>) -> ResourceId {
        let mut inner = self.inner.lock();
        let id = ResourceId(inner.resources.len() as u32);
        if let Some(parent) = parent {
            inner.resources[parent.index()].children.push(id);
        }
        inner.resources.push(Resource {
            name: name.to_owned(),
            parent,
            children: Vec::new(),
        });
        id
    }

    pub fn resource_name(&self, resource: ResourceId) -> String {
        self.inner.lock().resources[resource.index()].name.clone()
    }

    pub fn resource_parent(&self, resource: ResourceId) -> Option<ResourceId> {
        self.inner.lock().resources[resource.index()].parent
    }

    pub fn resource_children(&self, resource: ResourceId) -> Vec<ResourceId> {
        self.inner.lock().resources[resource.index()].children.clone()
    }

    pub fn intern_body(&self, body: TaskBody) -> Fingerprint {
        self.inner.lock().intern_body(body)
    }

    pub fn body(&self, fingerprint: Fingerprint) -> Arc<TaskBody> {
        self.inner.lock().body(fingerprint)
    }

    ///
    /// Returns the interned metadata for a body, deriving it on first request. Identical IR
    /// shares metadata.
    ///
    pub fn get_or_intern_meta(&self, fingerprint: Fingerprint) -> Intern<TaskMeta> {
        self.inner.lock().get_or_intern_meta(fingerprint)
    }

    ///
    /// Builds a launch record for an interned body. The launch id is assigned when the
    /// record is inserted into a graph.
    ///
    pub fn record(&self, fingerprint: Fingerprint) -> TaskLaunchRecord {
        let meta = self.get_or_intern_meta(fingerprint);
        TaskLaunchRecord {
            body: fingerprint,
            meta,
            launch_id: 0,
        }
    }

    ///
    /// Whether two task bodies may be merged into one launch: identical launch shape and
    /// launch-invariant attributes; neither is list maintenance (list regeneration has its
    /// own dedicated optimization and must keep its identity); neither carries side
    /// effects, whose order against unrelated tasks must not change.
    ///
    pub fn are_fusible(&self, a: &TaskMeta, b: &TaskMeta) -> bool {
        a.element_wise == b.element_wise
            && a.shape == b.shape
            && a.arch == b.arch
            && a.block_dim == b.block_dim
            && !a.is_listgen()
            && !b.is_listgen()
            && !a.has_side_effects
            && !b.has_side_effects
    }

    ///
    /// Merges two bodies into one that executes `a` then `b`, renumbering `b`'s registers
    /// past `a`'s. Returns None when the bodies are not joinable.
    ///
    pub fn fuse_bodies(&self, a: Fingerprint, b: Fingerprint) -> Option<Fingerprint> {
        let mut inner = self.inner.lock();
        let body_a = inner.body(a);
        let body_b = inner.body(b);
        let meta_a = inner.get_or_intern_meta(a);
        let meta_b = inner.get_or_intern_meta(b);
        if !self.are_fusible(&meta_a, &meta_b) {
            return None;
        }

        let offset = body_a.reg_count();
        let mut stmts = body_a.stmts.clone();
        stmts.extend(body_b.stmts.iter().map(|s| s.map_regs(|r| r + offset)));
        let merged = TaskBody {
            name: format!("{}+{}", body_a.name, body_b.name),
            arch: body_a.arch,
            shape: body_a.shape,
            element_wise: body_a.element_wise,
            block_dim: body_a.block_dim,
            stmts,
        };
        let fingerprint = inner.intern_body(merged);
        trace!("Fused {} and {} into {}", body_a.name, body_b.name, fingerprint);
        Some(fingerprint)
    }

    ///
    /// Rewrites a body to drop its activation of `resource`, for use once a predecessor is
    /// known to guarantee that activation. The result is a distinct body with a distinct
    /// fingerprint; its derived metadata no longer writes the resource's mask.
    ///
    pub fn rewrite_for_demotion(&self, fingerprint: Fingerprint, resource: ResourceId) -> Fingerprint {
        let mut inner = self.inner.lock();
        let body = inner.body(fingerprint);
        let stmts = body
            .stmts
            .iter()
            .filter(|stmt| !matches!(stmt, Stmt::Activate { resource: r } if *r == resource))
            .cloned()
            .collect();
        let demoted = TaskBody {
            name: format!("{}_demoted", body.name),
            arch: body.arch,
            shape: body.shape,
            element_wise: body.element_wise,
            block_dim: body.block_dim,
            stmts,
        };
        inner.intern_body(demoted)
    }

    ///
    /// Drops all stores to `state` from a body. Arithmetic feeding the removed stores is
    /// left in place; it is launch-local and has no observable effect.
    ///
    pub fn remove_stores(&self, fingerprint: Fingerprint, state: AsyncState) -> Fingerprint {
        let mut inner = self.inner.lock();
        let body = inner.body(fingerprint);
        let stmts = body
            .stmts
            .iter()
            .filter(|stmt| !matches!(stmt, Stmt::Store { state: s, .. } if *s == state))
            .cloned()
            .collect();
        let edited = TaskBody {
            name: body.name.clone(),
            arch: body.arch,
            shape: body.shape,
            element_wise: body.element_wise,
            block_dim: body.block_dim,
            stmts,
        };
        inner.intern_body(edited)
    }

    ///
    /// Applies constant folding to a body and interns the result.
    ///
    pub fn fold_body(&self, fingerprint: Fingerprint) -> Fingerprint {
        let mut inner = self.inner.lock();
        let body = inner.body(fingerprint);
        let folded = const_fold::fold_constants(&body);
        inner.intern_body(folded)
    }
}

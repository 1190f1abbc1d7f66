// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Node registry: node id -> live native view, tree position and auxiliary
// state.
//
// The registry performs no I/O and makes no threading assumptions; it is only
// ever reached through the UI-owning thread's `UiState`. A node that can be
// resolved always has a live view: release removes the entry before the view
// is handed to the factory's teardown hook, and drops it right after.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use tether_core::error::{Result, TetherError};
use tether_core::types::NodeId;

use crate::factory::{ComponentFactory, FactorySet, ViewContext};

// ---------------------------------------------------------------------------
// Auxiliary state
// ---------------------------------------------------------------------------

/// Per-node slot for whatever a factory needs to keep about one view
/// (scroll listeners, cached option lists, decoder handles).
///
/// Owned by the registry and dropped when the node is released, after the
/// factory's `destroy_view` hook has run.
#[derive(Default)]
pub struct AuxSlot(Option<Box<dyn Any>>);

impl AuxSlot {
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.0.as_ref().and_then(|b| b.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.0.as_mut().and_then(|b| b.downcast_mut::<T>())
    }

    /// Store `value`, replacing whatever the slot held.
    pub fn insert<T: 'static>(&mut self, value: T) {
        self.0 = Some(Box::new(value));
    }

    /// Run `f` on the stored `T`, creating it with `init` first if the slot
    /// is empty. A value of a different type is replaced.
    pub fn update_or_insert<T: 'static, R>(
        &mut self,
        init: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> R,
    ) -> R {
        let mut value: Box<T> = match self.0.take().map(|b| b.downcast::<T>()) {
            Some(Ok(value)) => value,
            Some(Err(_)) => {
                warn!("aux slot held a different type; replacing");
                Box::new(init())
            }
            None => Box::new(init()),
        };
        let out = f(&mut value);
        self.0 = Some(value);
        out
    }

    /// Move the stored `T` out, leaving the slot empty. A value of another
    /// type stays where it is.
    pub fn take<T: 'static>(&mut self) -> Option<T> {
        match self.0.take() {
            Some(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Some(*value),
                Err(other) => {
                    self.0 = Some(other);
                    None
                }
            },
            None => None,
        }
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

impl std::fmt::Debug for AuxSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuxSlot")
            .field(&if self.0.is_some() { "occupied" } else { "empty" })
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Tells apart successive nodes that reuse one identifier. Events captured
/// for one allocation never reach the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Generation(u64);

/// A live native view plus its bookkeeping.
pub struct Node<V> {
    id: NodeId,
    generation: Generation,
    component: String,
    view: V,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub(crate) aux: AuxSlot,
}

impl<V> Node<V> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn aux(&self) -> &AuxSlot {
        &self.aux
    }

    /// View and aux slot together, as factories want them.
    pub fn parts_mut(&mut self) -> (&V, &mut AuxSlot) {
        (&self.view, &mut self.aux)
    }
}

/// Inspectable copy of one node's position in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub component: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Inspectable copy of the whole registry, ordered by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeSnapshot {
    pub nodes: BTreeMap<NodeId, NodeSnapshot>,
}

impl TreeSnapshot {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.get(&id)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns every live node and the factories that created them.
pub struct NodeRegistry<V> {
    nodes: HashMap<NodeId, Node<V>>,
    factories: FactorySet<V>,
    last_generation: u64,
}

impl<V> NodeRegistry<V> {
    pub fn new(factories: FactorySet<V>) -> Self {
        Self {
            nodes: HashMap::new(),
            factories,
            last_generation: 0,
        }
    }

    pub fn factories(&self) -> &FactorySet<V> {
        &self.factories
    }

    /// Create the view for `id` with the factory owning `component` and
    /// record it as a parentless node.
    #[instrument(level = "debug", skip(self), fields(node = %id))]
    pub fn allocate(&mut self, id: NodeId, component: &str) -> Result<&mut Node<V>> {
        if self.nodes.contains_key(&id) {
            return Err(TetherError::DuplicateIdentifier(id));
        }
        let factory = self
            .factories
            .get(component)
            .ok_or_else(|| TetherError::UnknownComponent(component.to_string()))?;

        let view = factory.create_view(&ViewContext {
            node: id,
            component,
        })?;

        self.last_generation += 1;
        let node = Node {
            id,
            generation: Generation(self.last_generation),
            component: component.to_string(),
            view,
            parent: None,
            children: Vec::new(),
            aux: AuxSlot::default(),
        };
        debug!(node = %id, component, "node allocated");
        Ok(self.nodes.entry(id).or_insert(node))
    }

    /// Pure lookup.
    pub fn resolve(&self, id: NodeId) -> Option<&Node<V>> {
        self.nodes.get(&id)
    }

    pub fn resolve_mut(&mut self, id: NodeId) -> Option<&mut Node<V>> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Live ids, sorted.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Nodes without a parent, sorted.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.parent.is_none())
            .map(|n| n.id)
            .collect();
        roots.sort_unstable();
        roots
    }

    pub fn children(&self, id: NodeId) -> Option<&[NodeId]> {
        self.nodes.get(&id).map(|n| n.children.as_slice())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Factory that owns node `id`.
    pub fn factory_for(&self, id: NodeId) -> Result<Arc<dyn ComponentFactory<V>>> {
        let node = self.nodes.get(&id).ok_or(TetherError::UnresolvedNode(id))?;
        self.factories
            .get(&node.component)
            .ok_or_else(|| TetherError::UnknownComponent(node.component.clone()))
    }

    /// Whether `ancestor` is `id` or lies on the path from `id` to its root.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Record `child` under `parent` at `index`, clamped to the end. A child
    /// that already has a parent is moved. Returns the index actually used.
    ///
    /// Bookkeeping only; the caller performs the native insert.
    pub fn attach_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: Option<usize>,
    ) -> Result<usize> {
        if !self.nodes.contains_key(&parent) {
            return Err(TetherError::UnresolvedNode(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(TetherError::UnresolvedNode(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(TetherError::Protocol(format!(
                "inserting {child} under {parent} would create a cycle"
            )));
        }

        if let Some(old_parent) = self.parent(child) {
            self.unlink(old_parent, child);
        }

        let siblings = &mut self
            .nodes
            .get_mut(&parent)
            .ok_or(TetherError::UnresolvedNode(parent))?
            .children;
        let at = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(at, child);

        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        Ok(at)
    }

    /// Remove `child` from `parent`'s child list without releasing it.
    pub fn detach_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&parent) {
            return Err(TetherError::UnresolvedNode(parent));
        }
        match self.parent(child) {
            Some(actual) if actual == parent => {
                self.unlink(parent, child);
                Ok(())
            }
            Some(actual) => Err(TetherError::Protocol(format!(
                "node {child} belongs to {actual}, not {parent}"
            ))),
            None if self.nodes.contains_key(&child) => Err(TetherError::Protocol(format!(
                "node {child} has no parent"
            ))),
            None => Err(TetherError::UnresolvedNode(child)),
        }
    }

    fn unlink(&mut self, parent: NodeId, child: NodeId) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = None;
        }
    }

    /// Remove `id` and every descendant, children before parents. Each
    /// node's teardown hook runs exactly once and its aux slot is dropped.
    /// Returns every released id; empty if `id` was not live.
    #[instrument(level = "debug", skip(self), fields(node = %id))]
    pub fn release(&mut self, id: NodeId) -> Vec<NodeId> {
        if !self.nodes.contains_key(&id) {
            return Vec::new();
        }
        if let Some(parent) = self.parent(id) {
            self.unlink(parent, id);
        }

        let mut order = Vec::new();
        self.collect_post_order(id, &mut order);

        for released in &order {
            let Some(mut node) = self.nodes.remove(released) else {
                continue;
            };
            match self.factories.get(&node.component) {
                Some(factory) => factory.destroy_view(&node.view, &mut node.aux),
                None => warn!(node = %released, component = %node.component, "no factory to tear down view"),
            }
            node.aux.clear();
        }

        debug!(node = %id, released = order.len(), "subtree released");
        order
    }

    /// Release every node. Used at teardown.
    pub fn release_all(&mut self) -> Vec<NodeId> {
        let mut released = Vec::new();
        for root in self.roots() {
            released.extend(self.release(root));
        }
        released
    }

    fn collect_post_order(&self, id: NodeId, out: &mut Vec<NodeId>) {
        // Iterative so deep trees cannot overflow the UI thread's stack.
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                out.push(current);
                continue;
            }
            stack.push((current, true));
            if let Some(node) = self.nodes.get(&current) {
                for child in node.children.iter().rev() {
                    stack.push((*child, false));
                }
            }
        }
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            nodes: self
                .nodes
                .values()
                .map(|n| {
                    (
                        n.id,
                        NodeSnapshot {
                            component: n.component.clone(),
                            parent: n.parent,
                            children: n.children.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

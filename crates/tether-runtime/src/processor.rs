// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operation processor: applies ordered batches of tree mutations.
//
// A batch runs start to finish inside one UI-thread task, so nothing can
// observe it half applied. An operation that fails is logged and recorded in
// the batch report; the rest of the batch still runs, unless the failure is
// not specific to that operation (wrong thread, toolkit gone), which ends the
// batch early. Nothing is retried.

use std::cell::Cell;

use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use tether_core::error::{Result, TetherError};
use tether_core::protocol::Operation;
use tether_core::types::{HandlerId, NodeId, Props};

use crate::factory::{EventEmitter, NodeEventSink, StyleTranslator};
use crate::listeners::ListenerTable;
use crate::registry::NodeRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Applying,
}

/// One operation the processor could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOperation {
    /// Position within the batch.
    pub index: usize,
    pub op: &'static str,
    pub target: NodeId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub applied: usize,
    pub skipped: Vec<SkippedOperation>,
    /// Nodes destroyed by a `reset` before the operations ran.
    pub reset_released: usize,
    /// Operations left unapplied after a failure that ended the batch.
    pub abandoned: usize,
}

impl BatchReport {
    /// The native tree no longer matches what the script side believes.
    pub fn drifted(&self) -> bool {
        !self.skipped.is_empty() || self.abandoned > 0
    }

    /// Short human-readable reason for a resync request.
    pub fn drift_reason(&self) -> Option<String> {
        let first = self.skipped.first()?;
        let more = self.skipped.len() - 1;
        let mut reason = format!("{} on node {} skipped: {}", first.op, first.target, first.reason);
        if more > 0 {
            reason.push_str(&format!(" (+{more} more)"));
        }
        if self.abandoned > 0 {
            reason.push_str(&format!("; {} operations abandoned", self.abandoned));
        }
        Some(reason)
    }
}

/// The pieces of UI state one batch mutates, borrowed disjointly.
pub struct Tree<'a, V: 'static> {
    pub registry: &'a mut NodeRegistry<V>,
    pub listeners: &'a mut ListenerTable,
    pub style: &'a dyn StyleTranslator<V>,
    pub node_events: &'a NodeEventSink,
}

#[derive(Debug)]
pub struct OperationProcessor {
    phase: Cell<Phase>,
}

/// Returns the processor to `Idle` however the batch ends, panics included.
struct Applying<'a>(&'a Cell<Phase>);

impl Drop for Applying<'_> {
    fn drop(&mut self) {
        self.0.set(Phase::Idle);
    }
}

impl Default for OperationProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationProcessor {
    pub fn new() -> Self {
        Self {
            phase: Cell::new(Phase::Idle),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    fn begin(&self) -> Result<Applying<'_>> {
        if self.phase.get() == Phase::Applying {
            return Err(TetherError::Protocol(
                "batch submitted while another batch is being applied".into(),
            ));
        }
        self.phase.set(Phase::Applying);
        Ok(Applying(&self.phase))
    }

    /// Apply `ops` in order.
    #[instrument(level = "debug", skip_all, fields(ops = ops.len()))]
    pub fn apply_batch<V: 'static>(&self, tree: Tree<'_, V>, ops: Vec<Operation>) -> Result<BatchReport> {
        let _applying = self.begin()?;
        Ok(run_ops(tree, ops, BatchReport::default()))
    }

    /// Destroy every root-level node, then apply `ops`. Used for the full
    /// redraw that answers a resync request.
    #[instrument(level = "debug", skip_all, fields(ops = ops.len()))]
    pub fn reset_tree<V: 'static>(&self, tree: Tree<'_, V>, ops: Vec<Operation>) -> Result<BatchReport> {
        let _applying = self.begin()?;
        let released = tree.registry.release_all();
        let purged = tree.listeners.purge(&released);
        debug!(released = released.len(), purged, "tree reset");

        let report = BatchReport {
            reset_released: released.len(),
            ..BatchReport::default()
        };
        Ok(run_ops(tree, ops, report))
    }
}

fn run_ops<V: 'static>(mut tree: Tree<'_, V>, ops: Vec<Operation>, mut report: BatchReport) -> BatchReport {
    let total = ops.len();
    for (index, op) in ops.into_iter().enumerate() {
        let kind = op.kind();
        let target = op.target();
        let Err(err) = apply_one(&mut tree, op) else {
            report.applied += 1;
            continue;
        };
        let skippable = err.is_skippable();
        report.skipped.push(SkippedOperation {
            index,
            op: kind,
            target,
            reason: err.to_string(),
        });
        if !skippable {
            report.abandoned = total - index - 1;
            error!(
                index,
                op = kind,
                node = %target,
                abandoned = report.abandoned,
                error = %err,
                "batch aborted"
            );
            break;
        }
        warn!(index, op = kind, node = %target, error = %err, "operation skipped");
    }
    debug!(
        applied = report.applied,
        skipped = report.skipped.len(),
        abandoned = report.abandoned,
        "batch applied"
    );
    report
}

fn apply_one<V: 'static>(tree: &mut Tree<'_, V>, op: Operation) -> Result<()> {
    match op {
        Operation::CreateNode { id, component, props } => create_node(tree, id, &component, &props),
        Operation::UpdateProps { id, props } => update_props(tree, id, &props),
        Operation::InsertChild { parent, child, index } => insert_child(tree, parent, child, index),
        Operation::RemoveChild { parent, child } => remove_child(tree, parent, child),
        Operation::DestroyNode { id } => destroy_node(tree, id),
        Operation::AttachEvent { id, event, handler } => {
            attach_event(tree, id, &event, handler.unwrap_or(HandlerId(id.0)))
        }
        Operation::DetachEvent { id, event } => detach_event(tree, id, &event),
    }
}

// ---------------------------------------------------------------------------
// Individual operations
// ---------------------------------------------------------------------------

fn create_node<V: 'static>(tree: &mut Tree<'_, V>, id: NodeId, component: &str, props: &Props) -> Result<()> {
    tree.registry.allocate(id, component)?;
    apply_props(tree, id, props)
}

fn update_props<V: 'static>(tree: &mut Tree<'_, V>, id: NodeId, props: &Props) -> Result<()> {
    if !tree.registry.contains(id) {
        return Err(TetherError::UnresolvedNode(id));
    }
    apply_props(tree, id, props)
}

/// A property the factory rejects is logged on its own; the remaining
/// properties are still applied.
fn apply_props<V: 'static>(tree: &mut Tree<'_, V>, id: NodeId, props: &Props) -> Result<()> {
    let factory = tree.registry.factory_for(id)?;
    let style = tree.style;
    let node = tree
        .registry
        .resolve_mut(id)
        .ok_or(TetherError::UnresolvedNode(id))?;
    let (view, aux) = node.parts_mut();
    for (key, value) in props {
        if let Err(err) = factory.apply_property(view, aux, key, value, style) {
            warn!(node = %id, key = %key, error = %err, "property not applied");
        }
    }
    Ok(())
}

fn insert_child<V: 'static>(
    tree: &mut Tree<'_, V>,
    parent: NodeId,
    child: NodeId,
    index: Option<usize>,
) -> Result<()> {
    let parent_factory = tree.registry.factory_for(parent)?;
    if !tree.registry.contains(child) {
        return Err(TetherError::UnresolvedNode(child));
    }
    if tree.registry.is_ancestor_or_self(child, parent) {
        return Err(TetherError::Protocol(format!(
            "inserting {child} under {parent} would create a cycle"
        )));
    }

    if let Some(old_parent) = tree.registry.parent(child) {
        let old_factory = tree.registry.factory_for(old_parent)?;
        let (old_view, child_view) = view_pair(tree.registry, old_parent, child)?;
        old_factory.remove_child(old_view, child_view)?;
    }

    let at = tree.registry.attach_child(parent, child, index)?;
    let (parent_view, child_view) = view_pair(tree.registry, parent, child)?;
    if let Err(err) = parent_factory.insert_child(parent_view, child_view, at) {
        // Keep bookkeeping in step with the native tree.
        tree.registry.detach_child(parent, child)?;
        return Err(err);
    }
    Ok(())
}

fn remove_child<V: 'static>(tree: &mut Tree<'_, V>, parent: NodeId, child: NodeId) -> Result<()> {
    if !tree.registry.contains(parent) {
        return Err(TetherError::UnresolvedNode(parent));
    }
    match tree.registry.parent(child) {
        Some(actual) if actual == parent => {}
        Some(actual) => {
            return Err(TetherError::Protocol(format!(
                "node {child} belongs to {actual}, not {parent}"
            )));
        }
        None if tree.registry.contains(child) => {
            return Err(TetherError::Protocol(format!("node {child} has no parent")));
        }
        None => return Err(TetherError::UnresolvedNode(child)),
    }
    destroy_node(tree, child)
}

fn destroy_node<V: 'static>(tree: &mut Tree<'_, V>, id: NodeId) -> Result<()> {
    if !tree.registry.contains(id) {
        return Err(TetherError::UnresolvedNode(id));
    }
    if let Some(parent) = tree.registry.parent(id) {
        let factory = tree.registry.factory_for(parent)?;
        let (parent_view, view) = view_pair(tree.registry, parent, id)?;
        // The node goes away regardless; a failed native removal must not
        // leave it resolvable.
        if let Err(err) = factory.remove_child(parent_view, view) {
            warn!(node = %id, parent = %parent, error = %err, "native removal failed");
        }
    }

    let released = tree.registry.release(id);
    let purged = tree.listeners.purge(&released);
    debug!(node = %id, released = released.len(), purged, "node destroyed");
    Ok(())
}

fn attach_event<V: 'static>(tree: &mut Tree<'_, V>, id: NodeId, event: &str, handler: HandlerId) -> Result<()> {
    if !tree.registry.contains(id) {
        return Err(TetherError::UnresolvedNode(id));
    }
    // The native listener already reports through the table; only the
    // handler changes.
    if tree.listeners.is_attached(id, event) {
        tree.listeners.register(id, event, handler);
        return Ok(());
    }

    let factory = tree.registry.factory_for(id)?;
    let node = tree
        .registry
        .resolve_mut(id)
        .ok_or(TetherError::UnresolvedNode(id))?;
    let emitter = EventEmitter::new(id, node.generation(), tree.node_events.clone());
    let (view, aux) = node.parts_mut();
    factory.attach_event(view, aux, event, emitter)?;
    tree.listeners.register(id, event, handler);
    Ok(())
}

fn detach_event<V: 'static>(tree: &mut Tree<'_, V>, id: NodeId, event: &str) -> Result<()> {
    let factory = tree.registry.factory_for(id)?;
    let node = tree
        .registry
        .resolve_mut(id)
        .ok_or(TetherError::UnresolvedNode(id))?;
    let (view, aux) = node.parts_mut();
    factory.detach_event(view, aux, event)?;
    tree.listeners.unregister(id, event);
    Ok(())
}

fn view_pair<V>(registry: &NodeRegistry<V>, a: NodeId, b: NodeId) -> Result<(&V, &V)> {
    let first = registry.resolve(a).ok_or(TetherError::UnresolvedNode(a))?;
    let second = registry.resolve(b).ok_or(TetherError::UnresolvedNode(b))?;
    Ok((first.view(), second.view()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        LeafFactory, RecordingStyle, RecordingView, StrandedFactory, factories, null_sink, ops,
    };
    use serde_json::json;

    struct Fixture {
        registry: NodeRegistry<RecordingView>,
        listeners: ListenerTable,
        style: RecordingStyle,
        sink: NodeEventSink,
        processor: OperationProcessor,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: NodeRegistry::new(
                    factories(&["container", "text"])
                        .with(LeafFactory("label"))
                        .with(StrandedFactory),
                ),
                listeners: ListenerTable::new(),
                style: RecordingStyle::default(),
                sink: null_sink(),
                processor: OperationProcessor::new(),
            }
        }

        fn apply(&mut self, batch: serde_json::Value) -> BatchReport {
            let tree = Tree {
                registry: &mut self.registry,
                listeners: &mut self.listeners,
                style: &self.style,
                node_events: &self.sink,
            };
            self.processor.apply_batch(tree, ops(batch)).expect("batch")
        }

        fn reset(&mut self, batch: serde_json::Value) -> BatchReport {
            let tree = Tree {
                registry: &mut self.registry,
                listeners: &mut self.listeners,
                style: &self.style,
                node_events: &self.sink,
            };
            self.processor.reset_tree(tree, ops(batch)).expect("batch")
        }

        fn view(&self, id: u64) -> RecordingView {
            self.registry
                .resolve(NodeId(id))
                .expect("live node")
                .view()
                .clone()
        }
    }

    #[test]
    fn create_insert_update_scenario() {
        let mut fx = Fixture::new();
        let report = fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "container" },
            { "op": "createNode", "id": 2, "type": "text", "props": { "text": "hi" } },
            { "op": "insertChild", "parent": 1, "child": 2, "index": 0 },
            { "op": "updateProps", "id": 2, "props": { "text": "bye" } }
        ]));

        assert_eq!(report.applied, 4);
        assert!(!report.drifted());
        assert_eq!(fx.registry.children(NodeId(1)).expect("children"), &[NodeId(2)]);
        assert_eq!(fx.view(2).prop("text"), Some(json!("bye")));
        assert_eq!(fx.view(1).children(), vec![2]);
    }

    #[test]
    fn update_after_remove_is_skipped_and_batch_continues() {
        let mut fx = Fixture::new();
        fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "container" },
            { "op": "createNode", "id": 2, "type": "text" },
            { "op": "insertChild", "parent": 1, "child": 2 }
        ]));

        let report = fx.apply(json!([
            { "op": "removeChild", "parent": 1, "child": 2 },
            { "op": "updateProps", "id": 2, "props": { "text": "ghost" } },
            { "op": "createNode", "id": 3, "type": "text" }
        ]));

        assert_eq!(report.applied, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 1);
        assert_eq!(report.skipped[0].op, "updateProps");
        assert!(fx.registry.resolve(NodeId(2)).is_none());
        assert!(fx.registry.contains(NodeId(3)));
        assert!(report.drift_reason().expect("reason").contains("updateProps"));
    }

    #[test]
    fn destroying_a_subtree_leaves_no_entries() {
        let mut fx = Fixture::new();
        let mut batch = vec![json!({ "op": "createNode", "id": 1, "type": "container" })];
        for id in 2..=11 {
            batch.push(json!({ "op": "createNode", "id": id, "type": "container" }));
            batch.push(json!({ "op": "insertChild", "parent": id - 1, "child": id }));
            batch.push(json!({ "op": "attachEvent", "id": id, "event": "press" }));
        }
        fx.apply(json!(batch));
        assert_eq!(fx.registry.len(), 11);
        assert_eq!(fx.listeners.len(), 10);

        let report = fx.apply(json!([{ "op": "destroyNode", "id": 1 }]));

        assert_eq!(report.applied, 1);
        assert!(fx.registry.is_empty());
        assert!(fx.listeners.is_empty());
    }

    #[test]
    fn batch_and_single_application_agree() {
        let script = json!([
            { "op": "createNode", "id": 1, "type": "container" },
            { "op": "createNode", "id": 2, "type": "text" },
            { "op": "createNode", "id": 3, "type": "text" },
            { "op": "insertChild", "parent": 1, "child": 2 },
            { "op": "insertChild", "parent": 1, "child": 3, "index": 0 },
            { "op": "updateProps", "id": 3, "props": { "text": "x" } },
            { "op": "removeChild", "parent": 1, "child": 2 },
            { "op": "updateProps", "id": 2, "props": { "text": "gone" } }
        ]);

        let mut batched = Fixture::new();
        batched.apply(script.clone());

        let mut single = Fixture::new();
        for op in script.as_array().expect("array") {
            single.apply(json!([op]));
        }

        assert_eq!(batched.registry.snapshot(), single.registry.snapshot());
    }

    #[test]
    fn reattach_replaces_handler_without_second_native_listener() {
        let mut fx = Fixture::new();
        fx.apply(json!([
            { "op": "createNode", "id": 5, "type": "container" },
            { "op": "attachEvent", "id": 5, "event": "press", "handler": 1 },
            { "op": "attachEvent", "id": 5, "event": "press", "handler": 2 }
        ]));

        assert_eq!(fx.listeners.handler(NodeId(5), "press"), Some(HandlerId(2)));
        assert_eq!(fx.view(5).listener_count("press"), 1);
    }

    #[test]
    fn detach_removes_listener_and_unattached_detach_is_fine() {
        let mut fx = Fixture::new();
        let report = fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "container" },
            { "op": "detachEvent", "id": 1, "event": "press" },
            { "op": "attachEvent", "id": 1, "event": "press" },
            { "op": "detachEvent", "id": 1, "event": "press" }
        ]));

        assert_eq!(report.applied, 4);
        assert!(fx.listeners.is_empty());
        assert_eq!(fx.view(1).listener_count("press"), 0);
    }

    #[test]
    fn handler_defaults_to_node_id() {
        let mut fx = Fixture::new();
        fx.apply(json!([
            { "op": "createNode", "id": 8, "type": "text" },
            { "op": "attachEvent", "id": 8, "event": "press" }
        ]));
        assert_eq!(fx.listeners.handler(NodeId(8), "press"), Some(HandlerId(8)));
    }

    #[test]
    fn moving_a_child_removes_it_from_the_old_parent_natively() {
        let mut fx = Fixture::new();
        fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "container" },
            { "op": "createNode", "id": 2, "type": "container" },
            { "op": "createNode", "id": 3, "type": "text" },
            { "op": "insertChild", "parent": 1, "child": 3 },
            { "op": "insertChild", "parent": 2, "child": 3 }
        ]));

        assert!(fx.view(1).children().is_empty());
        assert_eq!(fx.view(2).children(), vec![3]);
        assert_eq!(fx.registry.parent(NodeId(3)), Some(NodeId(2)));
    }

    #[test]
    fn cycles_and_unknown_components_are_skipped() {
        let mut fx = Fixture::new();
        let report = fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "container" },
            { "op": "createNode", "id": 2, "type": "container" },
            { "op": "insertChild", "parent": 1, "child": 2 },
            { "op": "insertChild", "parent": 2, "child": 1 },
            { "op": "createNode", "id": 3, "type": "video" },
            { "op": "createNode", "id": 1, "type": "text" }
        ]));

        assert_eq!(report.applied, 3);
        let skipped: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![3, 4, 5]);
        assert_eq!(fx.registry.parent(NodeId(2)), Some(NodeId(1)));
    }

    #[test]
    fn leaf_parent_refuses_children_and_rolls_back() {
        let mut fx = Fixture::new();
        let report = fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "label" },
            { "op": "createNode", "id": 2, "type": "container" },
            { "op": "insertChild", "parent": 1, "child": 2 }
        ]));

        assert_eq!(report.applied, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].op, "insertChild");
        assert!(report.drifted());
        assert!(fx.registry.children(NodeId(1)).expect("children").is_empty());
        assert_eq!(fx.registry.parent(NodeId(2)), None);
        assert!(fx.view(1).children().is_empty());
    }

    #[test]
    fn moving_under_a_leaf_leaves_the_child_detached_everywhere() {
        let mut fx = Fixture::new();
        let report = fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "container" },
            { "op": "createNode", "id": 2, "type": "label" },
            { "op": "createNode", "id": 3, "type": "text" },
            { "op": "insertChild", "parent": 1, "child": 3 },
            { "op": "insertChild", "parent": 2, "child": 3 }
        ]));

        assert_eq!(report.skipped.len(), 1);
        assert!(fx.view(1).children().is_empty());
        assert!(fx.registry.children(NodeId(1)).expect("children").is_empty());
        assert_eq!(fx.registry.parent(NodeId(3)), None);
    }

    #[test]
    fn toolkit_failure_ends_the_batch() {
        let mut fx = Fixture::new();
        let report = fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "container" },
            { "op": "createNode", "id": 2, "type": "stranded" },
            { "op": "createNode", "id": 3, "type": "container" },
            { "op": "createNode", "id": 4, "type": "container" }
        ]));

        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 1);
        assert_eq!(report.abandoned, 2);
        assert!(report.drift_reason().expect("reason").contains("2 operations abandoned"));
        assert_eq!(fx.registry.ids(), vec![NodeId(1)]);
    }

    #[test]
    fn operation_errors_do_not_end_the_batch() {
        let mut fx = Fixture::new();
        let report = fx.apply(json!([
            { "op": "destroyNode", "id": 40 },
            { "op": "createNode", "id": 1, "type": "video" },
            { "op": "createNode", "id": 2, "type": "container" }
        ]));

        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.abandoned, 0);
    }

    #[test]
    fn unknown_style_keys_go_to_the_translator() {
        let mut fx = Fixture::new();
        fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "container", "props": { "backgroundColor": "#000" } }
        ]));
        assert_eq!(fx.style.keys(), vec!["backgroundColor"]);
    }

    #[test]
    fn reset_destroys_roots_before_applying() {
        let mut fx = Fixture::new();
        fx.apply(json!([
            { "op": "createNode", "id": 1, "type": "container" },
            { "op": "createNode", "id": 2, "type": "text" },
            { "op": "insertChild", "parent": 1, "child": 2 },
            { "op": "createNode", "id": 9, "type": "text" }
        ]));

        let report = fx.reset(json!([
            { "op": "createNode", "id": 1, "type": "container" }
        ]));

        assert_eq!(report.reset_released, 3);
        assert_eq!(report.applied, 1);
        assert_eq!(fx.registry.ids(), vec![NodeId(1)]);
    }

    #[test]
    fn reentrant_batch_is_a_protocol_error() {
        let processor = OperationProcessor::new();
        let _applying = processor.begin().expect("first batch");
        assert_eq!(processor.phase(), Phase::Applying);

        let err = processor.begin().err().expect("re-entrant");
        assert!(matches!(err, TetherError::Protocol(_)));
    }

    #[test]
    fn phase_returns_to_idle() {
        let mut fx = Fixture::new();
        fx.apply(json!([{ "op": "destroyNode", "id": 1 }]));
        assert_eq!(fx.processor.phase(), Phase::Idle);
    }
}

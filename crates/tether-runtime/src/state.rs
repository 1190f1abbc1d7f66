// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Everything the UI-owning thread owns for one runtime.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use tether_core::error::{Result, TetherError};
use tether_core::protocol::{BridgeEnvelope, Operation};
use tether_core::types::NodeId;

use crate::event_bus::{GlobalEventBus, SubscriptionId};
use crate::factory::{FactorySet, NodeEventSink, StyleTranslator};
use crate::listeners::ListenerTable;
use crate::processor::{BatchReport, OperationProcessor, Tree};
use crate::registry::{Generation, NodeRegistry};

/// Outbound channel to the script side. Sending never blocks; once the
/// script side has gone away envelopes are dropped.
#[derive(Clone)]
pub struct Outbound {
    tx: UnboundedSender<BridgeEnvelope>,
}

impl Outbound {
    pub fn new(tx: UnboundedSender<BridgeEnvelope>) -> Self {
        Self { tx }
    }

    pub fn send(&self, envelope: BridgeEnvelope) {
        if self.tx.send(envelope).is_err() {
            debug!("script side closed; envelope dropped");
        }
    }
}

/// Registry, listener table, global bus and processor for one runtime. Lives
/// on the UI thread only; see `ui_thread`.
pub struct UiState<V: 'static> {
    registry: NodeRegistry<V>,
    listeners: ListenerTable,
    bus: GlobalEventBus,
    processor: OperationProcessor,
    style: Arc<dyn StyleTranslator<V>>,
    node_events: NodeEventSink,
    outbound: Outbound,
    script_subscriptions: HashMap<String, SubscriptionId>,
}

impl<V: 'static> UiState<V> {
    pub fn new(
        factories: FactorySet<V>,
        style: Arc<dyn StyleTranslator<V>>,
        node_events: NodeEventSink,
        outbound: Outbound,
    ) -> Self {
        Self {
            registry: NodeRegistry::new(factories),
            listeners: ListenerTable::new(),
            bus: GlobalEventBus::new(),
            processor: OperationProcessor::new(),
            style,
            node_events,
            outbound,
            script_subscriptions: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &NodeRegistry<V> {
        &self.registry
    }

    pub fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    pub fn bus(&self) -> &GlobalEventBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut GlobalEventBus {
        &mut self.bus
    }

    pub fn processor(&self) -> &OperationProcessor {
        &self.processor
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Apply one batch in order. With `reset`, every root-level node is
    /// destroyed first.
    pub fn apply_batch(&mut self, reset: bool, ops: Vec<Operation>) -> Result<BatchReport> {
        let tree = Tree {
            registry: &mut self.registry,
            listeners: &mut self.listeners,
            style: self.style.as_ref(),
            node_events: &self.node_events,
        };
        if reset {
            self.processor.reset_tree(tree, ops)
        } else {
            self.processor.apply_batch(tree, ops)
        }
    }

    /// Route a native event to the node's current script handler, if any.
    /// Events raised under another `generation` come from a released view and
    /// are dropped.
    pub fn deliver_node_event(
        &self,
        node: NodeId,
        generation: Generation,
        event: String,
        payload: Option<Value>,
    ) {
        let current = self.registry.resolve(node).map(|n| n.generation());
        if current != Some(generation) {
            debug!(node = %node, event = %event, error = %TetherError::StaleCallback, "event dropped");
            return;
        }
        let Some(handler) = self.listeners.handler(node, &event) else {
            trace!(node = %node, event = %event, "no listener; event dropped");
            return;
        };
        self.outbound.send(BridgeEnvelope::NodeEvent {
            node,
            event,
            handler,
            payload,
        });
    }

    /// Dispatch on the global bus.
    pub fn dispatch_global(&self, name: &str, payload: &Value) -> usize {
        self.bus.dispatch(name, payload)
    }

    /// Forward global event `name` to the script side. Subscribing twice is
    /// the same as once.
    pub fn subscribe_script(&mut self, name: &str) {
        if self.script_subscriptions.contains_key(name) {
            return;
        }
        let outbound = self.outbound.clone();
        let id = self.bus.subscribe(
            name,
            Box::new(move |name, payload| {
                outbound.send(BridgeEnvelope::GlobalEvent {
                    name: name.to_string(),
                    payload: payload.clone(),
                });
            }),
        );
        self.script_subscriptions.insert(name.to_string(), id);
    }

    pub fn unsubscribe_script(&mut self, name: &str) -> bool {
        match self.script_subscriptions.remove(name) {
            Some(id) => self.bus.unsubscribe(id),
            None => false,
        }
    }

    /// Release every node through its factory and forget all listeners.
    pub(crate) fn teardown(&mut self) {
        let released = self.registry.release_all();
        self.listeners.purge(&released);
        self.script_subscriptions.clear();
        self.bus = GlobalEventBus::new();
        debug!(released = released.len(), "UI state torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ops, state_with_outbound};
    use serde_json::json;
    use tether_core::types::HandlerId;

    #[test]
    fn node_event_without_listener_is_dropped() {
        let (state, mut rx) = state_with_outbound();
        state.deliver_node_event(NodeId(1), Generation::default(), "press".into(), None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn node_event_goes_to_current_handler() {
        let (mut state, mut rx) = state_with_outbound();
        state.apply_batch(
            false,
            ops(json!([
                { "op": "createNode", "id": 1, "type": "container" },
                { "op": "attachEvent", "id": 1, "event": "press", "handler": 7 }
            ])),
        )
        .expect("batch");

        let generation = state.registry().resolve(NodeId(1)).expect("node 1").generation();
        state.deliver_node_event(NodeId(1), generation, "press".into(), Some(json!({ "x": 1 })));

        match rx.try_recv().expect("envelope") {
            BridgeEnvelope::NodeEvent { node, handler, .. } => {
                assert_eq!(node, NodeId(1));
                assert_eq!(handler, HandlerId(7));
            }
            other => panic!("expected nodeEvent, got {other:?}"),
        }
    }

    #[test]
    fn event_from_a_released_view_skips_its_successor() {
        let (mut state, mut rx) = state_with_outbound();
        state
            .apply_batch(
                false,
                ops(json!([
                    { "op": "createNode", "id": 5, "type": "container" },
                    { "op": "attachEvent", "id": 5, "event": "press", "handler": 1 }
                ])),
            )
            .expect("first batch");
        let old = state.registry().resolve(NodeId(5)).expect("node 5").generation();

        state
            .apply_batch(
                false,
                ops(json!([
                    { "op": "destroyNode", "id": 5 },
                    { "op": "createNode", "id": 5, "type": "container" },
                    { "op": "attachEvent", "id": 5, "event": "press", "handler": 9 }
                ])),
            )
            .expect("second batch");

        state.deliver_node_event(NodeId(5), old, "press".into(), None);
        assert!(rx.try_recv().is_err());

        let new = state.registry().resolve(NodeId(5)).expect("node 5").generation();
        state.deliver_node_event(NodeId(5), new, "press".into(), None);
        assert!(matches!(
            rx.try_recv().expect("envelope"),
            BridgeEnvelope::NodeEvent { handler: HandlerId(9), .. }
        ));
    }

    #[test]
    fn script_subscription_is_idempotent_and_forwards() {
        let (mut state, mut rx) = state_with_outbound();
        state.subscribe_script("appStateChange");
        state.subscribe_script("appStateChange");
        assert_eq!(state.bus().subscriber_count("appStateChange"), 1);

        state.dispatch_global("appStateChange", &json!({ "state": "active" }));
        assert!(matches!(
            rx.try_recv().expect("envelope"),
            BridgeEnvelope::GlobalEvent { name, .. } if name == "appStateChange"
        ));

        assert!(state.unsubscribe_script("appStateChange"));
        assert!(!state.unsubscribe_script("appStateChange"));
        assert_eq!(state.dispatch_global("appStateChange", &json!({})), 0);
    }

    #[test]
    fn teardown_releases_everything() {
        let (mut state, _rx) = state_with_outbound();
        state.apply_batch(
            false,
            ops(json!([
                { "op": "createNode", "id": 1, "type": "container" },
                { "op": "createNode", "id": 2, "type": "text" },
                { "op": "insertChild", "parent": 1, "child": 2 },
                { "op": "attachEvent", "id": 2, "event": "press" }
            ])),
        )
        .expect("batch");

        state.teardown();
        assert!(state.registry().is_empty());
        assert!(state.listeners().is_empty());
    }
}

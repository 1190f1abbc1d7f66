// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Component factory protocol.
//
// One `ComponentFactory` per component type tag. Factories are stateless and
// shared; anything they need to remember about a particular view goes into
// the node's `AuxSlot`, which the registry owns and drops when the node is
// released. Every method runs on the UI-owning thread.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use tether_core::error::{Result, TetherError};
use tether_core::types::NodeId;

use crate::registry::{AuxSlot, Generation};

/// Information available to a factory when it creates a view.
#[derive(Debug, Clone, Copy)]
pub struct ViewContext<'a> {
    pub node: NodeId,
    pub component: &'a str,
}

/// Sink for native events raised by a view, resolved to a script handler on
/// the UI thread. The generation is the one the listener was attached under.
pub type NodeEventSink = Arc<dyn Fn(NodeId, Generation, String, Option<Value>) + Send + Sync>;

/// Node-scoped handle a factory stores in its native listener.
///
/// Emitting never runs script-side code inline: the event is queued onto the
/// UI thread and resolved against the listener table there, so it is safe to
/// call from inside a native callback or from any other thread. Events from
/// a view that has since been released are dropped there, even when a new
/// node has taken over its identifier.
#[derive(Clone)]
pub struct EventEmitter {
    node: NodeId,
    generation: Generation,
    sink: NodeEventSink,
}

impl EventEmitter {
    pub fn new(node: NodeId, generation: Generation, sink: NodeEventSink) -> Self {
        Self {
            node,
            generation,
            sink,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn emit(&self, event: &str, payload: Option<Value>) {
        (self.sink)(self.node, self.generation, event.to_string(), payload);
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("node", &self.node)
            .field("generation", &self.generation)
            .finish()
    }
}

/// The shared style-to-native translator factories fall back to for any
/// property they do not handle themselves.
pub trait StyleTranslator<V>: Send + Sync {
    /// Apply one style property. Unknown keys are ignored.
    fn apply_style(&self, key: &str, value: &Value, view: &V) -> Result<()>;
}

/// Per-component-type view factory.
///
/// `V` is the platform's view handle (a JNI global reference, a retained
/// `UIView`, an in-memory node). Handles are cheap to share; factories take
/// them by reference and mutate the native object behind them.
pub trait ComponentFactory<V>: Send + Sync {
    /// Type tag this factory owns, e.g. `"text"`.
    fn component_type(&self) -> &str;

    /// Create a fully initialized, attachable view with default layout
    /// parameters.
    fn create_view(&self, ctx: &ViewContext<'_>) -> Result<V>;

    /// Apply one property. Must be idempotent. Keys the factory does not
    /// special-case go to `style`.
    fn apply_property(
        &self,
        view: &V,
        aux: &mut AuxSlot,
        key: &str,
        value: &Value,
        style: &dyn StyleTranslator<V>,
    ) -> Result<()> {
        let _ = aux;
        style.apply_style(key, value, view)
    }

    /// Install a native listener for `event` that reports through `emitter`.
    /// Events the view cannot produce are ignored.
    fn attach_event(
        &self,
        view: &V,
        aux: &mut AuxSlot,
        event: &str,
        emitter: EventEmitter,
    ) -> Result<()> {
        let _ = (view, aux, emitter);
        debug!(component = self.component_type(), event, "event not supported");
        Ok(())
    }

    /// Remove the native listener for `event`. A no-op when none is attached.
    fn detach_event(&self, view: &V, aux: &mut AuxSlot, event: &str) -> Result<()> {
        let _ = (view, aux, event);
        Ok(())
    }

    /// Insert `child` into `parent` at `index`. An index past the end
    /// appends. Leaf components keep the default, which refuses.
    fn insert_child(&self, parent: &V, child: &V, index: usize) -> Result<()> {
        let _ = (parent, child, index);
        Err(TetherError::Protocol(format!(
            "component '{}' does not accept children",
            self.component_type()
        )))
    }

    /// Remove `child` from `parent`.
    fn remove_child(&self, parent: &V, child: &V) -> Result<()> {
        let _ = (parent, child);
        Ok(())
    }

    /// Teardown hook, invoked exactly once when the node is released. Must
    /// synchronously stop timers, listeners, decoders and connections tied
    /// to the view. The aux slot is dropped right after this returns.
    fn destroy_view(&self, view: &V, aux: &mut AuxSlot) {
        let _ = (view, aux);
    }
}

/// Factories keyed by component type tag.
pub struct FactorySet<V> {
    factories: HashMap<String, Arc<dyn ComponentFactory<V>>>,
}

impl<V> FactorySet<V> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under its own type tag, replacing any previous one.
    pub fn register(&mut self, factory: Arc<dyn ComponentFactory<V>>) -> &mut Self {
        let tag = factory.component_type().to_string();
        if self.factories.insert(tag.clone(), factory).is_some() {
            debug!(component = %tag, "factory replaced");
        }
        self
    }

    pub fn with(mut self, factory: impl ComponentFactory<V> + 'static) -> Self {
        self.register(Arc::new(factory));
        self
    }

    pub fn get(&self, component: &str) -> Option<Arc<dyn ComponentFactory<V>>> {
        self.factories.get(component).cloned()
    }

    pub fn contains(&self, component: &str) -> bool {
        self.factories.contains_key(component)
    }

    /// Registered type tags, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl<V> Default for FactorySet<V> {
    fn default() -> Self {
        Self::new()
    }
}

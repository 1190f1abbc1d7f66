// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory views and factories for unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use tether_core::error::{Result, TetherError};
use tether_core::protocol::{BridgeEnvelope, Operation};
use tether_core::types::NodeId;

use crate::factory::{ComponentFactory, EventEmitter, FactorySet, NodeEventSink, StyleTranslator, ViewContext};
use crate::registry::{AuxSlot, NodeRegistry};
use crate::state::{Outbound, UiState};

#[derive(Debug, Default)]
pub struct ViewLog {
    pub id: u64,
    pub props: HashMap<String, Value>,
    pub children: Vec<u64>,
    pub listeners: HashMap<String, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingView(pub Rc<RefCell<ViewLog>>);

impl RecordingView {
    pub fn prop(&self, key: &str) -> Option<Value> {
        self.0.borrow().props.get(key).cloned()
    }

    pub fn children(&self) -> Vec<u64> {
        self.0.borrow().children.clone()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.0.borrow().listeners.get(event).copied().unwrap_or(0)
    }
}

pub struct RecordingFactory {
    tag: &'static str,
    pub destroyed: Arc<Mutex<Vec<NodeId>>>,
}

impl RecordingFactory {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            destroyed: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ComponentFactory<RecordingView> for RecordingFactory {
    fn component_type(&self) -> &str {
        self.tag
    }

    fn create_view(&self, ctx: &ViewContext<'_>) -> Result<RecordingView> {
        let view = RecordingView::default();
        view.0.borrow_mut().id = ctx.node.0;
        Ok(view)
    }

    fn apply_property(
        &self,
        view: &RecordingView,
        _aux: &mut AuxSlot,
        key: &str,
        value: &Value,
        style: &dyn StyleTranslator<RecordingView>,
    ) -> Result<()> {
        if key == "text" {
            view.0.borrow_mut().props.insert(key.to_string(), value.clone());
            Ok(())
        } else {
            style.apply_style(key, value, view)
        }
    }

    fn attach_event(
        &self,
        view: &RecordingView,
        _aux: &mut AuxSlot,
        event: &str,
        _emitter: EventEmitter,
    ) -> Result<()> {
        *view.0.borrow_mut().listeners.entry(event.to_string()).or_default() += 1;
        Ok(())
    }

    fn detach_event(&self, view: &RecordingView, _aux: &mut AuxSlot, event: &str) -> Result<()> {
        view.0.borrow_mut().listeners.remove(event);
        Ok(())
    }

    fn insert_child(&self, parent: &RecordingView, child: &RecordingView, index: usize) -> Result<()> {
        let child_id = child.0.borrow().id;
        let mut parent = parent.0.borrow_mut();
        let at = index.min(parent.children.len());
        parent.children.insert(at, child_id);
        Ok(())
    }

    fn remove_child(&self, parent: &RecordingView, child: &RecordingView) -> Result<()> {
        let child_id = child.0.borrow().id;
        parent.0.borrow_mut().children.retain(|c| *c != child_id);
        Ok(())
    }

    fn destroy_view(&self, view: &RecordingView, _aux: &mut AuxSlot) {
        let id = view.0.borrow().id;
        self.destroyed.lock().expect("lock").push(NodeId(id));
    }
}

/// A component that keeps every default: no children, no events.
pub struct LeafFactory(pub &'static str);

impl ComponentFactory<RecordingView> for LeafFactory {
    fn component_type(&self) -> &str {
        self.0
    }

    fn create_view(&self, ctx: &ViewContext<'_>) -> Result<RecordingView> {
        let view = RecordingView::default();
        view.0.borrow_mut().id = ctx.node.0;
        Ok(view)
    }
}

/// Fails to create views as if the toolkit were reached from the wrong
/// thread.
pub struct StrandedFactory;

impl ComponentFactory<RecordingView> for StrandedFactory {
    fn component_type(&self) -> &str {
        "stranded"
    }

    fn create_view(&self, _ctx: &ViewContext<'_>) -> Result<RecordingView> {
        Err(TetherError::WrongThread("a thread without the toolkit"))
    }
}

#[derive(Default)]
pub struct RecordingStyle(Mutex<Vec<String>>);

impl RecordingStyle {
    pub fn keys(&self) -> Vec<String> {
        self.0.lock().expect("lock").clone()
    }
}

impl StyleTranslator<RecordingView> for RecordingStyle {
    fn apply_style(&self, key: &str, value: &Value, view: &RecordingView) -> Result<()> {
        self.0.lock().expect("lock").push(key.to_string());
        view.0.borrow_mut().props.insert(key.to_string(), value.clone());
        Ok(())
    }
}

pub fn factories(tags: &[&'static str]) -> FactorySet<RecordingView> {
    tags.iter()
        .fold(FactorySet::new(), |set, tag| set.with(RecordingFactory::new(*tag)))
}

pub fn registry_with(tags: &[&'static str]) -> NodeRegistry<RecordingView> {
    NodeRegistry::new(factories(tags))
}

pub fn null_sink() -> NodeEventSink {
    Arc::new(|_, _, _, _| {})
}

pub fn ops(batch: Value) -> Vec<Operation> {
    serde_json::from_value(batch).expect("valid operations")
}

pub fn state_with_outbound() -> (UiState<RecordingView>, UnboundedReceiver<BridgeEnvelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = UiState::new(
        factories(&["container", "text"]),
        Arc::new(RecordingStyle::default()),
        null_sink(),
        Outbound::new(tx),
    );
    (state, rx)
}

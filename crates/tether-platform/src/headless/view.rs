// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory view objects for the headless toolkit.
//
// A `HeadlessView` behaves like a native widget handle: cheap to clone, tied
// to the UI thread (it is `!Send`), mutated in place by factories. Tests and
// desktop hosts drive it with the `simulate_*` methods, which play the part of
// a user touching the screen.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use tether_core::types::NodeId;

/// Native-side listener installed by a factory.
pub type NativeListener = Box<dyn Fn(Option<Value>)>;

pub struct ViewData {
    pub node: NodeId,
    pub kind: String,
    pub props: BTreeMap<String, Value>,
    pub style: BTreeMap<String, Value>,
    pub children: Vec<HeadlessView>,
    pub listeners: HashMap<String, NativeListener>,
}

#[derive(Clone)]
pub struct HeadlessView(Rc<RefCell<ViewData>>);

impl HeadlessView {
    pub fn new(node: NodeId, kind: &str) -> Self {
        Self(Rc::new(RefCell::new(ViewData {
            node,
            kind: kind.to_string(),
            props: BTreeMap::new(),
            style: BTreeMap::new(),
            children: Vec::new(),
            listeners: HashMap::new(),
        })))
    }

    pub fn node(&self) -> NodeId {
        self.0.borrow().node
    }

    pub fn kind(&self) -> String {
        self.0.borrow().kind.clone()
    }

    pub fn same_view(&self, other: &HeadlessView) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // -- properties ----------------------------------------------------------

    pub fn set_prop(&self, key: &str, value: Value) {
        self.0.borrow_mut().props.insert(key.to_string(), value);
    }

    pub fn prop(&self, key: &str) -> Option<Value> {
        self.0.borrow().props.get(key).cloned()
    }

    /// Displayed text, for views that show any.
    pub fn text(&self) -> Option<String> {
        let data = self.0.borrow();
        data.props
            .get("text")
            .or_else(|| data.props.get("value"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn set_style(&self, key: &str, value: Value) {
        self.0.borrow_mut().style.insert(key.to_string(), value);
    }

    pub fn clear_style(&self, key: &str) {
        self.0.borrow_mut().style.remove(key);
    }

    pub fn style(&self, key: &str) -> Option<Value> {
        self.0.borrow().style.get(key).cloned()
    }

    // -- children ------------------------------------------------------------

    /// Insert at `index`, appending when it is past the end.
    pub fn insert_child(&self, child: &HeadlessView, index: usize) {
        let mut data = self.0.borrow_mut();
        let at = index.min(data.children.len());
        data.children.insert(at, child.clone());
    }

    pub fn remove_child(&self, child: &HeadlessView) -> bool {
        let mut data = self.0.borrow_mut();
        let before = data.children.len();
        data.children.retain(|c| !c.same_view(child));
        data.children.len() != before
    }

    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    /// Node ids of the attached children, in order.
    pub fn child_nodes(&self) -> Vec<NodeId> {
        self.0.borrow().children.iter().map(HeadlessView::node).collect()
    }

    // -- native listeners ----------------------------------------------------

    pub fn set_listener(&self, event: &str, listener: NativeListener) {
        self.0.borrow_mut().listeners.insert(event.to_string(), listener);
    }

    pub fn clear_listener(&self, event: &str) -> bool {
        self.0.borrow_mut().listeners.remove(event).is_some()
    }

    pub fn clear_listeners(&self) {
        self.0.borrow_mut().listeners.clear();
    }

    pub fn has_listener(&self, event: &str) -> bool {
        self.0.borrow().listeners.contains_key(event)
    }

    /// Raise `event` as the toolkit would. Returns whether a listener ran.
    pub fn fire(&self, event: &str, payload: Option<Value>) -> bool {
        // Listeners may touch the view again; do not hold the borrow.
        let listener = self.0.borrow_mut().listeners.remove(event);
        let Some(listener) = listener else {
            trace!(node = %self.node(), event, "no native listener");
            return false;
        };
        listener(payload);
        self.0
            .borrow_mut()
            .listeners
            .entry(event.to_string())
            .or_insert(listener);
        true
    }

    // -- simulated input -----------------------------------------------------

    pub fn simulate_press(&self) -> bool {
        self.fire("press", None)
    }

    /// Replace the input's text and report it, like a keystroke would.
    pub fn simulate_typing(&self, text: &str) -> bool {
        self.set_prop("value", Value::from(text));
        self.fire("changeText", Some(serde_json::json!({ "text": text })))
    }

    pub fn simulate_scroll(&self, offset: f64) -> bool {
        self.set_prop("contentOffset", Value::from(offset));
        self.fire("scroll", Some(serde_json::json!({ "offset": offset })))
    }

    pub fn simulate_load_finished(&self) -> bool {
        self.set_prop("loaded", Value::Bool(true));
        let uri = self.prop("source").unwrap_or(Value::Null);
        self.fire("load", Some(serde_json::json!({ "uri": uri })))
    }
}

impl std::fmt::Debug for HeadlessView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.0.borrow();
        f.debug_struct("HeadlessView")
            .field("node", &data.node)
            .field("kind", &data.kind)
            .field("children", &data.children.len())
            .finish()
    }
}

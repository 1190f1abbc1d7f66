// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reference component factories for the headless toolkit.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tracing::debug;

use tether_core::error::{Result, TetherError};
use tether_runtime::{AuxSlot, ComponentFactory, EventEmitter, FactorySet, StyleTranslator, ViewContext};

use super::view::HeadlessView;

/// Teardown counters shared by all headless factories.
#[derive(Debug, Default)]
pub struct HeadlessStats {
    views_destroyed: AtomicUsize,
    watchers_stopped: AtomicUsize,
    loads_cancelled: AtomicUsize,
}

impl HeadlessStats {
    pub fn views_destroyed(&self) -> usize {
        self.views_destroyed.load(Ordering::SeqCst)
    }

    pub fn watchers_stopped(&self) -> usize {
        self.watchers_stopped.load(Ordering::SeqCst)
    }

    pub fn loads_cancelled(&self) -> usize {
        self.loads_cancelled.load(Ordering::SeqCst)
    }
}

/// The full headless factory set.
pub fn headless_factories(stats: &Arc<HeadlessStats>) -> FactorySet<HeadlessView> {
    FactorySet::new()
        .with(ContainerFactory(stats.clone()))
        .with(TextFactory(stats.clone()))
        .with(InputFactory(stats.clone()))
        .with(ListFactory(stats.clone()))
        .with(ImageFactory(stats.clone()))
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Install a native listener for `event` if the view kind can produce it.
fn listen(view: &HeadlessView, supported: &[&str], event: &str, emitter: EventEmitter) {
    if !supported.contains(&event) {
        debug!(kind = %view.kind(), event, "event not produced by this view");
        return;
    }
    let name = event.to_string();
    view.set_listener(event, Box::new(move |payload| emitter.emit(&name, payload)));
}

fn release(view: &HeadlessView, stats: &HeadlessStats) {
    view.clear_listeners();
    stats.views_destroyed.fetch_add(1, Ordering::SeqCst);
}

fn text_value(key: &str, value: &Value) -> Result<Value> {
    match value {
        Value::String(_) | Value::Null => Ok(value.clone()),
        Value::Number(n) => Ok(Value::from(n.to_string())),
        _ => Err(TetherError::InvalidArguments(format!("{key} must be text"))),
    }
}

// ---------------------------------------------------------------------------
// container
// ---------------------------------------------------------------------------

pub struct ContainerFactory(Arc<HeadlessStats>);

impl ComponentFactory<HeadlessView> for ContainerFactory {
    fn component_type(&self) -> &str {
        "container"
    }

    fn create_view(&self, ctx: &ViewContext<'_>) -> Result<HeadlessView> {
        Ok(HeadlessView::new(ctx.node, ctx.component))
    }

    fn attach_event(&self, view: &HeadlessView, _aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        listen(view, &["press", "longPress", "layout"], event, emitter);
        Ok(())
    }

    fn detach_event(&self, view: &HeadlessView, _aux: &mut AuxSlot, event: &str) -> Result<()> {
        view.clear_listener(event);
        Ok(())
    }

    fn insert_child(&self, parent: &HeadlessView, child: &HeadlessView, index: usize) -> Result<()> {
        parent.insert_child(child, index);
        Ok(())
    }

    fn remove_child(&self, parent: &HeadlessView, child: &HeadlessView) -> Result<()> {
        parent.remove_child(child);
        Ok(())
    }

    fn destroy_view(&self, view: &HeadlessView, _aux: &mut AuxSlot) {
        release(view, &self.0);
    }
}

// ---------------------------------------------------------------------------
// text
// ---------------------------------------------------------------------------

pub struct TextFactory(Arc<HeadlessStats>);

impl ComponentFactory<HeadlessView> for TextFactory {
    fn component_type(&self) -> &str {
        "text"
    }

    fn create_view(&self, ctx: &ViewContext<'_>) -> Result<HeadlessView> {
        Ok(HeadlessView::new(ctx.node, ctx.component))
    }

    fn apply_property(
        &self,
        view: &HeadlessView,
        _aux: &mut AuxSlot,
        key: &str,
        value: &Value,
        style: &dyn StyleTranslator<HeadlessView>,
    ) -> Result<()> {
        match key {
            "text" => view.set_prop(key, text_value(key, value)?),
            "numberOfLines" => view.set_prop(key, value.clone()),
            _ => return style.apply_style(key, value, view),
        }
        Ok(())
    }

    fn attach_event(&self, view: &HeadlessView, _aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        listen(view, &["press", "longPress"], event, emitter);
        Ok(())
    }

    fn detach_event(&self, view: &HeadlessView, _aux: &mut AuxSlot, event: &str) -> Result<()> {
        view.clear_listener(event);
        Ok(())
    }

    fn destroy_view(&self, view: &HeadlessView, _aux: &mut AuxSlot) {
        release(view, &self.0);
    }
}

// ---------------------------------------------------------------------------
// input
// ---------------------------------------------------------------------------

pub struct InputFactory(Arc<HeadlessStats>);

impl ComponentFactory<HeadlessView> for InputFactory {
    fn component_type(&self) -> &str {
        "input"
    }

    fn create_view(&self, ctx: &ViewContext<'_>) -> Result<HeadlessView> {
        let view = HeadlessView::new(ctx.node, ctx.component);
        view.set_prop("editable", Value::Bool(true));
        Ok(view)
    }

    fn apply_property(
        &self,
        view: &HeadlessView,
        _aux: &mut AuxSlot,
        key: &str,
        value: &Value,
        style: &dyn StyleTranslator<HeadlessView>,
    ) -> Result<()> {
        match key {
            "value" | "placeholder" => view.set_prop(key, text_value(key, value)?),
            "editable" | "secureTextEntry" => {
                let flag = value
                    .as_bool()
                    .ok_or_else(|| TetherError::InvalidArguments(format!("{key} must be a boolean")))?;
                view.set_prop(key, Value::Bool(flag));
            }
            _ => return style.apply_style(key, value, view),
        }
        Ok(())
    }

    fn attach_event(&self, view: &HeadlessView, _aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        listen(view, &["changeText", "submit", "focus", "blur"], event, emitter);
        Ok(())
    }

    fn detach_event(&self, view: &HeadlessView, _aux: &mut AuxSlot, event: &str) -> Result<()> {
        view.clear_listener(event);
        Ok(())
    }

    fn destroy_view(&self, view: &HeadlessView, _aux: &mut AuxSlot) {
        release(view, &self.0);
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

/// Scroll observer kept in the list's aux slot. The native listener stays
/// quiet once it is stopped, even if the toolkit still calls it.
struct ScrollWatch {
    active: Rc<Cell<bool>>,
}

impl ScrollWatch {
    fn stop(&self) {
        self.active.set(false);
    }
}

pub struct ListFactory(Arc<HeadlessStats>);

impl ListFactory {
    fn stop_watch(&self, view: &HeadlessView, aux: &mut AuxSlot) {
        if let Some(watch) = aux.take::<ScrollWatch>() {
            watch.stop();
            view.clear_listener("scroll");
            self.0.watchers_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ComponentFactory<HeadlessView> for ListFactory {
    fn component_type(&self) -> &str {
        "list"
    }

    fn create_view(&self, ctx: &ViewContext<'_>) -> Result<HeadlessView> {
        let view = HeadlessView::new(ctx.node, ctx.component);
        view.set_prop("contentOffset", Value::from(0.0));
        Ok(view)
    }

    fn attach_event(&self, view: &HeadlessView, aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        if event != "scroll" {
            listen(view, &["press"], event, emitter);
            return Ok(());
        }

        self.stop_watch(view, aux);
        let active = Rc::new(Cell::new(true));
        let live = active.clone();
        view.set_listener(
            "scroll",
            Box::new(move |payload| {
                if live.get() {
                    emitter.emit("scroll", payload);
                }
            }),
        );
        aux.insert(ScrollWatch { active });
        Ok(())
    }

    fn detach_event(&self, view: &HeadlessView, aux: &mut AuxSlot, event: &str) -> Result<()> {
        if event == "scroll" {
            self.stop_watch(view, aux);
        } else {
            view.clear_listener(event);
        }
        Ok(())
    }

    fn insert_child(&self, parent: &HeadlessView, child: &HeadlessView, index: usize) -> Result<()> {
        parent.insert_child(child, index);
        Ok(())
    }

    fn remove_child(&self, parent: &HeadlessView, child: &HeadlessView) -> Result<()> {
        parent.remove_child(child);
        Ok(())
    }

    fn destroy_view(&self, view: &HeadlessView, aux: &mut AuxSlot) {
        self.stop_watch(view, aux);
        release(view, &self.0);
    }
}

// ---------------------------------------------------------------------------
// image
// ---------------------------------------------------------------------------

/// An image fetch started by setting `source`.
struct ImageRequest {
    uri: String,
}

pub struct ImageFactory(Arc<HeadlessStats>);

impl ComponentFactory<HeadlessView> for ImageFactory {
    fn component_type(&self) -> &str {
        "image"
    }

    fn create_view(&self, ctx: &ViewContext<'_>) -> Result<HeadlessView> {
        Ok(HeadlessView::new(ctx.node, ctx.component))
    }

    fn apply_property(
        &self,
        view: &HeadlessView,
        aux: &mut AuxSlot,
        key: &str,
        value: &Value,
        style: &dyn StyleTranslator<HeadlessView>,
    ) -> Result<()> {
        match key {
            "source" => {
                let uri = value
                    .as_str()
                    .ok_or_else(|| TetherError::InvalidArguments("source must be a URI".into()))?;
                if let Some(previous) = aux.take::<ImageRequest>() {
                    if previous.uri == uri {
                        aux.insert(previous);
                        return Ok(());
                    }
                    debug!(uri = %previous.uri, "image request superseded");
                }
                view.set_prop("source", Value::from(uri));
                view.set_prop("loaded", Value::Bool(false));
                aux.insert(ImageRequest { uri: uri.to_string() });
            }
            "resizeMode" => view.set_prop(key, value.clone()),
            _ => return style.apply_style(key, value, view),
        }
        Ok(())
    }

    fn attach_event(&self, view: &HeadlessView, _aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        listen(view, &["load", "error", "press"], event, emitter);
        Ok(())
    }

    fn detach_event(&self, view: &HeadlessView, _aux: &mut AuxSlot, event: &str) -> Result<()> {
        view.clear_listener(event);
        Ok(())
    }

    fn destroy_view(&self, view: &HeadlessView, aux: &mut AuxSlot) {
        let loaded = view.prop("loaded").and_then(|v| v.as_bool()).unwrap_or(false);
        if let Some(request) = aux.take::<ImageRequest>() {
            if !loaded {
                debug!(uri = %request.uri, "image load cancelled");
                self.0.loads_cancelled.fetch_add(1, Ordering::SeqCst);
            }
        }
        release(view, &self.0);
    }
}

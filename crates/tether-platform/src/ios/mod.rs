// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// iOS platform via objc2 and UIKit.
//
// The UI thread is the main thread; tasks are posted to the main dispatch
// queue. Views are retained `UIView`s. UIKit does not retain control targets,
// so each view's event targets live in its aux slot and go away with it.
//
// Unsafe code here is limited to Objective-C message sends to well-known
// UIKit selectors and the libdispatch C API. Everything that touches a view
// runs on the main thread, which `MainThreadMarker` checks.

#![cfg(target_os = "ios")]

use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use objc2::rc::{Allocated, Retained};
use objc2::runtime::{AnyObject, NSObject};
use objc2::{DefinedClass, MainThreadMarker, class, define_class, msg_send, sel};
use objc2_foundation::NSString;
use objc2_ui_kit::{UIColor, UILabel, UITextField, UIView};
use serde_json::Value;
use tracing::{debug, error, warn};

use tether_core::error::{Result, TetherError};
use tether_runtime::{
    AuxSlot, ComponentFactory, EventEmitter, FactorySet, Platform, StyleTranslator, UiPoster,
    UiTask, ViewContext,
};

use crate::color::parse_color;

/// `UIControlEventEditingChanged`.
const EDITING_CHANGED: usize = 1 << 17;

fn require_main_thread() -> Result<MainThreadMarker> {
    MainThreadMarker::new().ok_or(TetherError::WrongThread("the main thread"))
}

// ---------------------------------------------------------------------------
// Main dispatch queue poster
// ---------------------------------------------------------------------------

#[repr(C)]
struct DispatchQueue {
    _private: [u8; 0],
}

unsafe extern "C" {
    static _dispatch_main_q: DispatchQueue;
    fn dispatch_async_f(
        queue: *const DispatchQueue,
        context: *mut c_void,
        work: extern "C" fn(*mut c_void),
    );
}

extern "C" fn run_task(context: *mut c_void) {
    // SAFETY: `context` is the `Box<UiTask>` leaked by `MainQueuePoster::post`,
    // handed to exactly one invocation.
    let task = unsafe { Box::from_raw(context.cast::<UiTask>()) };
    // Panics must not unwind into libdispatch.
    if catch_unwind(AssertUnwindSafe(*task)).is_err() {
        error!("UI task panicked; continuing with the next task");
    }
}

#[derive(Debug, Default)]
pub struct MainQueuePoster;

impl UiPoster for MainQueuePoster {
    fn post(&self, task: UiTask) -> Result<()> {
        let context = Box::into_raw(Box::new(task)).cast::<c_void>();
        // SAFETY: `_dispatch_main_q` is the process-wide main queue; the
        // context pointer is reclaimed by `run_task`.
        unsafe { dispatch_async_f(&raw const _dispatch_main_q, context, run_task) };
        Ok(())
    }

    fn is_ui_thread(&self) -> bool {
        MainThreadMarker::new().is_some()
    }
}

// ---------------------------------------------------------------------------
// Event target
// ---------------------------------------------------------------------------

struct EventTargetIvars {
    event: String,
    emitter: EventEmitter,
}

// SAFETY: declares an NSObject subclass; MainThreadOnly because UIKit sends
// target-action messages on the main thread.
define_class! {
    #[unsafe(super(NSObject))]
    #[thread_kind = MainThreadOnly]
    #[name = "TetherEventTarget"]
    #[ivars = EventTargetIvars]
    struct EventTarget;

    impl EventTarget {
        #[unsafe(method(fire:))]
        fn fire(&self, sender: &AnyObject) {
            let ivars = self.ivars();
            let payload = if ivars.event == "changeText" {
                // SAFETY: only text fields register this target for
                // changeText; `text` is a UITextField property.
                let text: Option<Retained<NSString>> = unsafe { msg_send![sender, text] };
                Some(serde_json::json!({ "text": text.map(|t| t.to_string()).unwrap_or_default() }))
            } else {
                None
            };
            ivars.emitter.emit(&ivars.event, payload);
        }
    }
}

impl EventTarget {
    fn new(mtm: MainThreadMarker, event: &str, emitter: EventEmitter) -> Retained<Self> {
        let this = mtm.alloc::<Self>();
        let this = this.set_ivars(EventTargetIvars {
            event: event.to_string(),
            emitter,
        });
        // SAFETY: standard NSObject init via super.
        unsafe { msg_send![super(this), init] }
    }
}

struct Attached {
    target: Retained<EventTarget>,
    recognizer: Option<Retained<AnyObject>>,
}

/// Event targets installed on one view, kept alive in its aux slot.
#[derive(Default)]
struct Targets(HashMap<String, Attached>);

fn attach_target(view: &IosView, aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
    let mtm = require_main_thread()?;
    detach_target(view, aux, event);

    let target = EventTarget::new(mtm, event, emitter);
    let recognizer = match event {
        "press" => {
            // SAFETY: UITapGestureRecognizer initWithTarget:action: and
            // UIView addGestureRecognizer: on the main thread.
            let recognizer: Retained<AnyObject> = unsafe {
                let alloc: Allocated<AnyObject> = msg_send![class!(UITapGestureRecognizer), alloc];
                msg_send![alloc, initWithTarget: &*target, action: sel!(fire:)]
            };
            unsafe {
                let _: () = msg_send![&*view.0, setUserInteractionEnabled: true];
                let _: () = msg_send![&*view.0, addGestureRecognizer: &*recognizer];
            }
            Some(recognizer)
        }
        "changeText" => {
            // SAFETY: UIControl addTarget:action:forControlEvents:; only text
            // fields accept changeText.
            unsafe {
                let _: () = msg_send![
                    &*view.0,
                    addTarget: &*target,
                    action: sel!(fire:),
                    forControlEvents: EDITING_CHANGED
                ];
            }
            None
        }
        _ => {
            debug!(event, "event not produced by this view");
            return Ok(());
        }
    };

    aux.update_or_insert(Targets::default, |t| {
        t.0.insert(event.to_string(), Attached { target, recognizer });
    });
    Ok(())
}

fn detach_target(view: &IosView, aux: &mut AuxSlot, event: &str) {
    let Some(attached) = aux.get_mut::<Targets>().and_then(|t| t.0.remove(event)) else {
        return;
    };
    // SAFETY: inverse of the sends in `attach_target`, on the main thread.
    unsafe {
        match &attached.recognizer {
            Some(recognizer) => {
                let _: () = msg_send![&*view.0, removeGestureRecognizer: &**recognizer];
            }
            None => {
                let _: () = msg_send![
                    &*view.0,
                    removeTarget: &*attached.target,
                    action: sel!(fire:),
                    forControlEvents: EDITING_CHANGED
                ];
            }
        }
    }
}

fn release_targets(view: &IosView, aux: &mut AuxSlot) {
    let events: Vec<String> = aux
        .get::<Targets>()
        .map(|t| t.0.keys().cloned().collect())
        .unwrap_or_default();
    for event in events {
        detach_target(view, aux, &event);
    }
}

// ---------------------------------------------------------------------------
// Views and factories
// ---------------------------------------------------------------------------

/// A retained `UIView` (or subclass).
#[derive(Clone)]
pub struct IosView(Retained<UIView>);

fn set_text(view: &IosView, selector_is_placeholder: bool, value: &Value) -> Result<()> {
    require_main_thread()?;
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let ns = NSString::from_str(&text);
    // SAFETY: setText: / setPlaceholder: on a UILabel or UITextField, main
    // thread checked above.
    unsafe {
        if selector_is_placeholder {
            let _: () = msg_send![&*view.0, setPlaceholder: &*ns];
        } else {
            let _: () = msg_send![&*view.0, setText: &*ns];
        }
    }
    Ok(())
}

fn add_subview(parent: &IosView, child: &IosView, index: usize) -> Result<()> {
    require_main_thread()?;
    // SAFETY: subviews / insertSubview:atIndex: on the main thread.
    unsafe {
        let subviews: Retained<AnyObject> = msg_send![&*parent.0, subviews];
        let count: usize = msg_send![&*subviews, count];
        let at = index.min(count) as isize;
        let _: () = msg_send![&*parent.0, insertSubview: &*child.0, atIndex: at];
    }
    Ok(())
}

fn remove_subview(child: &IosView) -> Result<()> {
    require_main_thread()?;
    // SAFETY: removeFromSuperview on the main thread.
    unsafe {
        let _: () = msg_send![&*child.0, removeFromSuperview];
    }
    Ok(())
}

pub struct ContainerFactory;

impl ComponentFactory<IosView> for ContainerFactory {
    fn component_type(&self) -> &str {
        "container"
    }

    fn create_view(&self, _ctx: &ViewContext<'_>) -> Result<IosView> {
        let mtm = require_main_thread()?;
        Ok(IosView(UIView::new(mtm)))
    }

    fn attach_event(&self, view: &IosView, aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        attach_target(view, aux, event, emitter)
    }

    fn detach_event(&self, view: &IosView, aux: &mut AuxSlot, event: &str) -> Result<()> {
        detach_target(view, aux, event);
        Ok(())
    }

    fn insert_child(&self, parent: &IosView, child: &IosView, index: usize) -> Result<()> {
        add_subview(parent, child, index)
    }

    fn remove_child(&self, _parent: &IosView, child: &IosView) -> Result<()> {
        remove_subview(child)
    }

    fn destroy_view(&self, view: &IosView, aux: &mut AuxSlot) {
        release_targets(view, aux);
    }
}

pub struct TextFactory;

impl ComponentFactory<IosView> for TextFactory {
    fn component_type(&self) -> &str {
        "text"
    }

    fn create_view(&self, _ctx: &ViewContext<'_>) -> Result<IosView> {
        let mtm = require_main_thread()?;
        Ok(IosView(Retained::into_super(UILabel::new(mtm))))
    }

    fn apply_property(
        &self,
        view: &IosView,
        _aux: &mut AuxSlot,
        key: &str,
        value: &Value,
        style: &dyn StyleTranslator<IosView>,
    ) -> Result<()> {
        match key {
            "text" => set_text(view, false, value),
            _ => style.apply_style(key, value, view),
        }
    }

    fn attach_event(&self, view: &IosView, aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        attach_target(view, aux, event, emitter)
    }

    fn detach_event(&self, view: &IosView, aux: &mut AuxSlot, event: &str) -> Result<()> {
        detach_target(view, aux, event);
        Ok(())
    }

    fn destroy_view(&self, view: &IosView, aux: &mut AuxSlot) {
        release_targets(view, aux);
    }
}

pub struct InputFactory;

impl ComponentFactory<IosView> for InputFactory {
    fn component_type(&self) -> &str {
        "input"
    }

    fn create_view(&self, _ctx: &ViewContext<'_>) -> Result<IosView> {
        let mtm = require_main_thread()?;
        let field = UITextField::new(mtm);
        Ok(IosView(Retained::into_super(Retained::into_super(field))))
    }

    fn apply_property(
        &self,
        view: &IosView,
        _aux: &mut AuxSlot,
        key: &str,
        value: &Value,
        style: &dyn StyleTranslator<IosView>,
    ) -> Result<()> {
        match key {
            "value" => set_text(view, false, value),
            "placeholder" => set_text(view, true, value),
            "editable" => {
                let enabled = value
                    .as_bool()
                    .ok_or_else(|| TetherError::InvalidArguments("editable must be a boolean".into()))?;
                require_main_thread()?;
                // SAFETY: UIControl setEnabled: on the main thread.
                unsafe {
                    let _: () = msg_send![&*view.0, setEnabled: enabled];
                }
                Ok(())
            }
            _ => style.apply_style(key, value, view),
        }
    }

    fn attach_event(&self, view: &IosView, aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        attach_target(view, aux, event, emitter)
    }

    fn detach_event(&self, view: &IosView, aux: &mut AuxSlot, event: &str) -> Result<()> {
        detach_target(view, aux, event);
        Ok(())
    }

    fn destroy_view(&self, view: &IosView, aux: &mut AuxSlot) {
        release_targets(view, aux);
    }
}

/// Background color and opacity; other keys are left to the real
/// translator.
pub struct IosStyle;

impl StyleTranslator<IosView> for IosStyle {
    fn apply_style(&self, key: &str, value: &Value, view: &IosView) -> Result<()> {
        require_main_thread()?;
        match key {
            "backgroundColor" => {
                let [r, g, b, a] = parse_color(value)?.to_unit();
                let color = UIColor::colorWithRed_green_blue_alpha(r, g, b, a);
                // SAFETY: UIView setBackgroundColor: on the main thread.
                unsafe {
                    let _: () = msg_send![&*view.0, setBackgroundColor: &*color];
                }
            }
            "opacity" => {
                let alpha = value
                    .as_f64()
                    .ok_or_else(|| TetherError::InvalidArguments("opacity must be a number".into()))?;
                // SAFETY: UIView setAlpha: on the main thread.
                unsafe {
                    let _: () = msg_send![&*view.0, setAlpha: alpha];
                }
            }
            _ => debug!(key, "style key ignored"),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct IosPlatform;

impl IosPlatform {
    /// Must be called on the main thread.
    pub fn new() -> Result<Self> {
        if MainThreadMarker::new().is_none() {
            warn!("iOS platform created off the main thread");
            return Err(TetherError::WrongThread("the main thread"));
        }
        Ok(Self)
    }
}

impl Platform for IosPlatform {
    type View = IosView;

    fn name(&self) -> &str {
        "ios"
    }

    fn ui_poster(&self) -> Result<Arc<dyn UiPoster>> {
        Ok(Arc::new(MainQueuePoster))
    }

    fn factories(&self) -> FactorySet<IosView> {
        FactorySet::new()
            .with(ContainerFactory)
            .with(TextFactory)
            .with(InputFactory)
    }

    fn style(&self) -> Arc<dyn StyleTranslator<IosView>> {
        Arc::new(IosStyle)
    }
}

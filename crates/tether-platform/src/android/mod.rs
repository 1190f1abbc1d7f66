// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Android platform via JNI.
//
// Views are global references to `android.view.View` instances. UI work runs
// on the main looper: posting queues the task here and asks the host's Java
// glue (`org.hyperpolymath.tether.TetherBridge.scheduleDrain`) to call back
// into `nativeDrain` on the main thread. Native events come back through
// `org.hyperpolymath.tether.TetherListener`, which implements the click and
// text-watcher interfaces and forwards to `nativeOnEvent`.

#![cfg(target_os = "android")]

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, ThreadId};

use jni::objects::{GlobalRef, JClass, JObject, JString, JValue};
use jni::sys::jlong;
use jni::{JNIEnv, JavaVM};
use serde_json::Value;
use tracing::{debug, error, warn};

use tether_core::error::{Result, TetherError};
use tether_runtime::{
    AuxSlot, ComponentFactory, EventEmitter, FactorySet, Platform, StyleTranslator, UiPoster,
    UiTask, ViewContext,
};

use crate::color::parse_color;

const BRIDGE_CLASS: &str = "org/hyperpolymath/tether/TetherBridge";
const LISTENER_CLASS: &str = "org/hyperpolymath/tether/TetherListener";

// ---------------------------------------------------------------------------
// JNI bootstrap helpers
// ---------------------------------------------------------------------------

static VM: OnceLock<JavaVM> = OnceLock::new();

fn java_vm() -> Result<&'static JavaVM> {
    if let Some(vm) = VM.get() {
        return Ok(vm);
    }
    let ctx = ndk_context::android_context();
    // SAFETY: `ctx.vm()` is the `JavaVM*` registered by the NDK glue and
    // stays valid for the life of the process.
    let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }
        .map_err(|e| TetherError::Platform(format!("failed to obtain JavaVM: {e}")))?;
    Ok(VM.get_or_init(|| vm))
}

fn jni_env() -> Result<JNIEnv<'static>> {
    java_vm()?
        .attach_current_thread_permanently()
        .map_err(|e| TetherError::Platform(format!("failed to attach JNI thread: {e}")))
}

/// The hosting `Activity`, used as the `Context` for new views.
fn activity() -> Result<JObject<'static>> {
    let ptr = ndk_context::android_context().context();
    if ptr.is_null() {
        return Err(TetherError::PlatformUnavailable);
    }
    // SAFETY: the NDK guarantees this is a valid global jobject for the
    // hosting Activity.
    Ok(unsafe { JObject::from_raw(ptr.cast()) })
}

fn jni_err(context: &str, e: jni::errors::Error) -> TetherError {
    TetherError::Platform(format!("{context}: {e}"))
}

// ---------------------------------------------------------------------------
// Main-looper poster
// ---------------------------------------------------------------------------

static LOOPER: OnceLock<Arc<LooperPoster>> = OnceLock::new();

pub struct LooperPoster {
    queue: Mutex<VecDeque<UiTask>>,
    main_thread: ThreadId,
}

impl LooperPoster {
    /// The process-wide poster. The first call must happen on the main
    /// thread, which it records as the UI thread.
    pub fn install() -> Arc<Self> {
        LOOPER
            .get_or_init(|| {
                Arc::new(Self {
                    queue: Mutex::new(VecDeque::new()),
                    main_thread: thread::current().id(),
                })
            })
            .clone()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<UiTask>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run everything queued so far. Called on the main thread by the Java
    /// glue.
    fn drain(&self) {
        loop {
            let Some(task) = self.queue().pop_front() else {
                break;
            };
            // Panics must not unwind into the JVM.
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!("UI task panicked; continuing with the next task");
            }
        }
    }
}

impl UiPoster for LooperPoster {
    fn post(&self, task: UiTask) -> Result<()> {
        self.queue().push_back(task);
        let mut env = jni_env()?;
        env.call_static_method(BRIDGE_CLASS, "scheduleDrain", "()V", &[])
            .map_err(|e| jni_err("TetherBridge.scheduleDrain", e))?;
        Ok(())
    }

    fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }
}

/// Called by `TetherBridge` on the main looper after `scheduleDrain`.
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_hyperpolymath_tether_TetherBridge_nativeDrain(
    _env: JNIEnv,
    _class: JClass,
) {
    match LOOPER.get() {
        Some(looper) => looper.drain(),
        None => warn!("nativeDrain before the looper poster was installed"),
    }
}

// ---------------------------------------------------------------------------
// Native listeners
// ---------------------------------------------------------------------------

fn emitters() -> MutexGuard<'static, HashMap<jlong, EventEmitter>> {
    static EMITTERS: OnceLock<Mutex<HashMap<jlong, EventEmitter>>> = OnceLock::new();
    EMITTERS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

static NEXT_HANDLE: AtomicI64 = AtomicI64::new(1);

/// Called by `TetherListener` on the main thread when its view fires.
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_hyperpolymath_tether_TetherListener_nativeOnEvent(
    mut env: JNIEnv,
    _this: JObject,
    handle: jlong,
    event: JString,
    payload: JString,
) {
    let Some(emitter) = emitters().get(&handle).cloned() else {
        debug!(handle, "event for a released listener");
        return;
    };
    let event: String = match env.get_string(&event) {
        Ok(s) => s.into(),
        Err(e) => {
            warn!(error = %e, "unreadable event name");
            return;
        }
    };
    let payload = if payload.is_null() {
        None
    } else {
        env.get_string(&payload)
            .ok()
            .and_then(|raw| serde_json::from_str::<Value>(&String::from(raw)).ok())
    };
    emitter.emit(&event, payload);
}

/// Java listener objects installed on one view, kept alive in its aux slot.
#[derive(Default)]
struct Listeners(HashMap<String, (jlong, GlobalRef)>);

fn new_listener(env: &mut JNIEnv, event: &str, emitter: EventEmitter) -> Result<(jlong, GlobalRef)> {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    let j_event = env.new_string(event).map_err(|e| jni_err("new_string(event)", e))?;
    let listener = env
        .new_object(
            LISTENER_CLASS,
            "(JLjava/lang/String;)V",
            &[JValue::Long(handle), JValue::Object(&j_event)],
        )
        .map_err(|e| jni_err("new TetherListener", e))?;
    let global = env
        .new_global_ref(listener)
        .map_err(|e| jni_err("new_global_ref(listener)", e))?;
    emitters().insert(handle, emitter);
    Ok((handle, global))
}

/// Setter and remover for each event the reference widgets produce.
fn listener_methods(event: &str) -> Option<(&'static str, &'static str, &'static str)> {
    match event {
        "press" => Some((
            "setOnClickListener",
            "(Landroid/view/View$OnClickListener;)V",
            "",
        )),
        "changeText" => Some((
            "addTextChangedListener",
            "(Landroid/text/TextWatcher;)V",
            "removeTextChangedListener",
        )),
        _ => None,
    }
}

fn attach_listener(view: &AndroidView, aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
    let Some((setter, sig, _)) = listener_methods(event) else {
        debug!(event, "event not produced by this view");
        return Ok(());
    };
    detach_listener(view, aux, event)?;

    let mut env = jni_env()?;
    let (handle, listener) = new_listener(&mut env, event, emitter)?;
    env.call_method(view.as_obj(), setter, sig, &[JValue::Object(listener.as_obj())])
        .map_err(|e| jni_err(setter, e))?;
    aux.update_or_insert(Listeners::default, |l| {
        l.0.insert(event.to_string(), (handle, listener));
    });
    Ok(())
}

fn detach_listener(view: &AndroidView, aux: &mut AuxSlot, event: &str) -> Result<()> {
    let Some((handle, listener)) = aux.get_mut::<Listeners>().and_then(|l| l.0.remove(event)) else {
        return Ok(());
    };
    emitters().remove(&handle);

    let Some((setter, sig, remover)) = listener_methods(event) else {
        return Ok(());
    };
    let mut env = jni_env()?;
    if remover.is_empty() {
        env.call_method(view.as_obj(), setter, sig, &[JValue::Object(&JObject::null())])
            .map_err(|e| jni_err(setter, e))?;
    } else {
        env.call_method(view.as_obj(), remover, sig, &[JValue::Object(listener.as_obj())])
            .map_err(|e| jni_err(remover, e))?;
    }
    Ok(())
}

fn release_listeners(view: &AndroidView, aux: &mut AuxSlot) {
    let events: Vec<String> = aux
        .get::<Listeners>()
        .map(|l| l.0.keys().cloned().collect())
        .unwrap_or_default();
    for event in events {
        if let Err(e) = detach_listener(view, aux, &event) {
            warn!(event = %event, error = %e, "listener not removed");
        }
    }
}

// ---------------------------------------------------------------------------
// Views and factories
// ---------------------------------------------------------------------------

/// Global reference to an `android.view.View`.
#[derive(Clone)]
pub struct AndroidView(GlobalRef);

impl AndroidView {
    pub fn as_obj(&self) -> &JObject<'static> {
        self.0.as_obj()
    }
}

fn new_view(class: &str) -> Result<AndroidView> {
    let mut env = jni_env()?;
    let activity = activity()?;
    let view = env
        .new_object(class, "(Landroid/content/Context;)V", &[JValue::Object(&activity)])
        .map_err(|e| jni_err(class, e))?;
    let global = env
        .new_global_ref(view)
        .map_err(|e| jni_err("new_global_ref(view)", e))?;
    Ok(AndroidView(global))
}

fn set_char_sequence(view: &AndroidView, method: &str, value: &Value) -> Result<()> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let mut env = jni_env()?;
    let j_text = env.new_string(&text).map_err(|e| jni_err("new_string(text)", e))?;
    env.call_method(
        view.as_obj(),
        method,
        "(Ljava/lang/CharSequence;)V",
        &[JValue::Object(&j_text)],
    )
    .map_err(|e| jni_err(method, e))?;
    Ok(())
}

fn add_child(parent: &AndroidView, child: &AndroidView, index: usize) -> Result<()> {
    let mut env = jni_env()?;
    let count = env
        .call_method(parent.as_obj(), "getChildCount", "()I", &[])
        .and_then(|v| v.i())
        .map_err(|e| jni_err("getChildCount", e))?;
    // addView throws past the end.
    let at = i32::try_from(index).unwrap_or(i32::MAX).min(count);
    env.call_method(
        parent.as_obj(),
        "addView",
        "(Landroid/view/View;I)V",
        &[JValue::Object(child.as_obj()), JValue::Int(at)],
    )
    .map_err(|e| jni_err("addView", e))?;
    Ok(())
}

fn remove_child_view(parent: &AndroidView, child: &AndroidView) -> Result<()> {
    let mut env = jni_env()?;
    env.call_method(
        parent.as_obj(),
        "removeView",
        "(Landroid/view/View;)V",
        &[JValue::Object(child.as_obj())],
    )
    .map_err(|e| jni_err("removeView", e))?;
    Ok(())
}

pub struct ContainerFactory;

impl ComponentFactory<AndroidView> for ContainerFactory {
    fn component_type(&self) -> &str {
        "container"
    }

    fn create_view(&self, _ctx: &ViewContext<'_>) -> Result<AndroidView> {
        new_view("android/widget/FrameLayout")
    }

    fn attach_event(&self, view: &AndroidView, aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        attach_listener(view, aux, event, emitter)
    }

    fn detach_event(&self, view: &AndroidView, aux: &mut AuxSlot, event: &str) -> Result<()> {
        detach_listener(view, aux, event)
    }

    fn insert_child(&self, parent: &AndroidView, child: &AndroidView, index: usize) -> Result<()> {
        add_child(parent, child, index)
    }

    fn remove_child(&self, parent: &AndroidView, child: &AndroidView) -> Result<()> {
        remove_child_view(parent, child)
    }

    fn destroy_view(&self, view: &AndroidView, aux: &mut AuxSlot) {
        release_listeners(view, aux);
    }
}

pub struct TextFactory;

impl ComponentFactory<AndroidView> for TextFactory {
    fn component_type(&self) -> &str {
        "text"
    }

    fn create_view(&self, _ctx: &ViewContext<'_>) -> Result<AndroidView> {
        new_view("android/widget/TextView")
    }

    fn apply_property(
        &self,
        view: &AndroidView,
        _aux: &mut AuxSlot,
        key: &str,
        value: &Value,
        style: &dyn StyleTranslator<AndroidView>,
    ) -> Result<()> {
        match key {
            "text" => set_char_sequence(view, "setText", value),
            _ => style.apply_style(key, value, view),
        }
    }

    fn attach_event(&self, view: &AndroidView, aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        attach_listener(view, aux, event, emitter)
    }

    fn detach_event(&self, view: &AndroidView, aux: &mut AuxSlot, event: &str) -> Result<()> {
        detach_listener(view, aux, event)
    }

    fn destroy_view(&self, view: &AndroidView, aux: &mut AuxSlot) {
        release_listeners(view, aux);
    }
}

pub struct InputFactory;

impl ComponentFactory<AndroidView> for InputFactory {
    fn component_type(&self) -> &str {
        "input"
    }

    fn create_view(&self, _ctx: &ViewContext<'_>) -> Result<AndroidView> {
        new_view("android/widget/EditText")
    }

    fn apply_property(
        &self,
        view: &AndroidView,
        _aux: &mut AuxSlot,
        key: &str,
        value: &Value,
        style: &dyn StyleTranslator<AndroidView>,
    ) -> Result<()> {
        match key {
            "value" => set_char_sequence(view, "setText", value),
            "placeholder" => set_char_sequence(view, "setHint", value),
            "editable" => {
                let enabled = value
                    .as_bool()
                    .ok_or_else(|| TetherError::InvalidArguments("editable must be a boolean".into()))?;
                let mut env = jni_env()?;
                env.call_method(view.as_obj(), "setEnabled", "(Z)V", &[JValue::Bool(enabled.into())])
                    .map_err(|e| jni_err("setEnabled", e))?;
                Ok(())
            }
            _ => style.apply_style(key, value, view),
        }
    }

    fn attach_event(&self, view: &AndroidView, aux: &mut AuxSlot, event: &str, emitter: EventEmitter) -> Result<()> {
        attach_listener(view, aux, event, emitter)
    }

    fn detach_event(&self, view: &AndroidView, aux: &mut AuxSlot, event: &str) -> Result<()> {
        detach_listener(view, aux, event)
    }

    fn destroy_view(&self, view: &AndroidView, aux: &mut AuxSlot) {
        release_listeners(view, aux);
    }
}

/// Background color and opacity; other keys are left to the real
/// translator.
pub struct AndroidStyle;

impl StyleTranslator<AndroidView> for AndroidStyle {
    fn apply_style(&self, key: &str, value: &Value, view: &AndroidView) -> Result<()> {
        let mut env = jni_env()?;
        match key {
            "backgroundColor" => {
                let argb = parse_color(value)?.to_argb();
                env.call_method(view.as_obj(), "setBackgroundColor", "(I)V", &[JValue::Int(argb)])
                    .map_err(|e| jni_err("setBackgroundColor", e))?;
            }
            "opacity" => {
                let alpha = value
                    .as_f64()
                    .ok_or_else(|| TetherError::InvalidArguments("opacity must be a number".into()))?;
                env.call_method(view.as_obj(), "setAlpha", "(F)V", &[JValue::Float(alpha as f32)])
                    .map_err(|e| jni_err("setAlpha", e))?;
            }
            _ => debug!(key, "style key ignored"),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

pub struct AndroidPlatform {
    looper: Arc<LooperPoster>,
}

impl AndroidPlatform {
    /// Must be called on the main thread.
    pub fn new() -> Result<Self> {
        java_vm()?;
        Ok(Self {
            looper: LooperPoster::install(),
        })
    }
}

impl Platform for AndroidPlatform {
    type View = AndroidView;

    fn name(&self) -> &str {
        "android"
    }

    fn ui_poster(&self) -> Result<Arc<dyn UiPoster>> {
        let poster: Arc<dyn UiPoster> = self.looper.clone();
        Ok(poster)
    }

    fn factories(&self) -> FactorySet<AndroidView> {
        FactorySet::new()
            .with(ContainerFactory)
            .with(TextFactory)
            .with(InputFactory)
    }

    fn style(&self) -> Arc<dyn StyleTranslator<AndroidView>> {
        Arc::new(AndroidStyle)
    }
}

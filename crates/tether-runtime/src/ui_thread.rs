// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// UI-owning thread discipline.
//
// Only the UI-owning thread may touch the node registry, native views, the
// listener table or the global event bus. Everything else reaches them by
// posting a task. A runtime's `UiState` lives in a thread-local slot on the UI
// thread, keyed by runtime id, and is only reachable from tasks running
// there; nothing shares references to it across threads.
//
// Posting never runs the task inline, even when already on the UI thread, so
// a task can safely post follow-up work (native event callbacks do).

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, error, warn};

use tether_core::error::{Result, TetherError};
use tether_core::types::RuntimeId;

use crate::state::UiState;

/// A unit of work marshaled onto the UI thread.
pub type UiTask = Box<dyn FnOnce() + Send>;

/// Something that can run tasks on the UI-owning thread: a platform main
/// loop, or the dedicated `UiThread` used on desktop and in tests.
pub trait UiPoster: Send + Sync {
    /// Queue `task` to run on the UI thread. Must not run it inline.
    fn post(&self, task: UiTask) -> Result<()>;

    /// Whether the caller is running on the UI thread.
    fn is_ui_thread(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Dedicated UI thread
// ---------------------------------------------------------------------------

/// A plain thread draining a task queue in order. Stands in for a platform
/// main loop wherever there is none.
pub struct UiThread {
    tx: Mutex<Option<Sender<UiTask>>>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl UiThread {
    pub fn spawn(name: &str) -> Result<Arc<Self>> {
        let (tx, rx) = mpsc::channel::<UiTask>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for task in rx {
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        error!("UI task panicked; continuing with the next task");
                    }
                }
                debug!("UI thread queue closed");
            })?;

        Ok(Arc::new(Self {
            thread_id: handle.thread().id(),
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        }))
    }

    /// Close the queue, let queued tasks finish and join the thread. Calling
    /// this from the UI thread only closes the queue.
    pub fn stop(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        if self.is_ui_thread() {
            return;
        }
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("UI thread join failed");
            }
        }
    }
}

impl UiPoster for UiThread {
    fn post(&self, task: UiTask) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| TetherError::Dispatch("UI queue lock poisoned".into()))?;
        match tx.as_ref() {
            Some(tx) => tx
                .send(task)
                .map_err(|_| TetherError::Dispatch("UI thread has exited".into())),
            None => Err(TetherError::Dispatch("UI thread stopped".into())),
        }
    }

    fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Per-runtime state on the UI thread
// ---------------------------------------------------------------------------

thread_local! {
    static UI_STATES: RefCell<HashMap<RuntimeId, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Puts a runtime's state back into the thread-local map when the task using
/// it finishes, including by panic.
struct Checkout {
    id: RuntimeId,
    state: Option<Box<dyn Any>>,
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            UI_STATES.with(|states| states.borrow_mut().insert(self.id, state));
        }
    }
}

fn with_state<V: 'static>(id: RuntimeId, task: impl FnOnce(&mut UiState<V>)) {
    // Removed for the duration of the task so nothing holds the RefCell
    // borrow while factory or subscriber code runs.
    let taken = UI_STATES.with(|states| states.borrow_mut().remove(&id));
    let Some(state) = taken else {
        debug!(runtime = %id, "UI task for a torn-down runtime dropped");
        return;
    };

    let mut checkout = Checkout {
        id,
        state: Some(state),
    };
    match checkout
        .state
        .as_mut()
        .and_then(|s| s.downcast_mut::<UiState<V>>())
    {
        Some(state) => task(state),
        None => error!(runtime = %id, "UI state has an unexpected view type"),
    }
}

/// Posts typed tasks against one runtime's `UiState`.
pub struct UiExecutor<V> {
    id: RuntimeId,
    poster: Arc<dyn UiPoster>,
    _view: PhantomData<fn() -> V>,
}

impl<V> Clone for UiExecutor<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            poster: self.poster.clone(),
            _view: PhantomData,
        }
    }
}

impl<V: 'static> UiExecutor<V> {
    pub fn new(id: RuntimeId, poster: Arc<dyn UiPoster>) -> Self {
        Self {
            id,
            poster,
            _view: PhantomData,
        }
    }

    pub fn runtime_id(&self) -> RuntimeId {
        self.id
    }

    pub fn poster(&self) -> &Arc<dyn UiPoster> {
        &self.poster
    }

    pub fn is_ui_thread(&self) -> bool {
        self.poster.is_ui_thread()
    }

    /// Build the state on the UI thread and park it under this runtime's id.
    pub(crate) fn install(&self, build: impl FnOnce() -> UiState<V> + Send + 'static) -> Result<()> {
        let id = self.id;
        self.poster.post(Box::new(move || {
            let state: Box<dyn Any> = Box::new(build());
            UI_STATES.with(|states| states.borrow_mut().insert(id, state));
            debug!(runtime = %id, "UI state installed");
        }))
    }

    /// Tear the state down on the UI thread: every node is released through
    /// its factory, then the state is dropped. Tasks posted afterwards are
    /// dropped.
    pub(crate) fn uninstall(&self) -> Result<()> {
        let id = self.id;
        self.poster.post(Box::new(move || {
            let taken = UI_STATES.with(|states| states.borrow_mut().remove(&id));
            if let Some(mut state) = taken {
                if let Some(state) = state.downcast_mut::<UiState<V>>() {
                    state.teardown();
                }
            }
            debug!(runtime = %id, "UI state uninstalled");
        }))
    }

    /// Queue `task` against the UI state.
    pub fn run(&self, task: impl FnOnce(&mut UiState<V>) + Send + 'static) -> Result<()> {
        let id = self.id;
        self.poster
            .post(Box::new(move || with_state::<V>(id, task)))
    }

    /// Queue `task` and block until it has produced a value. Refused on the UI
    /// thread itself, where waiting would deadlock.
    pub fn call<R: Send + 'static>(
        &self,
        task: impl FnOnce(&mut UiState<V>) -> R + Send + 'static,
    ) -> Result<R> {
        if self.poster.is_ui_thread() {
            return Err(TetherError::WrongThread("the UI thread"));
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.run(move |state| {
            let _ = tx.send(task(state));
        })?;
        rx.recv()
            .map_err(|_| TetherError::Dispatch("UI state is not available".into()))
    }

    /// Block until every task posted so far has run, whether or not the
    /// runtime's state is still installed.
    pub fn flush(&self) -> Result<()> {
        if self.poster.is_ui_thread() {
            return Err(TetherError::WrongThread("the UI thread"));
        }
        let (tx, rx) = mpsc::sync_channel::<()>(1);
        self.poster.post(Box::new(move || {
            let _ = tx.send(());
        }))?;
        rx.recv()
            .map_err(|_| TetherError::Dispatch("UI thread has exited".into()))
    }
}

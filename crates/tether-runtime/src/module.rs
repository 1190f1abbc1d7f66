// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Native module registry and dispatch.
//
// Modules are looked up by name and answer method calls either through a
// pending callback (any thread, any time, at most once) or synchronously.
// Each registration owns a liveness token; tearing a module down kills the
// token first, so results that arrive afterwards vanish.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use tether_core::error::{Result, TetherError};

use crate::callback::{Completion, LivenessToken, PendingCallback};
use crate::event_bus::BusHandle;

/// Callback a module completes exactly once with its result.
pub type ModuleCallback = PendingCallback<Value>;

/// Everything a module call may use besides its arguments.
#[derive(Clone, Debug)]
pub struct ModuleContext {
    worker: Handle,
    bus: BusHandle,
    liveness: LivenessToken,
}

impl ModuleContext {
    /// Runtime for work that must stay off the UI thread.
    pub fn worker(&self) -> &Handle {
        &self.worker
    }

    /// Run `future` on the worker runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.worker.spawn(future)
    }

    /// Emit a global event; it is dispatched on the UI thread.
    pub fn bus(&self) -> &BusHandle {
        &self.bus
    }

    /// False once the module has been torn down. Long-running work should
    /// stop when this flips.
    pub fn is_live(&self) -> bool {
        self.liveness.is_alive()
    }
}

/// A named service callable from the script side.
pub trait NativeModule: Send + Sync {
    fn name(&self) -> &str;

    /// Start `method`. The callback may be completed on any thread, now or
    /// later; dropping it reports an error to the caller.
    fn invoke(&self, method: &str, args: Vec<Value>, callback: ModuleCallback, ctx: &ModuleContext);

    /// Answer `method` synchronously on the calling thread. Modules without
    /// a synchronous form answer `null`.
    fn invoke_sync(&self, method: &str, args: &[Value], ctx: &ModuleContext) -> Result<Value> {
        let _ = (method, args, ctx);
        Ok(Value::Null)
    }

    /// Release timers, listeners and connections. Called once, after the
    /// module's liveness token has been killed.
    fn teardown(&self) {}
}

struct ModuleEntry {
    module: Arc<dyn NativeModule>,
    liveness: LivenessToken,
}

pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, ModuleEntry>>,
    worker: Handle,
    bus: BusHandle,
}

impl ModuleRegistry {
    pub fn new(worker: Handle, bus: BusHandle) -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
            worker,
            bus,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ModuleEntry>> {
        self.modules.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ModuleEntry>> {
        self.modules.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `module` under its own name. A module already registered
    /// under that name is replaced without being notified.
    pub fn register(&self, module: Arc<dyn NativeModule>) {
        let name = module.name().to_string();
        let entry = ModuleEntry {
            module,
            liveness: LivenessToken::new(),
        };
        if self.write().insert(name.clone(), entry).is_some() {
            warn!(module = %name, "module replaced");
        } else {
            info!(module = %name, "module registered");
        }
    }

    /// Look up a module and the context its calls run with.
    fn lookup(&self, name: &str) -> Option<(Arc<dyn NativeModule>, ModuleContext)> {
        let modules = self.read();
        let entry = modules.get(name)?;
        Some((
            entry.module.clone(),
            ModuleContext {
                worker: self.worker.clone(),
                bus: self.bus.clone(),
                liveness: entry.liveness.clone(),
            },
        ))
    }

    /// Call `module.method` asynchronously. `on_complete` receives exactly
    /// one completion, unless the module is torn down first. Never fails
    /// towards the caller: an unknown module completes with
    /// `ModuleNotFound` straight away.
    #[instrument(level = "debug", skip(self, args, on_complete))]
    pub fn invoke(
        &self,
        module: &str,
        method: &str,
        args: Vec<Value>,
        on_complete: impl FnOnce(Completion<Value>) + Send + 'static,
    ) {
        let Some((target, ctx)) = self.lookup(module) else {
            debug!(module, "call to unknown module");
            PendingCallback::new(LivenessToken::new(), on_complete)
                .reject(TetherError::ModuleNotFound(module.to_string()));
            return;
        };

        let callback = PendingCallback::new(ctx.liveness.clone(), on_complete);
        target.invoke(method, args, callback, &ctx);
    }

    /// Call `module.method` synchronously on the calling thread.
    pub fn invoke_sync(&self, module: &str, method: &str, args: &[Value]) -> Result<Value> {
        let (target, ctx) = self
            .lookup(module)
            .ok_or_else(|| TetherError::ModuleNotFound(module.to_string()))?;
        target.invoke_sync(method, args, &ctx)
    }

    /// Unregister `name`, kill its token and run its teardown. Returns
    /// whether it was registered.
    pub fn teardown(&self, name: &str) -> bool {
        let Some(entry) = self.write().remove(name) else {
            return false;
        };
        entry.liveness.kill();
        entry.module.teardown();
        info!(module = name, "module torn down");
        true
    }

    /// Tear down every module. Returns how many there were.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<(String, ModuleEntry)> = self.write().drain().collect();
        for (name, entry) in &drained {
            entry.liveness.kill();
            entry.module.teardown();
            debug!(module = %name, "module torn down");
        }
        drained.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered module names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn worker() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime")
    }

    fn registry(rt: &tokio::runtime::Runtime) -> ModuleRegistry {
        ModuleRegistry::new(rt.handle().clone(), BusHandle::new(|_, _| {}))
    }

    /// Echoes its arguments; `later` parks the callback until `release`.
    #[derive(Default)]
    struct Echo {
        parked: Mutex<Vec<ModuleCallback>>,
        torn_down: AtomicUsize,
    }

    impl Echo {
        fn release(&self) {
            for callback in self.parked.lock().expect("lock").drain(..) {
                callback.resolve(Value::from("late"));
            }
        }
    }

    impl NativeModule for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        fn invoke(&self, method: &str, args: Vec<Value>, callback: ModuleCallback, ctx: &ModuleContext) {
            match method {
                "echo" => {
                    callback.resolve(Value::Array(args));
                }
                "spawned" => {
                    ctx.spawn(async move {
                        callback.resolve(Value::from("from worker"));
                    });
                }
                "later" => self.parked.lock().expect("lock").push(callback),
                "forget" => drop(callback),
                other => {
                    callback.reject(TetherError::MethodNotFound {
                        module: "Echo".into(),
                        method: other.into(),
                    });
                }
            }
        }

        fn invoke_sync(&self, method: &str, args: &[Value], _ctx: &ModuleContext) -> Result<Value> {
            match method {
                "count" => Ok(Value::from(args.len())),
                other => Err(TetherError::MethodNotFound {
                    module: "Echo".into(),
                    method: other.into(),
                }),
            }
        }

        fn teardown(&self) {
            self.torn_down.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn channel() -> (
        mpsc::Receiver<Result<Value>>,
        impl FnOnce(Completion<Value>) + Send + 'static,
    ) {
        let (tx, rx) = mpsc::channel();
        (rx, move |completion: Completion<Value>| {
            let _ = tx.send(completion.into_outcome());
        })
    }

    #[test]
    fn unknown_module_completes_with_error() {
        let rt = worker();
        let modules = registry(&rt);
        let (rx, on_complete) = channel();

        modules.invoke("Nope", "anything", vec![], on_complete);

        let outcome = rx.recv_timeout(Duration::from_secs(1)).expect("completion");
        assert!(matches!(outcome, Err(TetherError::ModuleNotFound(name)) if name == "Nope"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_module_sync_is_an_error() {
        let rt = worker();
        let modules = registry(&rt);
        let err = modules.invoke_sync("Nope", "x", &[]).expect_err("unknown");
        assert!(matches!(err, TetherError::ModuleNotFound(_)));
    }

    #[test]
    fn async_and_worker_completion() {
        let rt = worker();
        let modules = registry(&rt);
        modules.register(Arc::new(Echo::default()));

        let (rx, on_complete) = channel();
        modules.invoke("Echo", "echo", vec![Value::from(1)], on_complete);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).expect("completion").expect("ok"),
            serde_json::json!([1])
        );

        let (rx, on_complete) = channel();
        modules.invoke("Echo", "spawned", vec![], on_complete);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).expect("completion").expect("ok"),
            Value::from("from worker")
        );
    }

    #[test]
    fn unknown_method_and_dropped_callback_report_errors() {
        let rt = worker();
        let modules = registry(&rt);
        modules.register(Arc::new(Echo::default()));

        let (rx, on_complete) = channel();
        modules.invoke("Echo", "missing", vec![], on_complete);
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)).expect("completion"),
            Err(TetherError::MethodNotFound { .. })
        ));

        let (rx, on_complete) = channel();
        modules.invoke("Echo", "forget", vec![], on_complete);
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)).expect("completion"),
            Err(TetherError::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn sync_form_and_default_null() {
        struct NoSync;
        impl NativeModule for NoSync {
            fn name(&self) -> &str {
                "NoSync"
            }
            fn invoke(&self, _: &str, _: Vec<Value>, callback: ModuleCallback, _: &ModuleContext) {
                callback.resolve(Value::Null);
            }
        }

        let rt = worker();
        let modules = registry(&rt);
        modules.register(Arc::new(Echo::default()));
        modules.register(Arc::new(NoSync));

        assert_eq!(
            modules
                .invoke_sync("Echo", "count", &[Value::Null, Value::Null])
                .expect("sync"),
            Value::from(2)
        );
        assert_eq!(modules.invoke_sync("NoSync", "x", &[]).expect("sync"), Value::Null);
        assert_eq!(modules.names(), vec!["Echo".to_string(), "NoSync".to_string()]);
    }

    #[test]
    fn completion_after_teardown_is_dropped() {
        let rt = worker();
        let modules = registry(&rt);
        let echo = Arc::new(Echo::default());
        modules.register(echo.clone());

        let (rx, on_complete) = channel();
        modules.invoke("Echo", "later", vec![], on_complete);

        assert!(modules.teardown("Echo"));
        assert!(!modules.teardown("Echo"));
        assert_eq!(echo.torn_down.load(Ordering::SeqCst), 1);

        echo.release();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!modules.contains("Echo"));
    }

    #[test]
    fn shutdown_tears_everything_down() {
        let rt = worker();
        let modules = registry(&rt);
        let echo = Arc::new(Echo::default());
        modules.register(echo.clone());

        assert_eq!(modules.shutdown(), 1);
        assert_eq!(echo.torn_down.load(Ordering::SeqCst), 1);
        assert!(modules.names().is_empty());
    }
}

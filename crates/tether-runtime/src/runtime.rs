// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The bridge runtime: wires a platform's UI thread, factories and style
// translator to the processor, the module registry and the outbound channel.
//
// Every method here may be called from any thread except where noted. Tree
// mutations and event routing are posted to the UI thread; module calls run
// wherever the module puts them and come back through the UI thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, instrument, warn};

use tether_core::config::BridgeConfig;
use tether_core::error::Result;
use tether_core::protocol::{BridgeEnvelope, Operation, ScriptEnvelope};
use tether_core::types::{CallId, RuntimeId};

use crate::event_bus::BusHandle;
use crate::factory::{FactorySet, NodeEventSink, StyleTranslator};
use crate::module::{ModuleRegistry, NativeModule};
use crate::registry::TreeSnapshot;
use crate::state::{Outbound, UiState};
use crate::ui_thread::{UiExecutor, UiPoster};

/// One host platform's implementation set.
pub trait Platform: Send + Sync + 'static {
    /// Native view handle.
    type View: 'static;

    /// Short platform name reported in the `ready` envelope.
    fn name(&self) -> &str;

    /// Poster for the thread that owns the platform's UI.
    fn ui_poster(&self) -> Result<Arc<dyn UiPoster>>;

    fn factories(&self) -> FactorySet<Self::View>;

    fn style(&self) -> Arc<dyn StyleTranslator<Self::View>>;
}

pub struct BridgeRuntime<P: Platform> {
    id: RuntimeId,
    platform: Arc<P>,
    config: BridgeConfig,
    executor: UiExecutor<P::View>,
    modules: Arc<ModuleRegistry>,
    outbound: Outbound,
    bus: BusHandle,
    workers: Option<tokio::runtime::Runtime>,
    // Set once a resync has been requested; cleared by the next reset batch.
    resync_pending: Arc<AtomicBool>,
}

impl<P: Platform> BridgeRuntime<P> {
    /// Start a runtime on `platform`. Returns the runtime and the receiving
    /// end of the outbound channel to the script side.
    #[instrument(skip_all, fields(platform = platform.name()))]
    pub fn start(platform: P, config: BridgeConfig) -> Result<(Self, UnboundedReceiver<BridgeEnvelope>)> {
        let workers = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.module_worker_threads.max(1))
            .thread_name("tether-module")
            .enable_all()
            .build()?;

        let id = RuntimeId::new();
        let executor = UiExecutor::<P::View>::new(id, platform.ui_poster()?);
        let (tx, rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(tx);

        let node_events: NodeEventSink = {
            let executor = executor.clone();
            Arc::new(move |node, generation, event, payload| {
                let queued = executor.run(move |state| {
                    state.deliver_node_event(node, generation, event, payload);
                });
                if let Err(err) = queued {
                    debug!(node = %node, error = %err, "node event dropped");
                }
            })
        };

        let bus = {
            let executor = executor.clone();
            BusHandle::new(move |name, payload| {
                let queued = executor.run(move |state| {
                    state.dispatch_global(&name, &payload);
                });
                if let Err(err) = queued {
                    debug!(error = %err, "global event dropped");
                }
            })
        };

        let factories = platform.factories();
        let style = platform.style();
        let state_outbound = outbound.clone();
        executor.install(move || UiState::new(factories, style, node_events, state_outbound))?;

        let modules = Arc::new(ModuleRegistry::new(workers.handle().clone(), bus.clone()));

        info!(runtime = %id, platform = platform.name(), "bridge runtime started");
        Ok((
            Self {
                id,
                platform: Arc::new(platform),
                config,
                executor,
                modules,
                outbound,
                bus,
                workers: Some(workers),
                resync_pending: Arc::new(AtomicBool::new(false)),
            },
            rx,
        ))
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Handle for emitting global events from any thread.
    pub fn bus(&self) -> BusHandle {
        self.bus.clone()
    }

    /// Tell the script side the bridge is up.
    pub fn ready(&self) {
        self.outbound.send(BridgeEnvelope::Ready {
            sid: self.config.session.clone(),
            platform: self.platform.name().to_string(),
        });
    }

    pub fn register_module(&self, module: impl NativeModule + 'static) {
        self.modules.register(Arc::new(module));
    }

    pub fn teardown_module(&self, name: &str) -> bool {
        self.modules.teardown(name)
    }

    /// Queue one batch for the UI thread. With `reset`, the whole tree is
    /// destroyed first and a pending resync request is considered answered.
    pub fn submit_batch(&self, seq: u64, reset: bool, ops: Vec<Operation>) -> Result<()> {
        let outbound = self.outbound.clone();
        let resync_pending = self.resync_pending.clone();
        let resync_on_drift = self.config.resync_on_drift;

        self.executor.run(move |state| {
            if reset {
                resync_pending.store(false, Ordering::Release);
            }
            let report = match state.apply_batch(reset, ops) {
                Ok(report) => report,
                Err(err) => {
                    warn!(seq, error = %err, "batch rejected");
                    return;
                }
            };
            let Some(reason) = report.drift_reason() else {
                return;
            };
            if resync_on_drift && !resync_pending.swap(true, Ordering::AcqRel) {
                info!(seq, %reason, "native tree drifted; requesting resync");
                outbound.send(BridgeEnvelope::Resync { seq, reason });
            }
        })
    }

    /// Call `module.method` on behalf of the script side. The result goes
    /// out as a `callResult` envelope via the UI thread, unless the module
    /// was torn down before the call completed. A result completed before
    /// teardown is still sent.
    pub fn invoke(&self, call_id: CallId, module: &str, method: &str, args: Vec<Value>) {
        let executor = self.executor.clone();
        let outbound = self.outbound.clone();
        self.modules.invoke(module, method, args, move |completion| {
            let queued = executor.run(move |_state| {
                outbound.send(BridgeEnvelope::CallResult {
                    call_id,
                    response: completion.into_outcome().into(),
                });
            });
            if let Err(err) = queued {
                debug!(call = %call_id, error = %err, "call result dropped");
            }
        });
    }

    /// Synchronous module call on the calling thread.
    pub fn invoke_sync(&self, module: &str, method: &str, args: &[Value]) -> Result<Value> {
        self.modules.invoke_sync(module, method, args)
    }

    /// Start forwarding global event `name` to the script side.
    pub fn subscribe_script(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.executor.run(move |state| state.subscribe_script(&name))
    }

    pub fn unsubscribe_script(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.executor.run(move |state| {
            state.unsubscribe_script(&name);
        })
    }

    /// Route one decoded envelope from the script side.
    pub fn handle_envelope(&self, envelope: ScriptEnvelope) -> Result<()> {
        match envelope {
            ScriptEnvelope::Batch { seq, reset, ops } => self.submit_batch(seq, reset, ops),
            ScriptEnvelope::Call {
                call_id,
                module,
                method,
                args,
            } => {
                self.invoke(call_id, &module, &method, args);
                Ok(())
            }
            ScriptEnvelope::Subscribe { name } => self.subscribe_script(&name),
            ScriptEnvelope::Unsubscribe { name } => self.unsubscribe_script(&name),
        }
    }

    /// Queue `task` against the UI state.
    pub fn post(&self, task: impl FnOnce(&mut UiState<P::View>) + Send + 'static) -> Result<()> {
        self.executor.run(task)
    }

    /// Run a read-only closure on the UI thread and wait for its result.
    /// Fails with `WrongThread` when called on the UI thread.
    pub fn inspect<R: Send + 'static>(
        &self,
        task: impl FnOnce(&UiState<P::View>) -> R + Send + 'static,
    ) -> Result<R> {
        self.executor.call(move |state| task(state))
    }

    pub fn snapshot(&self) -> Result<TreeSnapshot> {
        self.inspect(|state| state.registry().snapshot())
    }

    /// Tear modules down, release every node through its factory and stop
    /// the module workers. Results already queued for the UI thread go out
    /// first. Safe to call more than once.
    #[instrument(skip(self), fields(runtime = %self.id))]
    pub fn shutdown(&mut self) {
        let Some(workers) = self.workers.take() else {
            return;
        };

        if let Err(err) = self.executor.flush() {
            debug!(error = %err, "not draining the UI queue before teardown");
        }
        let modules = self.modules.shutdown();
        if let Err(err) = self.executor.uninstall() {
            warn!(error = %err, "UI state could not be torn down");
        } else if let Err(err) = self.executor.flush() {
            debug!(error = %err, "not waiting for UI teardown");
        }
        workers.shutdown_timeout(self.config.shutdown_timeout());
        info!(modules, "bridge runtime shut down");
    }
}

impl<P: Platform> Drop for BridgeRuntime<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

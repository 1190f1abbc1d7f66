// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tether runtime: node registry, component factory protocol, operation
// processor, native modules, global event bus and the UI-thread discipline
// that ties them together.

pub mod callback;
pub mod event_bus;
pub mod factory;
pub mod listeners;
pub mod module;
pub mod processor;
pub mod registry;
pub mod runtime;
pub mod state;
pub mod ui_thread;

#[cfg(test)]
mod test_support;

pub use callback::{Completion, LivenessToken, PendingCallback};
pub use event_bus::{BusHandle, GlobalEventBus};
pub use factory::{ComponentFactory, EventEmitter, FactorySet, StyleTranslator, ViewContext};
pub use module::{ModuleCallback, ModuleContext, ModuleRegistry, NativeModule};
pub use processor::{BatchReport, SkippedOperation};
pub use registry::{AuxSlot, Generation, NodeRegistry, TreeSnapshot};
pub use runtime::{BridgeRuntime, Platform};
pub use state::UiState;
pub use ui_thread::{UiPoster, UiTask, UiThread};

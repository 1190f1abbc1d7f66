// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reference native modules installed by the host.

pub mod device;
pub mod storage;
pub mod timer;

use serde_json::Value;

use tether_core::error::TetherError;
use tether_runtime::{BridgeRuntime, Platform};

pub use device::Device;
pub use storage::Storage;
pub use timer::Timer;

/// Register every reference module on `runtime`.
pub fn install<P: Platform>(runtime: &BridgeRuntime<P>) {
    runtime.register_module(Device::new(runtime.platform().name()));
    runtime.register_module(Storage::default());
    runtime.register_module(Timer::default());
}

fn method_not_found(module: &str, method: &str) -> TetherError {
    TetherError::MethodNotFound {
        module: module.to_string(),
        method: method.to_string(),
    }
}

/// The string argument at `index`.
fn string_arg(args: &[Value], index: usize, name: &str) -> Result<String, TetherError> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TetherError::InvalidArguments(format!("argument {index} ({name}) must be a string")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::mpsc;
    use std::time::Duration;

    use serde_json::Value;

    use tether_core::error::Result;
    use tether_runtime::{BusHandle, Completion, ModuleRegistry};

    pub fn worker() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime")
    }

    pub fn registry(rt: &tokio::runtime::Runtime) -> ModuleRegistry {
        ModuleRegistry::new(rt.handle().clone(), BusHandle::new(|_, _| {}))
    }

    /// Invoke and wait for the completion.
    pub fn call(modules: &ModuleRegistry, module: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let (tx, rx) = mpsc::channel();
        modules.invoke(module, method, args, move |completion: Completion<Value>| {
            let _ = tx.send(completion.into_outcome());
        });
        rx.recv_timeout(Duration::from_secs(5)).expect("completion")
    }
}

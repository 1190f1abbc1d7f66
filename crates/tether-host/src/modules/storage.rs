// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `Storage`: an in-memory key/value store. Values are arbitrary JSON.
//
// Async methods run on the module workers; `get` also has a sync form for
// reads during startup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use tether_core::error::Result;
use tether_runtime::{ModuleCallback, ModuleContext, NativeModule};

use super::{method_not_found, string_arg};

type Store = Arc<RwLock<HashMap<String, Value>>>;

#[derive(Default)]
pub struct Storage {
    entries: Store,
}

fn get(store: &Store, key: &str) -> Value {
    let entries = store.read().unwrap_or_else(|e| e.into_inner());
    entries.get(key).cloned().unwrap_or(Value::Null)
}

fn set(store: &Store, key: String, value: Value) -> Value {
    let mut entries = store.write().unwrap_or_else(|e| e.into_inner());
    entries.insert(key, value).unwrap_or(Value::Null)
}

fn remove(store: &Store, key: &str) -> bool {
    let mut entries = store.write().unwrap_or_else(|e| e.into_inner());
    entries.remove(key).is_some()
}

impl Storage {
    fn run(&self, method: &str, args: &[Value]) -> Result<Value> {
        match method {
            "get" => {
                let key = string_arg(args, 0, "key")?;
                Ok(get(&self.entries, &key))
            }
            "set" => {
                let key = string_arg(args, 0, "key")?;
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                Ok(set(&self.entries, key, value))
            }
            "remove" => {
                let key = string_arg(args, 0, "key")?;
                Ok(Value::Bool(remove(&self.entries, &key)))
            }
            other => Err(method_not_found("Storage", other)),
        }
    }
}

impl NativeModule for Storage {
    fn name(&self) -> &str {
        "Storage"
    }

    fn invoke(&self, method: &str, args: Vec<Value>, callback: ModuleCallback, ctx: &ModuleContext) {
        // Validate on the caller's thread so bad arguments fail fast.
        if !matches!(method, "get" | "set" | "remove") {
            callback.reject(method_not_found("Storage", method));
            return;
        }
        if let Err(err) = string_arg(&args, 0, "key") {
            callback.reject(err);
            return;
        }

        let storage = Storage {
            entries: self.entries.clone(),
        };
        let method = method.to_string();
        ctx.spawn(async move {
            callback.complete(storage.run(&method, &args));
        });
    }

    fn invoke_sync(&self, method: &str, args: &[Value], _ctx: &ModuleContext) -> Result<Value> {
        match method {
            "get" => self.run(method, args),
            other => Err(method_not_found("Storage", other)),
        }
    }

    fn teardown(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        debug!(entries = entries.len(), "storage cleared");
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::test_support::{call, registry, worker};
    use serde_json::json;
    use tether_core::error::TetherError;

    #[test]
    fn set_get_remove() {
        let rt = worker();
        let modules = registry(&rt);
        modules.register(Arc::new(Storage::default()));

        let previous = call(&modules, "Storage", "set", vec![json!("theme"), json!({ "dark": true })])
            .expect("set");
        assert_eq!(previous, Value::Null);
        assert_eq!(
            call(&modules, "Storage", "get", vec![json!("theme")]).expect("get"),
            json!({ "dark": true })
        );
        assert_eq!(
            modules.invoke_sync("Storage", "get", &[json!("theme")]).expect("sync get"),
            json!({ "dark": true })
        );

        assert_eq!(call(&modules, "Storage", "remove", vec![json!("theme")]).expect("remove"), json!(true));
        assert_eq!(call(&modules, "Storage", "remove", vec![json!("theme")]).expect("remove"), json!(false));
        assert_eq!(call(&modules, "Storage", "get", vec![json!("theme")]).expect("get"), Value::Null);
    }

    #[test]
    fn key_must_be_a_string() {
        let rt = worker();
        let modules = registry(&rt);
        modules.register(Arc::new(Storage::default()));

        let err = call(&modules, "Storage", "get", vec![json!(3)]).expect_err("bad key");
        assert!(matches!(err, TetherError::InvalidArguments(_)));
        assert!(modules.invoke_sync("Storage", "set", &[json!("k"), json!(1)]).is_err());
    }

    #[test]
    fn teardown_clears_entries() {
        let storage = Storage::default();
        set(&storage.entries, "k".into(), json!(1));
        storage.teardown();
        assert_eq!(get(&storage.entries, "k"), Value::Null);
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `Device`: facts about the host platform.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use tether_core::error::Result;
use tether_runtime::{ModuleCallback, ModuleContext, NativeModule};

use super::method_not_found;

pub struct Device {
    platform: String,
    started_at: DateTime<Utc>,
}

impl Device {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            started_at: Utc::now(),
        }
    }

    fn info(&self) -> Value {
        json!({
            "platform": self.platform,
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "family": std::env::consts::FAMILY,
            "startedAt": self.started_at.to_rfc3339(),
            "uptimeMs": (Utc::now() - self.started_at).num_milliseconds(),
        })
    }
}

impl NativeModule for Device {
    fn name(&self) -> &str {
        "Device"
    }

    fn invoke(&self, method: &str, _args: Vec<Value>, callback: ModuleCallback, ctx: &ModuleContext) {
        match method {
            "info" => {
                let info = self.info();
                ctx.spawn(async move {
                    callback.resolve(info);
                });
            }
            "platform" => {
                callback.resolve(Value::from(self.platform.as_str()));
            }
            other => {
                callback.reject(method_not_found("Device", other));
            }
        }
    }

    fn invoke_sync(&self, method: &str, _args: &[Value], _ctx: &ModuleContext) -> Result<Value> {
        match method {
            "platform" => Ok(Value::from(self.platform.as_str())),
            other => Err(method_not_found("Device", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::test_support::{call, registry, worker};
    use std::sync::Arc;
    use tether_core::error::TetherError;

    #[test]
    fn platform_sync_and_async() {
        let rt = worker();
        let modules = registry(&rt);
        modules.register(Arc::new(Device::new("headless")));

        let sync = modules.invoke_sync("Device", "platform", &[]).expect("sync");
        assert_eq!(sync, json!("headless"));
        let info = call(&modules, "Device", "info", vec![]).expect("info");
        assert_eq!(info["platform"], "headless");
        assert_eq!(info["os"], std::env::consts::OS);
        assert!(info["startedAt"].is_string());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let rt = worker();
        let modules = registry(&rt);
        modules.register(Arc::new(Device::new("headless")));

        let err = call(&modules, "Device", "battery", vec![]).expect_err("unknown");
        assert!(matches!(err, TetherError::MethodNotFound { method, .. } if method == "battery"));
        assert!(modules.invoke_sync("Device", "battery", &[]).is_err());
    }
}

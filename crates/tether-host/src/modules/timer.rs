// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `Timer`: `delay(ms)` resolves after `ms` milliseconds.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::debug;

use tether_core::error::TetherError;
use tether_runtime::{ModuleCallback, ModuleContext, NativeModule};

use super::method_not_found;

/// Longest accepted delay (one day).
const MAX_DELAY_MS: u64 = 86_400_000;

#[derive(Default)]
pub struct Timer {
    pending: Mutex<Vec<JoinHandle<()>>>,
}

fn delay_arg(args: &[Value]) -> Result<u64, TetherError> {
    match args.first().and_then(Value::as_u64) {
        Some(ms) if ms <= MAX_DELAY_MS => Ok(ms),
        _ => Err(TetherError::InvalidArguments(format!(
            "delay takes milliseconds between 0 and {MAX_DELAY_MS}"
        ))),
    }
}

impl NativeModule for Timer {
    fn name(&self) -> &str {
        "Timer"
    }

    fn invoke(&self, method: &str, args: Vec<Value>, callback: ModuleCallback, ctx: &ModuleContext) {
        if method != "delay" {
            callback.reject(method_not_found("Timer", method));
            return;
        }
        let ms = match delay_arg(&args) {
            Ok(ms) => ms,
            Err(err) => {
                callback.reject(err);
                return;
            }
        };

        let started = Instant::now();
        let handle = ctx.spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            let elapsed = started.elapsed().as_millis() as u64;
            callback.resolve(json!({ "elapsedMs": elapsed }));
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    fn teardown(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let cancelled = pending.len();
        for handle in pending.drain(..) {
            handle.abort();
        }
        debug!(cancelled, "timers cancelled");
    }
}

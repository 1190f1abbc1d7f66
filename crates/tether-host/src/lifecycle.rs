// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application lifecycle events fed onto the global event bus.

use chrono::Utc;
use serde_json::{Value, json};

use tether_runtime::BusHandle;

pub const BRIDGE_READY: &str = "bridgeReady";
pub const APP_STATE_CHANGE: &str = "appStateChange";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Active,
    Background,
}

impl AppState {
    pub fn as_str(self) -> &'static str {
        match self {
            AppState::Active => "active",
            AppState::Background => "background",
        }
    }
}

fn stamped(mut payload: Value) -> Value {
    if let Some(fields) = payload.as_object_mut() {
        fields.insert("at".into(), Value::from(Utc::now().to_rfc3339()));
    }
    payload
}

pub fn bridge_ready(bus: &BusHandle, platform: &str, session: &str) {
    bus.emit(
        BRIDGE_READY,
        stamped(json!({ "platform": platform, "sid": session })),
    );
}

pub fn app_state(bus: &BusHandle, state: AppState) {
    bus.emit(APP_STATE_CHANGE, stamped(json!({ "state": state.as_str() })));
}

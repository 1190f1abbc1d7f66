// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec::DEFAULT_FRAME_CAP;
use crate::error::{Result, TetherError};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "TETHER_CONFIG";

/// Runtime settings for one bridge instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Worker threads for native-module work (network, file I/O, timers).
    pub module_worker_threads: usize,
    /// How long shutdown waits for in-flight module work.
    pub shutdown_timeout_ms: u64,
    /// Ask the script side for a full redraw when a batch skips operations.
    pub resync_on_drift: bool,
    /// Largest inbound frame accepted from the script side.
    pub max_inbound_frame: usize,
    /// Largest outbound frame written to the script side.
    pub max_outbound_frame: usize,
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Session id echoed in the `ready` envelope.
    pub session: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            module_worker_threads: 2,
            shutdown_timeout_ms: 2_000,
            resync_on_drift: true,
            max_inbound_frame: DEFAULT_FRAME_CAP,
            max_outbound_frame: DEFAULT_FRAME_CAP,
            log_filter: "info".into(),
            session: "S1".into(),
        }
    }
}

impl BridgeConfig {
    /// Read a JSON config file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| TetherError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the file named by `TETHER_CONFIG`, then `TETHER_*`
    /// overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::load(path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `TETHER_*` overrides from `lookup`. Unparseable values are
    /// ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("TETHER_MODULE_WORKERS") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => self.module_worker_threads = n,
                _ => warn!(value = %raw, "ignoring invalid TETHER_MODULE_WORKERS"),
            }
        }
        if let Some(raw) = lookup("TETHER_RESYNC_ON_DRIFT") {
            match raw.as_str() {
                "1" | "true" | "yes" => self.resync_on_drift = true,
                "0" | "false" | "no" => self.resync_on_drift = false,
                _ => warn!(value = %raw, "ignoring invalid TETHER_RESYNC_ON_DRIFT"),
            }
        }
        if let Some(raw) = lookup("TETHER_LOG") {
            if !raw.is_empty() {
                self.log_filter = raw;
            }
        }
        if let Some(raw) = lookup("TETHER_SESSION") {
            if !raw.is_empty() {
                self.session = raw;
            }
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.module_worker_threads == 0 {
            return Err(TetherError::Config(
                "module_worker_threads must be at least 1".into(),
            ));
        }
        if self.max_inbound_frame == 0 || self.max_outbound_frame == 0 {
            return Err(TetherError::Config("frame caps must be non-zero".into()));
        }
        Ok(())
    }
}

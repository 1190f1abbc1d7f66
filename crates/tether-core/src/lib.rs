// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tether — Core types, wire protocol and error definitions shared across all
// crates.

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::BridgeConfig;
pub use error::TetherError;
pub use protocol::{BridgeEnvelope, Operation, ScriptEnvelope};
pub use types::*;

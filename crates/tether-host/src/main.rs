// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tether — stdio bridge host
//
// Entry point. Loads configuration, initialises logging on stderr (stdout is
// the protocol channel), starts the runtime on the native platform, installs
// the reference modules and serves framed envelopes until end of input.

mod host;
mod lifecycle;
mod modules;

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tether_core::config::BridgeConfig;
use tether_core::error::Result;
use tether_platform::native_platform;
use tether_runtime::BridgeRuntime;

use host::ServeSummary;

fn init_tracing(fallback: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: BridgeConfig) -> Result<ServeSummary> {
    let platform = native_platform()?;
    let (runtime, outbound) = BridgeRuntime::start(platform, config)?;
    modules::install(&runtime);
    info!(modules = ?runtime.modules().names(), "native modules installed");

    host::serve(runtime, outbound, std::io::stdin().lock(), std::io::stdout())
}

fn main() -> ExitCode {
    let config = BridgeConfig::from_env();
    let filter = config
        .as_ref()
        .map(|c| c.log_filter.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_tracing(&filter);

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(session = %config.session, "Tether host starting");
    match run(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "bridge host failed");
            ExitCode::FAILURE
        }
    }
}

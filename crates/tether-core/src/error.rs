// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Tether.

use thiserror::Error;

use crate::types::NodeId;

/// Top-level error type for all bridge operations.
///
/// None of these are fatal to the bridge: operation failures are logged and
/// skipped, module failures travel back to the script side as error values.
#[derive(Debug, Error)]
pub enum TetherError {
    // -- Operation protocol --
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("node {0} is not in the registry")]
    UnresolvedNode(NodeId),

    #[error("node {0} is already live")]
    DuplicateIdentifier(NodeId),

    #[error("no factory registered for component type '{0}'")]
    UnknownComponent(String),

    // -- Native modules --
    #[error("native module '{0}' is not registered")]
    ModuleNotFound(String),

    #[error("native module '{module}' has no method '{method}'")]
    MethodNotFound { module: String, method: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("callback fired after its owner was torn down")]
    StaleCallback,

    // -- Threading --
    #[error("must not be called from {0}")]
    WrongThread(&'static str),

    #[error("UI dispatch failed: {0}")]
    Dispatch(String),

    // -- Platform toolkit --
    #[error("platform toolkit error: {0}")]
    Platform(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,

    // -- Configuration / transport --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TetherError {
    /// Whether this error only affects a single operation and the batch can
    /// carry on.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            TetherError::Protocol(_)
                | TetherError::UnresolvedNode(_)
                | TetherError::DuplicateIdentifier(_)
                | TetherError::UnknownComponent(_)
                | TetherError::InvalidArguments(_)
                | TetherError::Platform(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TetherError>;

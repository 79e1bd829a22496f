// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Ordercast.

use thiserror::Error;

use crate::types::TransportErrorKind;

/// Top-level error type for all Ordercast operations.
#[derive(Debug, Error)]
pub enum OrdercastError {
    // -- Boundary validation --
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown location '{0}'")]
    InvalidLocation(String),

    // -- Printing --
    #[error("{transport} {kind}: {detail}")]
    Transport {
        transport: String,
        kind: TransportErrorKind,
        detail: String,
    },

    #[error("all printer transports failed: {0}")]
    AllTransportsFailed(String),

    // -- Notification server --
    #[error("notification server error: {0}")]
    Server(String),

    #[error("order announcement failed: {0}")]
    Announce(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrdercastError {
    /// Whether the error was caused by the caller's input (4xx territory).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidLocation(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OrdercastError>;

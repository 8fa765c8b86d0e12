// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the rate guard.

use thiserror::Error;

/// Errors raised by [`RateGuard`](crate::guard::RateGuard) operations.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Failures while loading or saving guard state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed state under key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GuardError>;

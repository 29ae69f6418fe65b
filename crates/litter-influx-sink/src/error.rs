// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write and transport errors.

use thiserror::Error;

/// Failure talking to the database over the wire.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// Whether resending the same payload may succeed.
    ///
    /// Network failures, 429 and 5xx responses are retryable. Other 4xx
    /// responses (bad auth, malformed line protocol) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Client(_) => false,
            TransportError::Request(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            TransportError::Client(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Asynchronous write failure, delivered on the error channel.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot encode point for '{measurement}': {reason}")]
    Encode { measurement: String, reason: String },

    #[error("failed to write {lines} lines after {attempts} attempts: {source}")]
    Transport {
        lines: usize,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("write API is closed")]
    Closed,
}

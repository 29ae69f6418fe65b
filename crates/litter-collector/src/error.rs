// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collector errors.

use crate::config::ConfigError;
use crate::device::ApiError;
use litter_influx_sink::TransportError;
use thiserror::Error;

/// Errors that stop or interrupt collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to authenticate to device API: {0}")]
    Auth(#[source] ApiError),

    #[error("failed to refresh device API session: {0}")]
    AuthRefresh(#[source] ApiError),

    #[error("failed to fetch robots from device API: {0}")]
    Fetch(#[source] ApiError),

    #[error("failed to connect to time-series database: {0}")]
    Connect(#[source] TransportError),
}

impl CollectorError {
    /// Whether the process has to stop.
    ///
    /// Startup failures always are. In-loop refresh and fetch failures are
    /// fatal only when the underlying API error is permanent.
    pub fn is_fatal(&self) -> bool {
        match self {
            CollectorError::Config(_) | CollectorError::Auth(_) | CollectorError::Connect(_) => {
                true
            }
            CollectorError::AuthRefresh(e) | CollectorError::Fetch(e) => !e.is_transient(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;

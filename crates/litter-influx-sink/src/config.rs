// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection and buffering options for the write API.

use std::time::Duration;

/// Default number of lines per batch before a size-triggered flush.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Default flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of resend attempts for a failed batch.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first resend; doubles on every attempt.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the asynchronous error channel.
pub const DEFAULT_ERROR_CAPACITY: usize = 64;

/// Where points are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Server URL (e.g., "http://localhost:8086").
    pub address: String,
    /// Organization (ignored by 1.x servers).
    pub organization: String,
    /// Bucket, or `database/retention_policy` for 1.x servers.
    pub bucket: String,
    /// Token, `username:password`, or empty for no authentication.
    pub auth: String,
    /// Skip TLS certificate verification.
    pub skip_verify_ssl: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Buffering behaviour of the background writer.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Lines per batch.
    pub batch_size: usize,
    /// Maximum time a line waits in the buffer.
    pub flush_interval: Duration,
    /// Resend attempts for a retryable failure.
    pub max_retries: u32,
    /// Delay before the first resend.
    pub retry_interval: Duration,
    /// Capacity of the error channel.
    pub error_capacity: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            error_capacity: DEFAULT_ERROR_CAPACITY,
        }
    }
}

impl WriteOptions {
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the flush interval; zero falls back to the default.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = if interval.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            interval
        };
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity.max(1);
        self
    }

    /// Delay before resend number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.retry_interval.saturating_mul(factor)
    }
}

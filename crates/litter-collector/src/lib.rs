// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Litter-Robot Stats Collector
//!
//! Periodically reads the state of every Litter-Robot on an account from the
//! cloud API and stores it as a time series in InfluxDB.
//!
//! # Features
//!
//! - **Drift-free polling** -- ticks start on a fixed schedule regardless of
//!   how long fetching takes
//! - **Session upkeep** -- the API token is refreshed before it expires
//! - **Transient/permanent errors** -- flaky calls are retried with backoff,
//!   rejected credentials stop the service
//! - **Buffered writes** -- points are batched and flushed in the background,
//!   with a final flush on shutdown
//!
//! # Architecture
//!
//! ```text
//! service
//! +-- SessionManager      (login, refresh one minute before expiry)
//! +-- PollLoop            (fetch -> normalize -> forward, every interval)
//! |   +-- WriteForwarder  (one point per robot, shared timestamp)
//! +-- ShutdownCoordinator (write error drain, final flush)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use litter_collector::{service, Configuration};
//!
//! let config = Configuration::from_file("config.yaml".as_ref())?;
//! service::run(config).await?;
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod forward;
pub mod normalize;
pub mod poll;
pub mod service;
pub mod session;
pub mod shutdown;
pub mod whisker;

pub use config::{Configuration, ConfigError, DeviceApiConfig, PollingConfig, TimeSeriesDbConfig};
pub use device::{ApiError, DeviceApi, DeviceState, MockDeviceApi, RobotState, SessionToken};
pub use error::{CollectorError, Result};
pub use forward::WriteForwarder;
pub use normalize::{normalize, NormalizedMeasurement, NAN_SENTINEL};
pub use poll::{sleep_duration, PollLoop, RetryPolicy, TickOutcome};
pub use session::{Session, SessionManager, REFRESH_MARGIN_SECS};
pub use shutdown::{termination_signal, ShutdownCoordinator};
pub use whisker::HttpDeviceApi;

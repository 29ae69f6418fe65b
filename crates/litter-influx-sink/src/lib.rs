// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Buffered InfluxDB writer
//!
//! Turns measurement points into InfluxDB Line Protocol and ships them to
//! the database from a background worker.
//!
//! This crate provides:
//! - A point builder with typed fields and nanosecond timestamps
//! - InfluxDB Line Protocol encoding
//! - Batching with size and time-based flushing
//! - An HTTP transport for the `/api/v2/write` endpoint
//! - Asynchronous write-error reporting over a bounded channel
//!
//! # Overview
//!
//! Enqueueing a point never waits on the network. Failures surface later on
//! the error channel returned by [`WriteApi::spawn`].
//!
//! ```text
//! Point --> WriteApi (channel) --> worker: BatchBuffer --> Transport --> InfluxDB
//!                                     |
//!                                     +--> WriteErrors (bounded channel)
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod influx;
pub mod transport;
pub mod write;

pub use config::{Destination, WriteOptions};
pub use error::{TransportError, WriteError};
pub use influx::{FieldValue, Point};
pub use transport::{HttpTransport, MemoryTransport, Transport};
pub use write::{PointWriter, WriteApi, WriteErrors};

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Measurement to InfluxDB point mapping.

use crate::normalize::NormalizedMeasurement;
use chrono::{DateTime, Utc};
use litter_influx_sink::{Point, PointWriter};

/// Builds one point per measurement and hands it to the write buffer.
pub struct WriteForwarder<W: PointWriter> {
    measurement: String,
    writer: W,
}

impl<W: PointWriter> WriteForwarder<W> {
    /// `measurement` is the full name, prefix included.
    pub fn new(measurement: impl Into<String>, writer: W) -> Self {
        Self {
            measurement: measurement.into(),
            writer,
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Enqueue every measurement with the shared `timestamp`.
    ///
    /// Returns the number of points enqueued. Does not wait for the
    /// database; failures show up on the write error channel.
    pub fn write_all(&self, measurements: &[NormalizedMeasurement], timestamp: DateTime<Utc>) -> usize {
        for m in measurements {
            tracing::debug!(
                robot_id = %m.device_id,
                robot_name = %m.display_name,
                cycles = m.cycle_count,
                unit_status = m.unit_status,
                "Forwarding robot state"
            );
            self.writer.write_point(self.to_point(m, timestamp));
        }
        measurements.len()
    }

    /// Map one measurement to a point.
    pub fn to_point(&self, m: &NormalizedMeasurement, timestamp: DateTime<Utc>) -> Point {
        Point::new(self.measurement.as_str())
            .tag("robot_id", m.device_id.as_str())
            .tag("robot_serial", m.serial_id.as_str())
            .tag("robot_name", m.display_name.as_str())
            .field("clean_cycle_wait_time_minutes", m.clean_cycle_wait_minutes)
            .field("cycles_after_drawer_full", m.cycles_after_drawer_full)
            .field("cycles_capacity", m.cycle_capacity)
            .field("cycles_count", m.cycle_count)
            .field("cycles_until_full", m.cycles_until_full)
            .field("did_notify_offline", m.did_notify_offline)
            .field("dfi_cycle_count", m.dfi_cycle_count)
            .field("dfi_triggered", m.dfi_triggered)
            .field("night_light_active", m.night_light_active)
            .field("panel_lock_active", m.panel_lock_active)
            .field("power_status", m.power_status.as_str())
            .field("sleep_mode_active", m.sleep_mode_active)
            .field("unit_status", m.unit_status)
            .timestamp(timestamp)
    }
}

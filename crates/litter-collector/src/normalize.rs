// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw robot state to canonical measurement conversion.

use crate::device::DeviceState;
use serde::Serialize;

/// Integer written in place of a counter the cloud reported as NaN.
pub const NAN_SENTINEL: i64 = -1;

/// One robot's state with fixed field types, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedMeasurement {
    pub serial_id: String,
    pub display_name: String,
    pub device_id: String,
    pub power_status: String,
    pub cycle_count: i64,
    pub cycles_until_full: i64,
    pub dfi_cycle_count: i64,
    pub cycles_after_drawer_full: i64,
    pub cycle_capacity: i64,
    pub clean_cycle_wait_minutes: i64,
    pub unit_status: i64,
    pub dfi_triggered: bool,
    pub night_light_active: bool,
    pub panel_lock_active: bool,
    pub did_notify_offline: bool,
    pub sleep_mode_active: bool,
}

/// Convert a raw robot state. Total: never fails, whatever the input.
pub fn normalize<S: DeviceState + ?Sized>(raw: &S) -> NormalizedMeasurement {
    NormalizedMeasurement {
        serial_id: raw.serial().to_string(),
        display_name: raw.name().to_string(),
        device_id: raw.device_id().to_string(),
        power_status: raw.power_status().to_string(),
        cycle_count: float_to_int(raw.cycle_count()),
        cycles_until_full: float_to_int(raw.cycles_until_full()),
        dfi_cycle_count: float_to_int(raw.dfi_cycle_count()),
        cycles_after_drawer_full: float_to_int(raw.cycles_after_drawer_full()),
        cycle_capacity: float_to_int(raw.cycle_capacity()),
        clean_cycle_wait_minutes: float_to_int(raw.clean_cycle_wait_minutes()),
        unit_status: float_to_int(raw.unit_status()),
        dfi_triggered: raw.dfi_triggered(),
        night_light_active: raw.night_light_active(),
        panel_lock_active: raw.panel_lock_active(),
        did_notify_offline: raw.did_notify_offline(),
        sleep_mode_active: raw.sleep_mode_active(),
    }
}

/// NaN becomes [`NAN_SENTINEL`]; anything else truncates toward zero.
///
/// Infinities and values beyond the `i64` range saturate.
pub fn float_to_int(f: f64) -> i64 {
    if f.is_nan() {
        NAN_SENTINEL
    } else {
        f as i64
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device API abstraction
//!
//! The collector talks to the device cloud only through [`DeviceApi`], and
//! normalizes anything implementing [`DeviceState`]. A different upstream
//! client only has to implement these two traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a device API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("credentials rejected: {0}")]
    Unauthorized(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the same call may succeed if retried later.
    ///
    /// Network failures, garbled responses, 429 and 5xx are transient.
    /// Rejected credentials and other 4xx responses are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) | ApiError::Decode(_) => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Unauthorized(_) => false,
        }
    }
}

/// Credential handed out by the device cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Account the robots belong to, when the API needs it for lookups.
    pub account_id: Option<String>,
    /// Instant the access token stops being accepted.
    pub expiry: DateTime<Utc>,
}

/// Raw state of one robot as reported by the device cloud.
///
/// Counters are floating-point and may be NaN when the upstream value is
/// missing or unparseable.
pub trait DeviceState {
    fn serial(&self) -> &str;
    fn name(&self) -> &str;
    fn device_id(&self) -> &str;
    fn power_status(&self) -> &str;

    fn cycle_count(&self) -> f64;
    fn cycles_until_full(&self) -> f64;
    fn dfi_cycle_count(&self) -> f64;
    fn cycles_after_drawer_full(&self) -> f64;
    fn cycle_capacity(&self) -> f64;
    fn clean_cycle_wait_minutes(&self) -> f64;
    fn unit_status(&self) -> f64;

    fn dfi_triggered(&self) -> bool;
    fn night_light_active(&self) -> bool;
    fn panel_lock_active(&self) -> bool;
    fn did_notify_offline(&self) -> bool;
    fn sleep_mode_active(&self) -> bool;
}

/// Plain owned robot state.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    pub serial: String,
    pub name: String,
    pub device_id: String,
    pub power_status: String,
    pub cycle_count: f64,
    pub cycles_until_full: f64,
    pub dfi_cycle_count: f64,
    pub cycles_after_drawer_full: f64,
    pub cycle_capacity: f64,
    pub clean_cycle_wait_minutes: f64,
    pub unit_status: f64,
    pub dfi_triggered: bool,
    pub night_light_active: bool,
    pub panel_lock_active: bool,
    pub did_notify_offline: bool,
    pub sleep_mode_active: bool,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            serial: String::new(),
            name: String::new(),
            device_id: String::new(),
            power_status: String::new(),
            cycle_count: f64::NAN,
            cycles_until_full: f64::NAN,
            dfi_cycle_count: f64::NAN,
            cycles_after_drawer_full: f64::NAN,
            cycle_capacity: f64::NAN,
            clean_cycle_wait_minutes: f64::NAN,
            unit_status: f64::NAN,
            dfi_triggered: false,
            night_light_active: false,
            panel_lock_active: false,
            did_notify_offline: false,
            sleep_mode_active: false,
        }
    }
}

impl DeviceState for RobotState {
    fn serial(&self) -> &str {
        &self.serial
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn device_id(&self) -> &str {
        &self.device_id
    }
    fn power_status(&self) -> &str {
        &self.power_status
    }
    fn cycle_count(&self) -> f64 {
        self.cycle_count
    }
    fn cycles_until_full(&self) -> f64 {
        self.cycles_until_full
    }
    fn dfi_cycle_count(&self) -> f64 {
        self.dfi_cycle_count
    }
    fn cycles_after_drawer_full(&self) -> f64 {
        self.cycles_after_drawer_full
    }
    fn cycle_capacity(&self) -> f64 {
        self.cycle_capacity
    }
    fn clean_cycle_wait_minutes(&self) -> f64 {
        self.clean_cycle_wait_minutes
    }
    fn unit_status(&self) -> f64 {
        self.unit_status
    }
    fn dfi_triggered(&self) -> bool {
        self.dfi_triggered
    }
    fn night_light_active(&self) -> bool {
        self.night_light_active
    }
    fn panel_lock_active(&self) -> bool {
        self.panel_lock_active
    }
    fn did_notify_offline(&self) -> bool {
        self.did_notify_offline
    }
    fn sleep_mode_active(&self) -> bool {
        self.sleep_mode_active
    }
}

/// Abstract device cloud client.
///
/// Implementations hold no session state of their own: the token is owned
/// by the session manager and passed into every call.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Robot record type returned by [`DeviceApi::fetch_states`].
    type State: DeviceState + Send;

    /// Authenticate with the configured credentials.
    async fn login(&self) -> Result<SessionToken, ApiError>;

    /// Exchange a session for a fresh one.
    async fn refresh(&self, session: &SessionToken) -> Result<SessionToken, ApiError>;

    /// Current state of every robot on the account.
    async fn fetch_states(&self, session: &SessionToken) -> Result<Vec<Self::State>, ApiError>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// In-memory device API for running the collector without the cloud.
///
/// Serves a fixed robot list, hands out tokens valid for `token_lifetime`,
/// and replays queued errors before succeeding again.
pub struct MockDeviceApi {
    robots: Mutex<Vec<RobotState>>,
    fetch_errors: Mutex<VecDeque<ApiError>>,
    refresh_errors: Mutex<VecDeque<ApiError>>,
    fetch_delay: Mutex<Duration>,
    token_lifetime: chrono::Duration,
    logins: AtomicU32,
    refreshes: AtomicU32,
    fetch_starts: Mutex<Vec<tokio::time::Instant>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockDeviceApi {
    /// Create a mock serving `robots`, with one-hour tokens.
    pub fn new(robots: Vec<RobotState>) -> Self {
        Self {
            robots: Mutex::new(robots),
            fetch_errors: Mutex::new(VecDeque::new()),
            refresh_errors: Mutex::new(VecDeque::new()),
            fetch_delay: Mutex::new(Duration::ZERO),
            token_lifetime: chrono::Duration::hours(1),
            logins: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
            fetch_starts: Mutex::new(Vec::new()),
        }
    }

    /// Issue tokens that expire `lifetime` after they are handed out.
    pub fn with_token_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Replace the robot list.
    pub fn set_robots(&self, robots: Vec<RobotState>) {
        *lock(&self.robots) = robots;
    }

    /// Make the next fetch fail with `error`. Errors queue up.
    pub fn fail_fetch(&self, error: ApiError) {
        lock(&self.fetch_errors).push_back(error);
    }

    /// Make the next refresh fail with `error`. Errors queue up.
    pub fn fail_refresh(&self, error: ApiError) {
        lock(&self.refresh_errors).push_back(error);
    }

    /// Simulated latency of every fetch.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *lock(&self.fetch_delay) = delay;
    }

    pub fn login_count(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.fetch_starts).len()
    }

    /// Monotonic start time of every fetch call.
    pub fn fetch_starts(&self) -> Vec<tokio::time::Instant> {
        lock(&self.fetch_starts).clone()
    }

    fn issue(&self, access_token: String) -> SessionToken {
        SessionToken {
            access_token,
            refresh_token: Some("mock-refresh".to_string()),
            account_id: Some("mock-account".to_string()),
            expiry: Utc::now() + self.token_lifetime,
        }
    }
}

impl Default for MockDeviceApi {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl DeviceApi for MockDeviceApi {
    type State = RobotState;

    async fn login(&self) -> Result<SessionToken, ApiError> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.issue(format!("mock-login-{}", n)))
    }

    async fn refresh(&self, _session: &SessionToken) -> Result<SessionToken, ApiError> {
        if let Some(err) = lock(&self.refresh_errors).pop_front() {
            return Err(err);
        }
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.issue(format!("mock-refresh-{}", n)))
    }

    async fn fetch_states(&self, _session: &SessionToken) -> Result<Vec<RobotState>, ApiError> {
        lock(&self.fetch_starts).push(tokio::time::Instant::now());
        let delay = *lock(&self.fetch_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = lock(&self.fetch_errors).pop_front() {
            return Err(err);
        }
        Ok(lock(&self.robots).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ApiError::Transport("timed out".into()).is_transient());
        assert!(ApiError::Decode("eof".into()).is_transient());
        assert!(ApiError::Status {
            status: 502,
            body: String::new()
        }
        .is_transient());
        assert!(ApiError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!ApiError::Status {
            status: 404,
            body: String::new()
        }
        .is_transient());
        assert!(!ApiError::Unauthorized("bad password".into()).is_transient());
    }

    #[tokio::test]
    async fn test_mock_replays_errors_then_succeeds() {
        let api = MockDeviceApi::new(vec![RobotState::default()]);
        api.fail_fetch(ApiError::Transport("reset".into()));

        let token = api.login().await.unwrap();
        assert!(api.fetch_states(&token).await.is_err());
        assert_eq!(api.fetch_states(&token).await.unwrap().len(), 1);
        assert_eq!(api.fetch_count(), 2);
        assert_eq!(api.login_count(), 1);
    }

    #[test]
    fn test_default_robot_state_counters_are_nan() {
        let state = RobotState::default();
        assert!(state.cycle_count().is_nan());
        assert!(state.unit_status().is_nan());
        assert!(!state.sleep_mode_active());
    }
}

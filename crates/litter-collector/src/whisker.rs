// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP client for the Litter-Robot 3 cloud API
//!
//! Authentication is an OAuth2 password grant against the token endpoint,
//! renewed with the refresh grant. Robot records are read from
//! `GET <api_url>/users/<account>/robots`.
//!
//! The API reports most numbers as strings. Anything that does not parse
//! becomes NaN, which the normalizer turns into the sentinel value.

use crate::config::DeviceApiConfig;
use crate::device::{ApiError, DeviceApi, RobotState, SessionToken};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Unit status codes in the order the collector numbers them.
///
/// The written `unit_status` field is the index into this table.
pub const UNIT_STATUS_CODES: &[&str] = &[
    "RDY", // ready
    "CCP", // clean cycle in progress
    "CCC", // clean cycle complete
    "CSF", // cat sensor fault
    "DF1", // drawer almost full
    "DF2", // drawer almost full
    "CST", // cat sensor timing
    "CSI", // cat sensor interrupted
    "BR",  // bonnet removed
    "P",   // paused
    "OFF", // off
    "SDF", // drawer full at startup
    "DFS", // drawer full
];

/// Token lifetime assumed when the endpoint does not report one.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Reported lifetimes are clamped to a year.
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: UserRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    user_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RobotRecord {
    litter_robot_id: String,
    litter_robot_serial: String,
    litter_robot_nickname: String,
    power_status: String,
    unit_status: String,
    cycle_count: Value,
    cycle_capacity: Value,
    cycles_after_drawer_full: Value,
    #[serde(rename = "DFICycleCount")]
    dfi_cycle_count: Value,
    #[serde(rename = "DFITriggered")]
    dfi_triggered: Value,
    clean_cycle_wait_time_minutes: Value,
    night_light_active: Value,
    panel_lock_active: Value,
    did_notify_offline: Value,
    sleep_mode_active: Value,
}

impl From<RobotRecord> for RobotState {
    fn from(r: RobotRecord) -> Self {
        let cycle_count = parse_counter(&r.cycle_count);
        let cycle_capacity = parse_counter(&r.cycle_capacity);

        RobotState {
            serial: r.litter_robot_serial,
            name: r.litter_robot_nickname,
            device_id: r.litter_robot_id,
            power_status: r.power_status,
            cycle_count,
            cycles_until_full: cycle_capacity - cycle_count,
            dfi_cycle_count: parse_counter(&r.dfi_cycle_count),
            cycles_after_drawer_full: parse_counter(&r.cycles_after_drawer_full),
            cycle_capacity,
            clean_cycle_wait_minutes: parse_hex_minutes(&r.clean_cycle_wait_time_minutes),
            unit_status: unit_status_index(&r.unit_status),
            dfi_triggered: parse_flag(&r.dfi_triggered),
            night_light_active: parse_flag(&r.night_light_active),
            panel_lock_active: parse_flag(&r.panel_lock_active),
            did_notify_offline: parse_flag(&r.did_notify_offline),
            sleep_mode_active: parse_sleep_mode(&r.sleep_mode_active),
        }
    }
}

/// Decimal counter, sent as a string or a number.
fn parse_counter(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Clean cycle wait time, a hexadecimal string ("7", "f", "0F").
fn parse_hex_minutes(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => i64::from_str_radix(s.trim(), 16)
            .map(|m| m as f64)
            .unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn unit_status_index(code: &str) -> f64 {
    UNIT_STATUS_CODES
        .iter()
        .position(|c| c.eq_ignore_ascii_case(code.trim()))
        .map(|i| i as f64)
        .unwrap_or(f64::NAN)
}

/// `"1"`, `1` or `true`.
fn parse_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => s.trim() == "1",
        _ => false,
    }
}

/// The first character carries the flag; the rest is the sleep schedule.
fn parse_sleep_mode(value: &Value) -> bool {
    match value {
        Value::String(s) => s.starts_with('1'),
        other => parse_flag(other),
    }
}

/// [`DeviceApi`] backed by the Litter-Robot 3 cloud.
pub struct HttpDeviceApi {
    client: reqwest::Client,
    config: DeviceApiConfig,
}

impl HttpDeviceApi {
    /// Build the HTTP client. No request is made.
    pub fn new(config: DeviceApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn request_token(&self, grant: &[(&str, &str)]) -> Result<TokenResponse, ApiError> {
        let mut form: Vec<(&str, &str)> = grant.to_vec();
        if let Some(id) = &self.config.client_id {
            form.push(("client_id", id.as_str()));
        }
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, access_token: &str) -> Result<T, ApiError> {
        let mut request = self.client.get(self.endpoint(path)).bearer_auth(access_token);
        if let Some(key) = &self.config.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.send().await.map_err(transport_error)?;
        decode(response).await
    }

    async fn account_id(&self, access_token: &str) -> Result<String, ApiError> {
        let response: UserResponse = self.get("/users", access_token).await?;
        Ok(response.user.user_id)
    }

    fn session(token: TokenResponse, account_id: Option<String>) -> SessionToken {
        let lifetime = token
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
            .clamp(0, MAX_TOKEN_LIFETIME_SECS);
        SessionToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            account_id,
            expiry: Utc::now() + Duration::seconds(lifetime),
        }
    }
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    type State = RobotState;

    async fn login(&self) -> Result<SessionToken, ApiError> {
        let token = self
            .request_token(&[
                ("grant_type", "password"),
                ("username", self.config.email.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .await?;
        let account_id = self.account_id(&token.access_token).await?;
        tracing::debug!(account_id = %account_id, "Logged in to device API");
        Ok(Self::session(token, Some(account_id)))
    }

    async fn refresh(&self, session: &SessionToken) -> Result<SessionToken, ApiError> {
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            tracing::debug!("No refresh token issued, logging in again");
            return self.login().await;
        };

        let mut token = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(Self::session(token, session.account_id.clone()))
    }

    async fn fetch_states(&self, session: &SessionToken) -> Result<Vec<RobotState>, ApiError> {
        let account_id = match &session.account_id {
            Some(id) => id.clone(),
            None => self.account_id(&session.access_token).await?,
        };
        let records: Vec<RobotRecord> = self
            .get(&format!("/users/{}/robots", account_id), &session.access_token)
            .await?;
        Ok(records.into_iter().map(RobotState::from).collect())
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized(body.trim().to_string()));
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

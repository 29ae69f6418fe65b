// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML configuration for the collector.
//!
//! ```yaml
//! deviceApi:
//!   email: user@example.com
//!   password: secret
//! timeSeriesDb:
//!   address: http://localhost:8086
//!   organization: home
//!   bucket: pets
//!   token: my-token
//! polling:
//!   intervalSeconds: 60
//! ```

use litter_influx_sink::{Destination, WriteOptions};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default OAuth token endpoint of the Litter-Robot cloud.
pub const DEFAULT_TOKEN_URL: &str = "https://autopets.sso.iothings.site/oauth/token";

/// Default Litter-Robot cloud API base URL.
pub const DEFAULT_API_URL: &str = "https://v2.api.whisker.iothings.site";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to decode config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("must configure at least one of bucket or database/retention policy")]
    WriteDestination,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level collector configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Device cloud credentials.
    #[serde(alias = "litterRobot", alias = "litterrobot", alias = "deviceapi")]
    pub device_api: DeviceApiConfig,

    /// Time-series database connection.
    #[serde(alias = "influxDB", alias = "influxdb", alias = "timeseriesdb")]
    pub time_series_db: TimeSeriesDbConfig,

    /// Polling cadence and retry policy.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Litter-Robot cloud account and endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceApiConfig {
    pub email: String,
    pub password: String,

    #[serde(default = "default_token_url", alias = "tokenurl")]
    pub token_url: String,

    #[serde(default = "default_api_url", alias = "apiurl")]
    pub api_url: String,

    /// Sent as `x-api-key` when set.
    #[serde(default, alias = "apikey")]
    pub api_key: Option<String>,

    #[serde(default, alias = "clientid")]
    pub client_id: Option<String>,

    #[serde(default, alias = "clientsecret")]
    pub client_secret: Option<String>,

    #[serde(default = "default_timeout_secs", alias = "timeoutseconds")]
    pub timeout_seconds: u64,
}

/// InfluxDB connection and buffering parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeSeriesDbConfig {
    pub address: String,
    pub username: String,
    pub password: String,
    #[serde(alias = "measurementprefix")]
    pub measurement_prefix: String,
    pub database: String,
    #[serde(alias = "retentionpolicy")]
    pub retention_policy: String,
    pub token: String,
    pub organization: String,
    pub bucket: String,
    #[serde(alias = "skipverifyssl")]
    pub skip_verify_ssl: bool,

    /// Seconds between buffer flushes (0 = default of 30).
    #[serde(
        alias = "flushInterval",
        alias = "flushinterval",
        alias = "flushintervalseconds"
    )]
    pub flush_interval_seconds: u64,

    /// Lines per write request (0 = default of 5000).
    #[serde(alias = "batchsize")]
    pub batch_size: usize,

    /// Resend attempts for a failed batch.
    #[serde(alias = "maxretries")]
    pub max_retries: Option<u32>,

    /// Seconds before the first resend (0 = default of 5).
    #[serde(alias = "retryintervalseconds")]
    pub retry_interval_seconds: u64,

    /// Per-request timeout in seconds (0 = default of 30).
    #[serde(alias = "timeoutseconds")]
    pub timeout_seconds: u64,
}

/// Polling parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    /// Seconds between the starts of two ticks.
    #[serde(
        default = "default_interval_secs",
        alias = "interval",
        alias = "intervalseconds"
    )]
    pub interval_seconds: u64,

    /// Retries for a transient refresh/fetch failure within one tick.
    #[serde(default = "default_max_retries", alias = "maxretries")]
    pub max_retries: u32,

    /// Initial backoff between retries, doubled each attempt.
    #[serde(default = "default_retry_backoff_secs", alias = "retrybackoffseconds")]
    pub retry_backoff_seconds: u64,

    /// Upper bound for the backoff.
    #[serde(default = "default_max_backoff_secs", alias = "maxbackoffseconds")]
    pub max_backoff_seconds: u64,
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_interval_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    1
}

fn default_max_backoff_secs() -> u64 {
    30
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_secs(),
            max_retries: default_max_retries(),
            retry_backoff_seconds: default_retry_backoff_secs(),
            max_backoff_seconds: default_max_backoff_secs(),
        }
    }
}

impl Configuration {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Configuration = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.time_series_db.write_destination()?;

        if self.time_series_db.address.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "timeSeriesDb.address cannot be empty".into(),
            ));
        }
        if self.device_api.email.trim().is_empty() {
            return Err(ConfigError::Invalid("deviceApi.email cannot be empty".into()));
        }
        if self.polling.interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "polling.intervalSeconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl DeviceApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

impl TimeSeriesDbConfig {
    /// Bucket name, or `database/retention_policy` for 1.x servers.
    pub fn write_destination(&self) -> Result<String, ConfigError> {
        if !self.bucket.is_empty() {
            Ok(self.bucket.clone())
        } else if !self.database.is_empty() && !self.retention_policy.is_empty() {
            Ok(format!("{}/{}", self.database, self.retention_policy))
        } else {
            Err(ConfigError::WriteDestination)
        }
    }

    /// Token, `username:password`, or empty when neither is configured.
    pub fn auth(&self) -> String {
        if !self.token.is_empty() {
            self.token.clone()
        } else if !self.username.is_empty() && !self.password.is_empty() {
            format!("{}:{}", self.username, self.password)
        } else {
            String::new()
        }
    }

    /// Full measurement name written for every robot.
    pub fn measurement(&self) -> String {
        format!("{}litter_robot", self.measurement_prefix)
    }

    pub fn destination(&self) -> Result<Destination, ConfigError> {
        Ok(Destination {
            address: self.address.clone(),
            organization: self.organization.clone(),
            bucket: self.write_destination()?,
            auth: self.auth(),
            skip_verify_ssl: self.skip_verify_ssl,
            timeout: Duration::from_secs(if self.timeout_seconds == 0 {
                default_timeout_secs()
            } else {
                self.timeout_seconds
            }),
        })
    }

    pub fn write_options(&self) -> WriteOptions {
        let mut options = WriteOptions::default()
            .flush_interval(Duration::from_secs(self.flush_interval_seconds));
        if self.batch_size > 0 {
            options = options.batch_size(self.batch_size);
        }
        if let Some(retries) = self.max_retries {
            options = options.max_retries(retries);
        }
        if self.retry_interval_seconds > 0 {
            options = options.retry_interval(Duration::from_secs(self.retry_interval_seconds));
        }
        options
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

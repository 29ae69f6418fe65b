// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Points and their InfluxDB Line Protocol form.
//!
//! ```text
//! litter_robot,robot_id=a0f3,robot_name=Upstairs cycles_count=12i,power_status="AC" 1700000000000000000
//! ```
//!
//! Tags and fields are written in key order so identical points always
//! encode to identical lines. Timestamps have nanosecond precision.

use crate::error::WriteError;
use chrono::{DateTime, Utc};
use std::fmt;

/// Typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    /// Written with the `i` suffix.
    Integer(i64),
    String(String),
    Boolean(bool),
}

impl FieldValue {
    /// Value as it appears after `key=` in a line.
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Integer(v) => format!("{v}i"),
            FieldValue::String(v) => {
                let mut quoted = String::with_capacity(v.len() + 2);
                quoted.push('"');
                push_escaped(&mut quoted, v, &['"', '\\']);
                quoted.push('"');
                quoted
            }
            FieldValue::Boolean(v) => v.to_string(),
        }
    }

    fn is_encodable(&self) -> bool {
        match self {
            FieldValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

/// A single timestamped measurement destined for InfluxDB.
///
/// ```ignore
/// let point = Point::new("litter_robot")
///     .tag("robot_id", "a0f3")
///     .field("cycles_count", 12i64)
///     .timestamp(Utc::now());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp: DateTime<Utc>,
}

impl Point {
    /// Start a point for `measurement`, stamped with the current time.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Add a tag (indexed, always a string).
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Add a typed field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Set the point timestamp.
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Look up a tag value by key.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a field value by key.
    pub fn field_value(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Encode this point as one Line Protocol line.
    ///
    /// Tags and fields are written sorted by key. Fails when the point has
    /// no fields, a float field is not finite, or the timestamp does not fit
    /// in signed nanoseconds since the Unix epoch.
    pub fn to_line_protocol(&self) -> Result<String, WriteError> {
        if self.fields.is_empty() {
            return Err(WriteError::Encode {
                measurement: self.measurement.clone(),
                reason: "InfluxDB requires at least one field".to_string(),
            });
        }
        if let Some((key, _)) = self.fields.iter().find(|(_, v)| !v.is_encodable()) {
            return Err(WriteError::Encode {
                measurement: self.measurement.clone(),
                reason: format!("field '{}' is not a finite number", key),
            });
        }
        let timestamp_ns = self
            .timestamp
            .timestamp_nanos_opt()
            .ok_or_else(|| WriteError::Encode {
                measurement: self.measurement.clone(),
                reason: format!("timestamp {} out of nanosecond range", self.timestamp),
            })?;

        let mut line = escape_measurement(&self.measurement);

        let mut sorted_tags: Vec<_> = self.tags.iter().collect();
        sorted_tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in sorted_tags {
            // Empty tag values are not valid Line Protocol.
            if value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }

        line.push(' ');

        let mut sorted_fields: Vec<_> = self.fields.iter().collect();
        sorted_fields.sort_by(|a, b| a.0.cmp(&b.0));
        for (i, (key, value)) in sorted_fields.into_iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&value.to_line_protocol());
        }

        line.push(' ');
        line.push_str(&timestamp_ns.to_string());

        Ok(line)
    }
}

fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

/// Tag keys, tag values and field keys.
fn escape_tag(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    push_escaped(&mut out, s, special);
    out
}

/// Line breaks are always escaped; a raw one would split the point.
fn push_escaped(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => {
                if special.contains(&c) {
                    out.push('\\');
                }
                out.push(c);
            }
        }
    }
}

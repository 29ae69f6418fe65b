// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery of Line Protocol batches to the database.

use crate::config::Destination;
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Sends a newline-separated Line Protocol body to the database.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn write(&self, body: &str) -> Result<(), TransportError>;
}

/// InfluxDB HTTP transport.
///
/// Uses the `/api/v2/write` endpoint, which 1.8+ servers also expose with
/// `database/retention_policy` as the bucket and `username:password` as the
/// token.
pub struct HttpTransport {
    client: reqwest::Client,
    destination: Destination,
}

impl HttpTransport {
    /// Build the HTTP client for `destination`. No request is made.
    pub fn new(destination: Destination) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(destination.timeout)
            .danger_accept_invalid_certs(destination.skip_verify_ssl)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            destination,
        })
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.destination.address.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.destination.auth.is_empty() {
            request
        } else {
            request.header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.destination.auth),
            )
        }
    }

    /// Check that the server is reachable.
    pub async fn ping(&self) -> Result<(), TransportError> {
        let response = self
            .authorize(self.client.get(self.endpoint("/ping")))
            .send()
            .await?;
        check_status(response).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn write(&self, body: &str) -> Result<(), TransportError> {
        let request = self
            .client
            .post(self.endpoint("/api/v2/write"))
            .query(&[
                ("org", self.destination.organization.as_str()),
                ("bucket", self.destination.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body.to_string());

        let response = self.authorize(request).send().await?;
        check_status(response).await
    }
}

/// In-memory transport for tests and dry runs.
///
/// Records every body it is given and replays queued failures first.
/// Clones share the same record.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    bodies: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<VecDeque<TransportError>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose first writes fail with `errors`, in order.
    pub fn failing_with(errors: Vec<TransportError>) -> Self {
        let transport = Self::default();
        transport.fail_next(errors);
        transport
    }

    /// Queue more failures.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = TransportError>) {
        lock(&self.failures).extend(errors);
    }

    /// Every line written so far, in order.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.bodies)
            .iter()
            .flat_map(|b| b.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    /// Number of successful write requests.
    pub fn requests(&self) -> usize {
        lock(&self.bodies).len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write(&self, body: &str) -> Result<(), TransportError> {
        if let Some(err) = lock(&self.failures).pop_front() {
            return Err(err);
        }
        lock(&self.bodies).push(body.to_string());
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

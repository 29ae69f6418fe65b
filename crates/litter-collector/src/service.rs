// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Startup sequence and task wiring.

use crate::config::{ConfigError, Configuration};
use crate::device::{ApiError, DeviceApi};
use crate::error::{CollectorError, Result};
use crate::forward::WriteForwarder;
use crate::poll::{PollLoop, RetryPolicy};
use crate::session::SessionManager;
use crate::shutdown::{termination_signal, ShutdownCoordinator};
use crate::whisker::HttpDeviceApi;
use litter_influx_sink::{HttpTransport, Transport, WriteApi};
use std::future::Future;
use std::sync::Arc;

/// Run the collector against the real device cloud and InfluxDB.
///
/// Returns `Ok` after a signal-triggered shutdown and `Err` on any startup
/// failure or permanent poll error.
pub async fn run(config: Configuration) -> Result<()> {
    let api = HttpDeviceApi::new(config.device_api.clone()).map_err(client_setup_error)?;
    run_with_api(config, api).await
}

/// A client that cannot be built is a local setup problem, not a login failure.
fn client_setup_error(e: ApiError) -> CollectorError {
    CollectorError::Config(ConfigError::Invalid(format!(
        "cannot build device API client: {}",
        e
    )))
}

/// Same as [`run`] with any device API, e.g. [`crate::MockDeviceApi`].
///
/// The configuration is validated before any network call.
pub async fn run_with_api<A: DeviceApi>(config: Configuration, api: A) -> Result<()> {
    config.validate()?;
    let destination = config.time_series_db.destination()?;

    let session = SessionManager::establish(Arc::new(api)).await?;

    let transport = HttpTransport::new(destination).map_err(CollectorError::Connect)?;
    transport.ping().await.map_err(CollectorError::Connect)?;
    tracing::info!(
        "Connected to time-series database at {} (destination {})",
        transport.destination().address,
        transport.destination().bucket
    );

    serve(&config, session, transport, termination_signal()).await
}

/// Poll until `shutdown` completes or a permanent error occurs.
///
/// Both paths end with a final flush of the write buffer.
pub async fn serve<A, T, F>(
    config: &Configuration,
    mut session: SessionManager<A>,
    transport: T,
    shutdown: F,
) -> Result<()>
where
    A: DeviceApi,
    T: Transport + 'static,
    F: Future<Output = ()>,
{
    let (write_api, errors) = WriteApi::spawn(transport, config.time_series_db.write_options());
    let coordinator = ShutdownCoordinator::new(write_api.clone(), errors);

    let forwarder = WriteForwarder::new(config.time_series_db.measurement(), write_api);
    let poll = PollLoop::new(session.api(), forwarder, config.polling.interval())
        .with_retry(RetryPolicy::from_config(&config.polling));

    let outcome = tokio::select! {
        result = poll.run(&mut session) => result,
        _ = shutdown => {
            tracing::info!("Shutdown requested, stopping poll loop");
            Ok(())
        }
    };

    let failed_writes = coordinator.finish().await;
    if failed_writes > 0 {
        tracing::warn!("{} write errors reported during this run", failed_writes);
    }

    match &outcome {
        Ok(()) => tracing::info!("Collector stopped"),
        Err(e) => tracing::error!("Collector stopped: {}", e),
    }
    outcome
}

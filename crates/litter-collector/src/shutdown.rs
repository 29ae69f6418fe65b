// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write error reporting and orderly shutdown.

use litter_influx_sink::{WriteApi, WriteError, WriteErrors};
use tokio::task::JoinHandle;

/// Owns the write API for the lifetime of the service.
///
/// Creating it starts a task that logs every asynchronous write error.
/// [`ShutdownCoordinator::finish`] flushes pending points and waits for that
/// task to see the error channel close, so no error reported during the
/// final flush is lost.
pub struct ShutdownCoordinator {
    write_api: WriteApi,
    drain: JoinHandle<usize>,
}

impl ShutdownCoordinator {
    pub fn new(write_api: WriteApi, errors: WriteErrors) -> Self {
        let drain = tokio::spawn(drain_errors(errors));
        Self { write_api, drain }
    }

    pub fn write_api(&self) -> &WriteApi {
        &self.write_api
    }

    /// Flush, close the write API and wait for the error drain.
    ///
    /// Returns the number of write errors reported over the whole run.
    pub async fn finish(self) -> usize {
        tracing::info!("Flushing pending points...");
        if let Err(e) = self.write_api.flush().await {
            tracing::warn!("Final flush skipped: {}", e);
        }
        if let Err(e) = self.write_api.close().await {
            tracing::warn!("Write API already closed: {}", e);
        }

        match self.drain.await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Write error drain task failed: {}", e);
                0
            }
        }
    }
}

async fn drain_errors(mut errors: WriteErrors) -> usize {
    let mut count = 0;
    while let Some(error) = errors.recv().await {
        count += 1;
        log_write_error(&error);
    }
    tracing::debug!("Write error channel closed");
    count
}

fn log_write_error(error: &WriteError) {
    match error {
        WriteError::Transport {
            lines,
            attempts,
            source,
        } => tracing::error!(
            lines = *lines,
            attempts = *attempts,
            "Write to time-series database failed: {}",
            source
        ),
        other => tracing::error!("Write to time-series database failed: {}", other),
    }
}

/// Completes on the first termination request.
///
/// SIGINT or SIGTERM on Unix, Ctrl-C elsewhere.
pub async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => tracing::warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C"),
        Err(e) => {
            tracing::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

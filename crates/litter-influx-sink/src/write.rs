// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Non-blocking buffered write API.
//!
//! [`WriteApi`] is a cheap clonable handle over a background worker task.
//! Points are encoded and batched by the worker; batches leave when the
//! buffer fills up, on every flush interval tick, and on explicit
//! [`WriteApi::flush`] / [`WriteApi::close`] calls.
//!
//! Write failures never reach the caller of `write_point`. They are reported
//! on the bounded [`WriteErrors`] channel returned by [`WriteApi::spawn`].

use crate::buffer::{Batch, BatchBuffer};
use crate::config::WriteOptions;
use crate::error::WriteError;
use crate::influx::Point;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Receiving end of the asynchronous write-error channel.
///
/// Closes once the write worker has stopped.
pub type WriteErrors = mpsc::Receiver<WriteError>;

/// Anything points can be handed to without waiting on I/O.
pub trait PointWriter: Send + Sync {
    fn write_point(&self, point: Point);
}

enum Command {
    Point(Point),
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

/// Handle to the background writer.
#[derive(Clone)]
pub struct WriteApi {
    tx: mpsc::UnboundedSender<Command>,
}

impl WriteApi {
    /// Start the background worker on the current tokio runtime.
    pub fn spawn<T: Transport + 'static>(transport: T, options: WriteOptions) -> (Self, WriteErrors) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::channel(options.error_capacity.max(1));

        let worker = Worker {
            transport: Arc::new(transport),
            buffer: BatchBuffer::new(options.batch_size),
            options,
            errors: errors_tx,
        };
        tokio::spawn(worker.run(rx));

        (Self { tx }, errors_rx)
    }

    /// Enqueue a point. Returns immediately.
    pub fn write_point(&self, point: Point) {
        if self.tx.send(Command::Point(point)).is_err() {
            tracing::warn!("Dropping point: write API is closed");
        }
    }

    /// Send everything buffered so far and wait until the worker has tried.
    ///
    /// Failures of the flushed batch are reported on the error channel.
    pub async fn flush(&self) -> Result<(), WriteError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack_tx))
            .map_err(|_| WriteError::Closed)?;
        ack_rx.await.map_err(|_| WriteError::Closed)
    }

    /// Flush, then stop the worker. The error channel closes afterwards.
    pub async fn close(&self) -> Result<(), WriteError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Close(ack_tx))
            .map_err(|_| WriteError::Closed)?;
        ack_rx.await.map_err(|_| WriteError::Closed)
    }

    /// Whether the worker is still accepting points.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl PointWriter for WriteApi {
    fn write_point(&self, point: Point) {
        WriteApi::write_point(self, point);
    }
}

struct Worker<T: Transport> {
    transport: Arc<T>,
    buffer: BatchBuffer,
    options: WriteOptions,
    errors: mpsc::Sender<WriteError>,
}

impl<T: Transport> Worker<T> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let period = self.options.flush_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            "Write worker started (batch_size={}, flush_interval={:?})",
            self.options.batch_size,
            period
        );

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Point(point)) => self.enqueue(point).await,
                    Some(Command::Flush(ack)) => {
                        self.flush().await;
                        let _ = ack.send(());
                    }
                    Some(Command::Close(ack)) => {
                        rx.close();
                        // Points sent before the close still count.
                        while let Ok(cmd) = rx.try_recv() {
                            self.drain(cmd).await;
                        }
                        self.flush().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        self.flush().await;
                    }
                }
            }
        }

        tracing::debug!("Write worker stopped");
    }

    async fn drain(&mut self, cmd: Command) {
        match cmd {
            Command::Point(point) => self.enqueue(point).await,
            Command::Flush(ack) | Command::Close(ack) => {
                let _ = ack.send(());
            }
        }
    }

    async fn enqueue(&mut self, point: Point) {
        match point.to_line_protocol() {
            Ok(line) => {
                if let Some(batch) = self.buffer.push(line) {
                    self.send(batch).await;
                }
            }
            Err(e) => self.report(e),
        }
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        tracing::trace!(
            "Flushing {} pending lines ({} bytes)",
            self.buffer.len(),
            self.buffer.pending_bytes()
        );
        let batch = self.buffer.take();
        self.send(batch).await;
    }

    async fn send(&self, batch: Batch) {
        let body = batch.body();
        let mut attempt = 0u32;

        loop {
            match self.transport.write(&body).await {
                Ok(()) => {
                    tracing::debug!("Wrote {} lines", batch.len());
                    return;
                }
                Err(e) if e.is_retryable() && attempt < self.options.max_retries => {
                    attempt += 1;
                    let delay = self.options.retry_delay(attempt);
                    tracing::warn!(
                        "Write of {} lines failed ({}), retry {}/{} in {:?}",
                        batch.len(),
                        e,
                        attempt,
                        self.options.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.report(WriteError::Transport {
                        lines: batch.len(),
                        attempts: attempt + 1,
                        source: e,
                    });
                    return;
                }
            }
        }
    }

    fn report(&self, error: WriteError) {
        if let Err(mpsc::error::TrySendError::Full(error)) = self.errors.try_send(error) {
            tracing::warn!("Dropping write error (channel full): {}", error);
        }
    }
}

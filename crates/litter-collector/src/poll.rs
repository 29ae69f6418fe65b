// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-interval poll loop
//!
//! One tick is: keep the session valid, fetch every robot, normalize, and
//! hand the points to the write buffer with a single shared timestamp.
//!
//! Ticks start `interval` apart on the monotonic clock. The time a tick
//! takes is subtracted from the following sleep, so slow fetches do not
//! push the schedule. A tick that overruns the interval is followed by the
//! next one immediately; ticks never overlap.

use crate::config::PollingConfig;
use crate::device::DeviceApi;
use crate::error::{CollectorError, Result};
use crate::forward::WriteForwarder;
use crate::normalize::{normalize, NormalizedMeasurement};
use crate::session::SessionManager;
use chrono::{DateTime, Utc};
use litter_influx_sink::PointWriter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Retry schedule for transient refresh and fetch failures within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_secs(config.retry_backoff_seconds),
            max_backoff: Duration::from_secs(config.max_backoff_seconds),
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Time to sleep after a tick that took `elapsed`.
///
/// Zero when the tick overran the interval.
pub fn sleep_duration(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Result of one non-fatal tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Points handed to the write buffer.
    Written(usize),
    /// Transient failures exhausted the retries; nothing was written.
    Skipped,
}

/// Drives fetch, normalize and forward on a fixed schedule.
pub struct PollLoop<A: DeviceApi, W: PointWriter> {
    api: Arc<A>,
    forwarder: WriteForwarder<W>,
    interval: Duration,
    retry: RetryPolicy,
}

impl<A: DeviceApi, W: PointWriter> PollLoop<A, W> {
    pub fn new(api: Arc<A>, forwarder: WriteForwarder<W>, interval: Duration) -> Self {
        Self {
            api,
            forwarder,
            interval,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn forwarder(&self) -> &WriteForwarder<W> {
        &self.forwarder
    }

    /// Poll until a fatal error occurs.
    ///
    /// The first tick runs immediately. Never returns `Ok`; stopping on a
    /// signal is done by dropping the future.
    pub async fn run(&self, session: &mut SessionManager<A>) -> Result<()> {
        tracing::info!("Polling every {:?}", self.interval);

        loop {
            let started = Instant::now();
            self.tick(session).await?;

            let elapsed = started.elapsed();
            let sleep = sleep_duration(self.interval, elapsed);
            if sleep.is_zero() {
                tracing::warn!(
                    "Poll took {:?}, longer than the {:?} interval; starting next poll now",
                    elapsed,
                    self.interval
                );
            } else {
                tracing::trace!("Poll took {:?}, sleeping {:?}", elapsed, sleep);
            }
            tokio::time::sleep(sleep).await;
        }
    }

    /// Run a single tick.
    ///
    /// Transient failures are retried per the [`RetryPolicy`]; once the
    /// retries are spent the tick is skipped. Permanent failures are
    /// returned.
    pub async fn tick(&self, session: &mut SessionManager<A>) -> Result<TickOutcome> {
        match self.fetch(session).await {
            Ok((states, query_time)) => {
                let measurements: Vec<NormalizedMeasurement> =
                    states.iter().map(|s| normalize(s)).collect();
                let written = self.forwarder.write_all(&measurements, query_time);
                tracing::info!("Queued {} robot measurements at {}", written, query_time);
                Ok(TickOutcome::Written(written))
            }
            Err(e) if !e.is_fatal() => {
                tracing::warn!(
                    "Skipping poll after {} attempts: {}",
                    self.retry.max_retries + 1,
                    e
                );
                Ok(TickOutcome::Skipped)
            }
            Err(e) => {
                tracing::error!("Poll failed: {}", e);
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        session: &mut SessionManager<A>,
    ) -> Result<(Vec<A::State>, DateTime<Utc>)> {
        let mut attempt = 0u32;
        loop {
            match self.try_fetch(session).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if !e.is_fatal() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        "{} (retry {}/{} in {:?})",
                        e,
                        attempt,
                        self.retry.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The query time is taken right after the fetch returns.
    async fn try_fetch(
        &self,
        session: &mut SessionManager<A>,
    ) -> Result<(Vec<A::State>, DateTime<Utc>)> {
        let current = session.ensure_valid(Utc::now()).await?;
        let states = self
            .api
            .fetch_states(&current.token)
            .await
            .map_err(CollectorError::Fetch)?;
        Ok((states, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ApiError, MockDeviceApi, RobotState};
    use litter_influx_sink::{FieldValue, Point};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder {
        points: Arc<Mutex<Vec<Point>>>,
    }

    impl PointWriter for Recorder {
        fn write_point(&self, point: Point) {
            self.points.lock().unwrap().push(point);
        }
    }

    fn robot(id: &str, cycles: f64) -> RobotState {
        RobotState {
            serial: format!("LR3C{}", id),
            name: format!("Robot {}", id),
            device_id: id.to_string(),
            power_status: "AC".to_string(),
            cycle_count: cycles,
            ..RobotState::default()
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        }
    }

    async fn setup(
        api: MockDeviceApi,
        interval: Duration,
    ) -> (Arc<MockDeviceApi>, SessionManager<MockDeviceApi>, PollLoop<MockDeviceApi, Recorder>, Recorder) {
        let api = Arc::new(api);
        let session = SessionManager::establish(api.clone()).await.unwrap();
        let recorder = Recorder::default();
        let forwarder = WriteForwarder::new("litter_robot", recorder.clone());
        let poll = PollLoop::new(api.clone(), forwarder, interval).with_retry(fast_retry(3));
        (api, session, poll, recorder)
    }

    fn offsets(starts: &[Instant]) -> Vec<Duration> {
        starts.iter().map(|s| *s - starts[0]).collect()
    }

    #[test]
    fn test_sleep_duration() {
        let interval = Duration::from_secs(10);
        assert_eq!(sleep_duration(interval, Duration::from_secs(3)), Duration::from_secs(7));
        assert_eq!(sleep_duration(interval, interval), Duration::ZERO);
        assert_eq!(sleep_duration(interval, Duration::from_secs(15)), Duration::ZERO);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(6), Duration::from_secs(30));
        assert_eq!(policy.backoff(64), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = PollingConfig {
            interval_seconds: 60,
            max_retries: 5,
            retry_backoff_seconds: 2,
            max_backoff_seconds: 10,
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_start_on_schedule_despite_fetch_latency() {
        let api = MockDeviceApi::new(vec![robot("001", 1.0)]);
        api.set_fetch_delay(Duration::from_secs(3));
        let (api, mut session, poll, _recorder) = setup(api, Duration::from_secs(10)).await;

        let stopped = tokio::time::timeout(Duration::from_secs(25), poll.run(&mut session)).await;
        assert!(stopped.is_err(), "poll loop ended on its own");

        assert_eq!(
            offsets(&api.fetch_starts()),
            vec![Duration::ZERO, Duration::from_secs(10), Duration::from_secs(20)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlong_tick_is_followed_immediately() {
        let api = MockDeviceApi::new(vec![robot("001", 1.0)]);
        api.set_fetch_delay(Duration::from_secs(15));
        let (api, mut session, poll, _recorder) = setup(api, Duration::from_secs(10)).await;

        let _ = tokio::time::timeout(Duration::from_secs(35), poll.run(&mut session)).await;

        assert_eq!(
            offsets(&api.fetch_starts()),
            vec![Duration::ZERO, Duration::from_secs(15), Duration::from_secs(30)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_writes_one_point_per_robot_with_shared_time() {
        let api = MockDeviceApi::new(vec![robot("001", 12.0), robot("002", f64::NAN)]);
        let (_api, mut session, poll, recorder) = setup(api, Duration::from_secs(60)).await;

        let outcome = poll.tick(&mut session).await.unwrap();
        assert_eq!(outcome, TickOutcome::Written(2));

        let points = recorder.points.lock().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].time(), points[1].time());
        assert_eq!(points[0].field_value("cycles_count"), Some(&FieldValue::Integer(12)));
        assert_eq!(points[1].field_value("cycles_count"), Some(&FieldValue::Integer(-1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fetch_failure_is_retried() {
        let api = MockDeviceApi::new(vec![robot("001", 1.0)]);
        api.fail_fetch(ApiError::Transport("connection reset".into()));
        api.fail_fetch(ApiError::Status {
            status: 503,
            body: String::new(),
        });
        let (api, mut session, poll, recorder) = setup(api, Duration::from_secs(60)).await;

        let outcome = poll.tick(&mut session).await.unwrap();
        assert_eq!(outcome, TickOutcome::Written(1));
        assert_eq!(api.fetch_count(), 3);
        assert_eq!(recorder.points.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_skip_the_tick() {
        let api = MockDeviceApi::new(vec![robot("001", 1.0)]);
        for _ in 0..4 {
            api.fail_fetch(ApiError::Transport("timed out".into()));
        }
        let (api, mut session, poll, recorder) = setup(api, Duration::from_secs(60)).await;

        assert_eq!(poll.tick(&mut session).await.unwrap(), TickOutcome::Skipped);
        assert_eq!(api.fetch_count(), 4);
        assert!(recorder.points.lock().unwrap().is_empty());

        // The next tick starts afresh.
        assert_eq!(poll.tick(&mut session).await.unwrap(), TickOutcome::Written(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_fetch_failure_ends_the_loop() {
        let api = MockDeviceApi::new(vec![robot("001", 1.0)]);
        api.fail_fetch(ApiError::Status {
            status: 403,
            body: "forbidden".into(),
        });
        let (api, mut session, poll, recorder) = setup(api, Duration::from_secs(60)).await;

        let err = poll.run(&mut session).await.unwrap_err();
        assert!(matches!(err, CollectorError::Fetch(_)));
        assert!(err.is_fatal());
        assert_eq!(api.fetch_count(), 1);
        assert!(recorder.points.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiring_session_is_refreshed_before_fetch() {
        // Tokens shorter than the refresh margin are refreshed on every tick.
        let api = MockDeviceApi::new(vec![robot("001", 1.0)])
            .with_token_lifetime(chrono::Duration::seconds(30));
        let (api, mut session, poll, _recorder) = setup(api, Duration::from_secs(60)).await;

        poll.tick(&mut session).await.unwrap();
        poll.tick(&mut session).await.unwrap();

        assert_eq!(api.refresh_count(), 2);
        assert_eq!(session.refreshes(), 2);
        assert_eq!(session.session().token.access_token, "mock-refresh-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_refresh_failure_is_retried() {
        let api = MockDeviceApi::new(vec![robot("001", 1.0)])
            .with_token_lifetime(chrono::Duration::seconds(30));
        api.fail_refresh(ApiError::Transport("dns".into()));
        let (api, mut session, poll, _recorder) = setup(api, Duration::from_secs(60)).await;

        assert_eq!(poll.tick(&mut session).await.unwrap(), TickOutcome::Written(1));
        assert_eq!(api.refresh_count(), 1);
        assert_eq!(api.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_refresh_is_fatal() {
        let api = MockDeviceApi::new(vec![robot("001", 1.0)])
            .with_token_lifetime(chrono::Duration::seconds(30));
        api.fail_refresh(ApiError::Unauthorized("invalid_grant".into()));
        let (api, mut session, poll, _recorder) = setup(api, Duration::from_secs(60)).await;

        let err = poll.tick(&mut session).await.unwrap_err();
        assert!(matches!(err, CollectorError::AuthRefresh(_)));
        assert_eq!(api.fetch_count(), 0);
    }
}

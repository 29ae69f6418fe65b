// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device API session lifecycle
//!
//! The session is refreshed one minute before it expires so the fetch call
//! never presents a token that is about to be rejected.

use crate::device::{DeviceApi, SessionToken};
use crate::error::{CollectorError, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Seconds subtracted from every expiry reported by the device API.
pub const REFRESH_MARGIN_SECS: i64 = 60;

fn refresh_margin() -> Duration {
    Duration::seconds(REFRESH_MARGIN_SECS)
}

/// Authenticated session with the expiry the collector works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: SessionToken,
    /// Reported expiry minus [`REFRESH_MARGIN_SECS`].
    pub expiry: DateTime<Utc>,
}

impl Session {
    /// Wrap a freshly issued token, applying the refresh margin.
    pub fn from_token(token: SessionToken) -> Self {
        let expiry = token.expiry - refresh_margin();
        Self { token, expiry }
    }
}

/// Owns the session and keeps it valid.
///
/// Only the poll loop holds it, by `&mut`, so refreshes never race.
pub struct SessionManager<A: DeviceApi> {
    api: Arc<A>,
    session: Session,
    refreshes: u64,
}

impl<A: DeviceApi> SessionManager<A> {
    /// Log in and hold the resulting session.
    pub async fn establish(api: Arc<A>) -> Result<Self> {
        let token = api.login().await.map_err(CollectorError::Auth)?;
        let session = Session::from_token(token);
        tracing::info!("Authenticated to device API (session valid until {})", session.expiry);
        Ok(Self::with_session(api, session))
    }

    /// Use an already established session.
    pub fn with_session(api: Arc<A>, session: Session) -> Self {
        Self {
            api,
            session,
            refreshes: 0,
        }
    }

    /// Device API the session belongs to.
    pub fn api(&self) -> Arc<A> {
        Arc::clone(&self.api)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.session.expiry
    }

    /// Number of successful refreshes so far.
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    /// True once `now` is within one minute of the tracked expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now >= self.session.expiry - refresh_margin()
    }

    /// Refresh the session if it is about to expire.
    ///
    /// On success the tracked expiry becomes the refreshed expiry minus one
    /// minute. On failure the current session is left untouched.
    pub async fn ensure_valid(&mut self, now: DateTime<Utc>) -> Result<&Session> {
        if self.needs_refresh(now) {
            tracing::debug!(
                "Refreshing device API session (expiry {}, now {})",
                self.session.expiry,
                now
            );
            let token = self
                .api
                .refresh(&self.session.token)
                .await
                .map_err(CollectorError::AuthRefresh)?;
            self.session = Session::from_token(token);
            self.refreshes += 1;
            tracing::info!("Refreshed device API session (valid until {})", self.session.expiry);
        }
        Ok(&self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ApiError, RobotState};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct StubApi {
        next_expiry: Mutex<DateTime<Utc>>,
        refresh_calls: AtomicU32,
        fail_refresh: bool,
    }

    impl StubApi {
        fn new(next_expiry: DateTime<Utc>) -> Self {
            Self {
                next_expiry: Mutex::new(next_expiry),
                refresh_calls: AtomicU32::new(0),
                fail_refresh: false,
            }
        }

        fn token(&self, access: &str) -> SessionToken {
            SessionToken {
                access_token: access.to_string(),
                refresh_token: Some("refresh".into()),
                account_id: None,
                expiry: *self.next_expiry.lock().unwrap(),
            }
        }
    }

    #[async_trait]
    impl DeviceApi for StubApi {
        type State = RobotState;

        async fn login(&self) -> std::result::Result<SessionToken, ApiError> {
            Ok(self.token("login"))
        }

        async fn refresh(
            &self,
            _session: &SessionToken,
        ) -> std::result::Result<SessionToken, ApiError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh {
                return Err(ApiError::Unauthorized("invalid_grant".into()));
            }
            Ok(self.token("refreshed"))
        }

        async fn fetch_states(
            &self,
            _session: &SessionToken,
        ) -> std::result::Result<Vec<RobotState>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn manager(api: Arc<StubApi>, expiry: DateTime<Utc>) -> SessionManager<StubApi> {
        let session = Session {
            token: api.token("current"),
            expiry,
        };
        SessionManager::with_session(api, session)
    }

    #[tokio::test]
    async fn test_establish_applies_margin() {
        let api = Arc::new(StubApi::new(t0() + Duration::hours(1)));
        let manager = SessionManager::establish(api).await.unwrap();
        assert_eq!(manager.expiry(), t0() + Duration::minutes(59));
        assert_eq!(manager.session().token.access_token, "login");
    }

    #[tokio::test]
    async fn test_refresh_within_margin() {
        let refreshed = t0() + Duration::hours(1);
        let api = Arc::new(StubApi::new(refreshed));
        let mut manager = manager(api.clone(), t0() + Duration::seconds(30));

        let session = manager.ensure_valid(t0()).await.unwrap();
        assert_eq!(session.token.access_token, "refreshed");
        assert_eq!(session.expiry, refreshed - Duration::seconds(60));
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_no_refresh_outside_margin() {
        let api = Arc::new(StubApi::new(t0() + Duration::hours(2)));
        let expiry = t0() + Duration::seconds(61);
        let mut manager = manager(api.clone(), expiry);

        let session = manager.ensure_valid(t0()).await.unwrap();
        assert_eq!(session.token.access_token, "current");
        assert_eq!(session.expiry, expiry);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_needs_refresh_boundary() {
        let api = Arc::new(StubApi::new(t0()));
        let manager = manager(api, t0() + Duration::seconds(60));

        assert!(manager.needs_refresh(t0()));
        assert!(!manager.needs_refresh(t0() - Duration::milliseconds(1)));
        assert!(manager.needs_refresh(t0() + Duration::hours(1)));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_session() {
        let api = Arc::new(StubApi {
            fail_refresh: true,
            ..StubApi::new(t0() + Duration::hours(1))
        });
        let expiry = t0();
        let mut manager = manager(api, expiry);

        let err = manager.ensure_valid(t0()).await.unwrap_err();
        assert!(matches!(err, CollectorError::AuthRefresh(_)));
        assert!(err.is_fatal());
        assert_eq!(manager.expiry(), expiry);
        assert_eq!(manager.session().token.access_token, "current");
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// End-to-end runs of the collector against the mock device API and an
// in-memory write transport.

use litter_collector::service::{run_with_api, serve};
use litter_collector::{
    ApiError, CollectorError, ConfigError, Configuration, MockDeviceApi, RobotState,
    SessionManager,
};
use litter_influx_sink::MemoryTransport;
use std::sync::Arc;
use std::time::Duration;

fn config() -> Configuration {
    Configuration::from_yaml(
        r#"
deviceApi:
  email: "owner@example.com"
  password: "hunter2"
timeSeriesDb:
  address: "http://127.0.0.1:9"
  organization: "home"
  bucket: "mybucket"
  measurementPrefix: "home_"
  flushIntervalSeconds: 3600
polling:
  intervalSeconds: 10
  retryBackoffSeconds: 1
"#,
    )
    .unwrap()
}

fn robot(id: &str, cycle_count: f64, cycles_until_full: f64) -> RobotState {
    RobotState {
        serial: format!("LR3C{}", id),
        name: format!("Robot {}", id),
        device_id: id.to_string(),
        power_status: "AC".to_string(),
        cycle_count,
        cycles_until_full,
        cycle_capacity: 30.0,
        ..RobotState::default()
    }
}

async fn session(api: &Arc<MockDeviceApi>) -> SessionManager<MockDeviceApi> {
    SessionManager::establish(api.clone()).await.unwrap()
}

#[test]
fn test_bucket_is_write_destination() {
    let config = config();
    assert_eq!(config.time_series_db.write_destination().unwrap(), "mybucket");
    assert_eq!(config.time_series_db.destination().unwrap().bucket, "mybucket");
}

#[tokio::test]
async fn test_missing_destination_fails_before_network() {
    let mut config = config();
    config.time_series_db.bucket.clear();

    // The address is unreachable; reaching it would surface as Connect.
    let err = run_with_api(config, MockDeviceApi::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CollectorError::Config(ConfigError::WriteDestination)
    ));
    assert!(err.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn test_signal_flushes_buffered_points() {
    let api = Arc::new(MockDeviceApi::new(vec![
        robot("001", 12.0, 18.0),
        robot("002", 3.0, 27.0),
    ]));
    let transport = MemoryTransport::new();

    let result = serve(
        &config(),
        session(&api).await,
        transport.clone(),
        tokio::time::sleep(Duration::from_secs(25)),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(api.fetch_count(), 3);
    // Nothing reaches the database before the shutdown flush.
    assert_eq!(transport.requests(), 1);

    let lines = transport.lines();
    assert_eq!(lines.len(), 6);
    assert!(lines.iter().all(|l| l.starts_with("home_litter_robot,")));
}

#[tokio::test(start_paused = true)]
async fn test_nan_counter_written_as_sentinel() {
    let api = Arc::new(MockDeviceApi::new(vec![robot("001", f64::NAN, 42.9)]));
    let transport = MemoryTransport::new();

    serve(
        &config(),
        session(&api).await,
        transport.clone(),
        tokio::time::sleep(Duration::from_secs(5)),
    )
    .await
    .unwrap();

    let lines = transport.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("cycles_count=-1i"), "{}", lines[0]);
    assert!(lines[0].contains("cycles_until_full=42i"), "{}", lines[0]);
    assert!(lines[0].contains("robot_id=001"));
}

#[tokio::test(start_paused = true)]
async fn test_points_of_one_tick_share_a_timestamp() {
    let api = Arc::new(MockDeviceApi::new(vec![
        robot("001", 1.0, 29.0),
        robot("002", 2.0, 28.0),
    ]));
    let transport = MemoryTransport::new();

    serve(
        &config(),
        session(&api).await,
        transport.clone(),
        tokio::time::sleep(Duration::from_secs(5)),
    )
    .await
    .unwrap();

    let stamps: Vec<String> = transport
        .lines()
        .iter()
        .filter_map(|l| l.rsplit(' ').next().map(str::to_string))
        .collect();
    assert_eq!(stamps.len(), 2);
    assert_eq!(stamps[0], stamps[1]);
}

#[tokio::test(start_paused = true)]
async fn test_short_lived_session_is_refreshed() {
    let api = Arc::new(
        MockDeviceApi::new(vec![robot("001", 1.0, 29.0)])
            .with_token_lifetime(chrono::Duration::seconds(45)),
    );
    let transport = MemoryTransport::new();

    serve(
        &config(),
        session(&api).await,
        transport.clone(),
        tokio::time::sleep(Duration::from_secs(15)),
    )
    .await
    .unwrap();

    assert_eq!(api.login_count(), 1);
    assert_eq!(api.refresh_count(), 2);
    assert_eq!(transport.lines().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_stops_after_final_flush() {
    let api = Arc::new(MockDeviceApi::new(vec![robot("001", 1.0, 29.0)]));
    let transport = MemoryTransport::new();

    let saboteur = api.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        saboteur.fail_fetch(ApiError::Unauthorized("token revoked".into()));
    });

    let err = serve(
        &config(),
        session(&api).await,
        transport.clone(),
        std::future::pending::<()>(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CollectorError::Fetch(ApiError::Unauthorized(_))));
    assert_eq!(api.fetch_count(), 2);
    // The first tick's point was still delivered.
    assert_eq!(transport.lines().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_outage_skips_ticks_without_stopping() {
    let api = Arc::new(MockDeviceApi::new(vec![robot("001", 1.0, 29.0)]));
    // First tick: one attempt plus three retries, all failing.
    for _ in 0..4 {
        api.fail_fetch(ApiError::Status {
            status: 503,
            body: "maintenance".into(),
        });
    }
    let transport = MemoryTransport::new();

    serve(
        &config(),
        session(&api).await,
        transport.clone(),
        tokio::time::sleep(Duration::from_secs(15)),
    )
    .await
    .unwrap();

    assert_eq!(api.fetch_count(), 5);
    assert_eq!(transport.lines().len(), 1);
}

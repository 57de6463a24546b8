/*
[INPUT]:  Mock server requirements for chart tests
[OUTPUT]: Shared fixtures for feed integration tests
[POS]:    Test infrastructure - shared across chart test modules
[UPDATE]: When adding new test patterns or fixtures
*/

#![allow(dead_code)]

use livefeed_adapter::{ClientConfig, Interval, SnapshotClient};
use wiremock::MockServer;

pub const MINUTE_MS: i64 = 60_000;

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn snapshot_client(server: &MockServer) -> SnapshotClient {
    SnapshotClient::with_config_and_base_url(
        ClientConfig::default(),
        &format!("{}/api/v1", server.uri()),
    )
    .expect("client init")
}

/// Start of the current minute bucket shifted by `offset` buckets.
pub fn minute(offset: i64) -> i64 {
    Interval::OneMinute
        .bucket_start(chrono::Utc::now().timestamp_millis())
        .expect("bucket")
        + offset * MINUTE_MS
}

/// Kline row in the `[ts, open, high, low, close, volume]` wire shape.
pub fn kline_row(ts: i64, close: f64) -> serde_json::Value {
    serde_json::json!([ts, close, close + 1.0, close - 1.0, close, 10.0])
}

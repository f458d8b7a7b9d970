//! Integration tests for osh-harvest
//!
//! These tests run the client, collector, merger and resolver against
//! wiremock servers and temporary files. Every component is driven by a
//! `ManualClock`, so backoff and quota waits finish instantly.

mod client_tests;
mod pipeline_tests;

use chrono::{DateTime, TimeZone, Utc};
use osh_harvest::client::{build_http_client, RateLimitedClient, RetryPolicy};
use osh_harvest::clock::ManualClock;
use osh_harvest::config::ClientConfig;
use osh_harvest::credentials::CredentialPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Fixed start time for manual clocks
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

/// Client with a short retry policy and a one-minute credential wait
pub fn test_client(pool: CredentialPool) -> RateLimitedClient {
    let http = build_http_client(&ClientConfig::default(), &BTreeMap::new())
        .expect("Failed to build HTTP client");
    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
    };
    RateLimitedClient::new(http, pool, retry, Duration::from_secs(60))
}

use crate::credentials::UsageReport;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Extracts rate-limit information from a response
///
/// # Arguments
///
/// * `status` - HTTP status code of the response
/// * `headers` - Response headers
/// * `now` - Current time, used to turn an HTTP-date `Retry-After` into a duration
///
/// # Returns
///
/// A `UsageReport`; headers that are absent or unparseable are left as `None`
pub fn usage_report(status: u16, headers: &HeaderMap, now: DateTime<Utc>) -> UsageReport {
    UsageReport {
        status,
        remaining: header_str(headers, RATE_LIMIT_REMAINING).and_then(|v| v.parse().ok()),
        limit: header_str(headers, RATE_LIMIT_LIMIT).and_then(|v| v.parse().ok()),
        reset_at: header_str(headers, RATE_LIMIT_RESET)
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        retry_after: header_str(headers, RETRY_AFTER.as_str())
            .and_then(|v| parse_retry_after(v, now)),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// `Retry-After` is either delta-seconds or an HTTP-date
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

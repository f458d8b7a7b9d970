//! Rate-limited HTTP client
//!
//! This module handles every upstream HTTP call, including:
//! - Building the reqwest client with user agent, timeouts and default headers
//! - Leasing a credential from the pool for each attempt
//! - Reporting rate-limit headers back to the pool
//! - Retrying transient failures with exponential backoff and jitter
//! - Classifying responses into success, not-found and fatal errors

mod headers;
mod retry;

pub use headers::usage_report;
pub use retry::RetryPolicy;

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::credentials::{CredentialPool, PoolError, UsageReport};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`RateLimitedClient::request`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The resource does not exist (HTTP 404)
    #[error("Not found: {url}")]
    NotFound { url: String },

    /// A non-retryable client error
    #[error("HTTP {status} from {url}")]
    Fatal { status: u16, url: String },

    /// Every attempt failed with a transient error
    #[error("Gave up on {url} after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// No credential becomes ready within the allowed wait
    #[error("Quota deferred until {ready_at}")]
    QuotaDeferred { ready_at: DateTime<Utc> },

    /// Every credential was rejected by the upstream
    #[error("No valid credentials remain")]
    PoolExhausted,

    /// A configured default header is not a valid HTTP header
    #[error("Invalid header '{0}'")]
    InvalidHeader(String),

    /// The request could not be built
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl From<PoolError> for ClientError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted => ClientError::PoolExhausted,
            PoolError::NotReadyWithin { ready_at } => ClientError::QuotaDeferred { ready_at },
        }
    }
}

/// A successful (2xx) upstream response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub usage: UsageReport,
    pub body: String,
}

impl ApiResponse {
    /// Parses the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The client configuration
/// * `default_headers` - Headers sent with every request (e.g. `Accept`)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(ClientError)` - A header was invalid or the client failed to build
pub fn build_http_client(
    config: &ClientConfig,
    default_headers: &BTreeMap<String, String>,
) -> Result<Client, ClientError> {
    let mut headers = HeaderMap::new();
    for (name, value) in default_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
        headers.insert(name, value);
    }

    Ok(Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .default_headers(headers)
        .gzip(true)
        .brotli(true)
        .build()?)
}

/// HTTP client that authenticates with pooled credentials and retries transient failures
#[derive(Clone)]
pub struct RateLimitedClient {
    http: Client,
    pool: CredentialPool,
    retry: RetryPolicy,
    max_wait: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimitedClient {
    /// Creates a client around an existing reqwest client
    ///
    /// # Arguments
    ///
    /// * `http` - The underlying reqwest client
    /// * `pool` - Credentials to rotate through; its clock drives backoff sleeps
    /// * `retry` - Retry policy for transient failures
    /// * `max_wait` - Longest wait for a ready credential before deferring
    pub fn new(http: Client, pool: CredentialPool, retry: RetryPolicy, max_wait: Duration) -> Self {
        let clock = pool.clock();
        Self {
            http,
            pool,
            retry,
            max_wait,
            clock,
        }
    }

    /// Builds a client from configuration
    pub fn from_config(
        config: &ClientConfig,
        default_headers: &BTreeMap<String, String>,
        pool: CredentialPool,
        max_wait: Duration,
    ) -> Result<Self, ClientError> {
        let http = build_http_client(config, default_headers)?;
        Ok(Self::new(http, pool, RetryPolicy::from(config), max_wait))
    }

    /// The credential pool this client draws from
    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Sends a GET request
    pub async fn get(&self, url: &str) -> Result<ApiResponse, ClientError> {
        self.request(Method::GET, url).await
    }

    /// Performs an authenticated request with retry
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return the response |
    /// | HTTP 404 | Immediate → NotFound |
    /// | HTTP 401 | Credential removed from pool, retried with another one |
    /// | HTTP 429, rate-limited 403 | Credential cools down, retried with rotation |
    /// | HTTP 5xx, timeout, connection error | Retried after backoff |
    /// | Other 4xx | Immediate → Fatal |
    ///
    /// Only GET, HEAD and OPTIONS are retried; other methods get one attempt.
    /// Every response that reaches the server is reported to the pool.
    pub async fn request(&self, method: Method, url: &str) -> Result<ApiResponse, ClientError> {
        let max_attempts = if is_idempotent(&method) {
            self.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut attempts = 0;
        loop {
            let lease = self.pool.acquire(self.max_wait).await?;
            attempts += 1;
            tracing::trace!("{} {} (attempt {}, credential {})", method, url, attempts, lease.id);

            let sent = self
                .http
                .request(method.clone(), url)
                .bearer_auth(lease.token())
                .send()
                .await;

            let (last_error, retry_after, cooled_down) = match sent {
                Ok(response) => {
                    let status = response.status();
                    let report = usage_report(status.as_u16(), response.headers(), self.clock.now());
                    self.pool.record_usage(lease.id, &report);

                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => {
                                return Ok(ApiResponse {
                                    status: status.as_u16(),
                                    usage: report,
                                    body,
                                })
                            }
                            Err(e) => (format!("body read failed: {}", e), None, false),
                        }
                    } else {
                        match classify_status(status, &report) {
                            StatusClass::NotFound => {
                                return Err(ClientError::NotFound {
                                    url: url.to_string(),
                                })
                            }
                            StatusClass::Fatal => {
                                return Err(ClientError::Fatal {
                                    status: status.as_u16(),
                                    url: url.to_string(),
                                })
                            }
                            StatusClass::Unauthorized => {
                                // Attempts are not charged for a rejected token; the pool shrinks instead
                                attempts -= 1;
                                continue;
                            }
                            StatusClass::Throttled => {
                                let cooled = report.retry_after.is_some()
                                    || (report.remaining == Some(0) && report.reset_at.is_some());
                                (format!("HTTP {}", status.as_u16()), report.retry_after, cooled)
                            }
                            StatusClass::Transient => {
                                (format!("HTTP {}", status.as_u16()), report.retry_after, false)
                            }
                        }
                    }
                }
                Err(e) if e.is_builder() => return Err(ClientError::Request(e)),
                Err(e) => {
                    let kind = if e.is_timeout() {
                        "timeout"
                    } else if e.is_connect() {
                        "connection failed"
                    } else {
                        "request failed"
                    };
                    (format!("{}: {}", kind, e), None, false)
                }
            };

            if attempts >= max_attempts {
                tracing::warn!(
                    "Giving up on {} after {} attempt(s): {}",
                    url,
                    attempts,
                    last_error
                );
                return Err(ClientError::RetriesExhausted {
                    url: url.to_string(),
                    attempts,
                    last_error,
                });
            }

            // A cooled-down credential already gates the next acquire
            if !cooled_down {
                let delay = self.retry.delay_for(attempts, retry_after);
                tracing::debug!("{} failed ({}), retrying in {:?}", url, last_error, delay);
                self.clock.sleep(delay).await;
            } else {
                tracing::debug!("{} throttled ({}), rotating credential", url, last_error);
            }
        }
    }

    /// Performs a GET request and parses the body as JSON
    ///
    /// A body that is not valid JSON is reported as `Ok(Err(..))` so callers can
    /// tell a malformed payload apart from a transport failure.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Result<T, serde_json::Error>, ClientError> {
        let response = self.get(url).await?;
        Ok(response.json())
    }
}

enum StatusClass {
    NotFound,
    Unauthorized,
    Throttled,
    Transient,
    Fatal,
}

fn classify_status(status: StatusCode, report: &UsageReport) -> StatusClass {
    match status.as_u16() {
        404 | 410 => StatusClass::NotFound,
        401 => StatusClass::Unauthorized,
        429 => StatusClass::Throttled,
        // GitHub signals both primary and secondary rate limits with 403
        403 if report.retry_after.is_some() || report.remaining == Some(0) => StatusClass::Throttled,
        500..=599 => StatusClass::Transient,
        _ => StatusClass::Fatal,
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

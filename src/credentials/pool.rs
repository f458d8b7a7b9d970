//! Credential pool
//!
//! The pool is the single serialization point for quota state: every read and
//! write of a credential's counters happens under one mutex.

use crate::clock::{after, until, Clock};
use crate::credentials::credential::{redact, Credential};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Index of a credential in the pool, stable for the pool's lifetime
pub type CredentialId = usize;

/// `ready_at` reported when every credential is spent and none has a known reset
pub const UNKNOWN_RESET: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

/// Errors reported by the credential pool
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Every credential has been rejected by the upstream; the run cannot continue
    #[error("no valid credentials remain in the pool")]
    Exhausted,

    /// Credentials exist but none becomes usable within the allowed wait
    #[error("no credential ready until {ready_at}")]
    NotReadyWithin { ready_at: DateTime<Utc> },
}

/// Rate-limit information extracted from one upstream response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageReport {
    /// HTTP status code
    pub status: u16,

    /// Calls left in the window (`X-RateLimit-Remaining`)
    pub remaining: Option<u32>,

    /// Window size (`X-RateLimit-Limit`)
    pub limit: Option<u32>,

    /// Window end (`X-RateLimit-Reset`)
    pub reset_at: Option<DateTime<Utc>>,

    /// Server-requested back-off (`Retry-After`)
    pub retry_after: Option<Duration>,
}

impl UsageReport {
    /// Creates a report carrying only a status code
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// A reserved unit of quota on one credential
#[derive(Clone)]
pub struct Lease {
    pub id: CredentialId,
    token: String,
}

impl Lease {
    /// The token to authenticate with
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("token", &redact(&self.token))
            .finish()
    }
}

/// Redacted view of a credential for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    pub id: CredentialId,
    pub token: String,
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub valid: bool,
}

/// Rotating pool of interchangeable API credentials
#[derive(Clone)]
pub struct CredentialPool {
    credentials: Arc<Mutex<Vec<Credential>>>,
    clock: Arc<dyn Clock>,
}

enum Selection {
    Ready(Lease),
    WaitUntil(DateTime<Utc>),
    NoKnownReset,
}

impl CredentialPool {
    /// Creates a pool from credentials in configuration order
    pub fn new(credentials: Vec<Credential>, clock: Arc<dyn Clock>) -> Self {
        tracing::info!("Credential pool loaded with {} token(s)", credentials.len());
        Self {
            credentials: Arc::new(Mutex::new(credentials)),
            clock,
        }
    }

    /// Creates a pool of tokens with unknown quota
    pub fn from_tokens<I, S>(tokens: I, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(tokens.into_iter().map(Credential::new).collect(), clock)
    }

    /// The clock this pool measures quota windows with
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Reserves one call's worth of quota on the best ready credential
    ///
    /// Waits (through the clock) for the earliest reset or cooldown when nothing is
    /// ready, but never longer than `max_wait` in total.
    pub async fn acquire(&self, max_wait: Duration) -> Result<Lease, PoolError> {
        self.wait_for(max_wait, true).await
    }

    /// Waits until some credential is ready, without reserving quota
    pub async fn wait_ready(&self, max_wait: Duration) -> Result<(), PoolError> {
        self.wait_for(max_wait, false).await.map(|_| ())
    }

    async fn wait_for(&self, max_wait: Duration, reserve: bool) -> Result<Lease, PoolError> {
        let deadline = after(self.clock.now(), max_wait);

        loop {
            let now = self.clock.now();
            match self.select(now, reserve)? {
                Selection::Ready(lease) => return Ok(lease),
                Selection::NoKnownReset => {
                    tracing::warn!("All valid credentials are exhausted with no reported reset time");
                    return Err(PoolError::NotReadyWithin {
                        ready_at: UNKNOWN_RESET,
                    });
                }
                Selection::WaitUntil(ready_at) => {
                    if ready_at > deadline {
                        tracing::info!(
                            "No credential ready until {} (wait limit {:?})",
                            ready_at,
                            max_wait
                        );
                        return Err(PoolError::NotReadyWithin { ready_at });
                    }
                    let wait = until(now, ready_at).max(Duration::from_millis(1));
                    tracing::debug!("All credentials busy, sleeping {:?}", wait);
                    self.clock.sleep(wait).await;
                }
            }
        }
    }

    fn select(&self, now: DateTime<Utc>, reserve: bool) -> Result<Selection, PoolError> {
        let mut credentials = self.lock();

        for cred in credentials.iter_mut() {
            cred.refresh(now);
        }

        if !credentials.iter().any(|c| c.valid) {
            return Err(PoolError::Exhausted);
        }

        // max_by_key returns the last maximum; iterate in reverse so ties go to the first
        let best = credentials
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, c)| c.is_ready(now))
            .max_by_key(|(_, c)| c.headroom())
            .map(|(id, _)| id);

        if let Some(id) = best {
            let cred = &mut credentials[id];
            if reserve {
                cred.reserve();
            }
            tracing::trace!("Selected credential {} (remaining {:?})", id, cred.remaining);
            return Ok(Selection::Ready(Lease {
                id,
                token: cred.token.clone(),
            }));
        }

        let earliest = credentials.iter().filter_map(|c| c.ready_at(now)).min();

        Ok(earliest.map_or(Selection::NoKnownReset, Selection::WaitUntil))
    }

    /// Applies rate-limit information from a response to the credential that made the call
    pub fn record_usage(&self, id: CredentialId, report: &UsageReport) {
        let now = self.clock.now();
        let mut credentials = self.lock();
        let Some(cred) = credentials.get_mut(id) else {
            return;
        };
        if !cred.valid {
            return;
        }

        if report.status == 401 {
            cred.valid = false;
            tracing::warn!(
                "Credential {} ({}) rejected with HTTP 401; removed from rotation",
                id,
                cred.redacted()
            );
            return;
        }

        if let Some(limit) = report.limit {
            cred.limit = Some(limit);
        }

        if let Some(reported) = report.remaining {
            let new_window = matches!(
                (report.reset_at, cred.reset_at),
                (Some(reported_reset), Some(tracked)) if reported_reset > tracked
            );
            cred.remaining = Some(match cred.remaining {
                Some(tracked) if !new_window => tracked.min(reported),
                _ => reported,
            });
        }
        if let Some(reset) = report.reset_at {
            cred.reset_at = Some(reset);
        }

        let throttled = matches!(report.status, 403 | 429);
        if throttled {
            if let Some(retry_after) = report.retry_after {
                cred.cool_down(now, retry_after);
                tracing::warn!(
                    "Credential {} throttled (HTTP {}), cooling down for {:?}",
                    id,
                    report.status,
                    retry_after
                );
            } else if cred.remaining == Some(0) {
                if let Some(reset) = cred.reset_at {
                    cred.cool_down(now, until(now, reset));
                }
                tracing::warn!(
                    "Credential {} exhausted (HTTP {}), resets at {:?}",
                    id,
                    report.status,
                    cred.reset_at
                );
            }
        }
    }

    /// Number of credentials still in rotation
    pub fn valid_count(&self) -> usize {
        self.lock().iter().filter(|c| c.valid).count()
    }

    /// Redacted status of every credential, valid or not
    pub fn snapshot(&self) -> Vec<CredentialStatus> {
        self.lock()
            .iter()
            .enumerate()
            .map(|(id, c)| CredentialStatus {
                id,
                token: c.redacted(),
                remaining: c.remaining,
                reset_at: c.reset_at,
                cooldown_until: c.cooldown_until,
                valid: c.valid,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Credential>> {
        // Quota counters are plain values; a panic elsewhere cannot leave them half-written.
        self.credentials.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("credentials", &self.snapshot())
            .finish()
    }
}

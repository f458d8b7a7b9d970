use crate::config::ClientConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// xorshift64 state shared by every policy; zero means unseeded
static JITTER_STATE: AtomicU64 = AtomicU64::new(0);

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first
    pub max_attempts: u32,

    /// Backoff before the first retry
    pub base_delay: Duration,

    /// Upper bound on a single backoff, before jitter
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl From<&ClientConfig> for RetryPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the given failed attempt (1-based), without jitter
    ///
    /// `min(max_delay, base_delay * 2^(attempt - 1))`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay to sleep before the next attempt
    ///
    /// Adds uniform jitter in `[0, backoff / 2]`. A server-requested `Retry-After`
    /// that is longer than the jittered backoff replaces it.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        let jitter_ms = (backoff.as_millis() / 2) as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(jitter_up_to(jitter_ms))
        } else {
            Duration::ZERO
        };
        let delay = backoff + jitter;
        match retry_after {
            Some(requested) if requested > delay => requested,
            _ => delay,
        }
    }
}

/// Uniform-ish value in `[0, upper]` from a xorshift64 stream
///
/// Concurrent callers may read the same state and draw the same value.
fn jitter_up_to(upper: u64) -> u64 {
    let mut x = JITTER_STATE.load(Ordering::Relaxed);
    if x == 0 {
        x = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15)
            | 1;
    }
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    JITTER_STATE.store(x, Ordering::Relaxed);

    match upper.checked_add(1) {
        Some(bound) => x % bound,
        None => x,
    }
}

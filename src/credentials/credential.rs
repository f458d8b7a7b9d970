use crate::clock::after;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Quota state of one credential in the pool
///
/// `remaining == None` means the upstream has not reported a quota yet; such a
/// credential is treated as available until a response says otherwise.
#[derive(Clone)]
pub struct Credential {
    /// Opaque token, sent as a bearer header and never logged
    pub(crate) token: String,

    /// Calls left in the current window
    pub remaining: Option<u32>,

    /// Size of a full window, used to restore `remaining` after a reset
    pub limit: Option<u32>,

    /// When the current quota window ends
    pub reset_at: Option<DateTime<Utc>>,

    /// Back-off deadline set by 429/403 responses
    pub cooldown_until: Option<DateTime<Utc>>,

    /// False once the upstream rejected the token (HTTP 401)
    pub valid: bool,
}

impl Credential {
    /// Creates a credential with unknown quota
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            remaining: None,
            limit: None,
            reset_at: None,
            cooldown_until: None,
            valid: true,
        }
    }

    /// Creates a credential with a known quota window
    pub fn with_quota(
        token: impl Into<String>,
        remaining: u32,
        reset_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            remaining: Some(remaining),
            limit: Some(remaining),
            reset_at,
            ..Self::new(token)
        }
    }

    /// Rolls the quota window over if its reset time has passed
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        if let Some(reset) = self.reset_at {
            if reset <= now {
                self.remaining = self.limit.filter(|limit| *limit > 0);
                self.reset_at = None;
            }
        }
        if matches!(self.cooldown_until, Some(until) if until <= now) {
            self.cooldown_until = None;
        }
    }

    /// Checks if a call may be issued with this credential right now
    ///
    /// Call [`Credential::refresh`] first so an elapsed window is accounted for.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        if !self.valid {
            return false;
        }

        if matches!(self.cooldown_until, Some(until) if until > now) {
            return false;
        }

        match self.remaining {
            Some(0) => matches!(self.reset_at, Some(reset) if reset <= now),
            _ => true,
        }
    }

    /// Earliest time at which this credential becomes usable again
    ///
    /// Returns None when the credential is invalid or exhausted with no known reset.
    pub fn ready_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.valid {
            return None;
        }

        let quota_ready = match self.remaining {
            Some(0) => self.reset_at?,
            _ => now,
        };
        let cooldown_ready = self.cooldown_until.unwrap_or(now);

        Some(quota_ready.max(cooldown_ready).max(now))
    }

    /// Takes one unit of quota for an outgoing call
    pub fn reserve(&mut self) {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    /// Ranking key for selection: more remaining quota first, unknown counts as unbounded
    pub fn headroom(&self) -> u64 {
        self.remaining.map(u64::from).unwrap_or(u64::MAX)
    }

    /// Puts the credential in cooldown for `duration` from `now`
    pub fn cool_down(&mut self, now: DateTime<Utc>, duration: Duration) {
        let until = after(now, duration);
        self.cooldown_until = Some(match self.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    /// Masked form of the token, safe for logs
    pub fn redacted(&self) -> String {
        redact(&self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.redacted())
            .field("remaining", &self.remaining)
            .field("limit", &self.limit)
            .field("reset_at", &self.reset_at)
            .field("cooldown_until", &self.cooldown_until)
            .field("valid", &self.valid)
            .finish()
    }
}

pub(crate) fn redact(token: &str) -> String {
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if token.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("****{}", tail)
    }
}

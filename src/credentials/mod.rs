//! Credential rotation
//!
//! Tracks per-token quota windows and cooldowns, and hands out the credential with
//! the most headroom for each outgoing call.

mod credential;
mod pool;

pub use credential::Credential;
pub use pool::{
    CredentialId, CredentialPool, CredentialStatus, Lease, PoolError, UsageReport,
    UNKNOWN_RESET,
};

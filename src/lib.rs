//! osh-harvest: resumable, quota-aware metadata harvesting for open hardware projects
//!
//! This crate fetches project metadata from rate-limited upstream APIs, merges it
//! into a canonical SQLite store and links records that describe the same project
//! across sources.

pub mod classifier;
pub mod client;
pub mod clock;
pub mod collector;
pub mod config;
pub mod credentials;
pub mod fetcher;
pub mod identity;
pub mod merger;
pub mod output;
pub mod resolver;
pub mod store;

use thiserror::Error;

/// Main error type for osh-harvest operations
///
/// Only systemic failures surface here. Per-item and per-credential problems are
/// absorbed and logged by the component that sees them.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential pool error: {0}")]
    Pool(#[from] credentials::PoolError),

    #[error("Fetch log error: {0}")]
    Log(#[from] collector::LogError),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("No fetcher registered for source '{0}'")]
    UnknownSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("No credentials configured (set `tokens`, `token-file` or ${0})")]
    NoCredentials(String),
}

/// Result type alias for osh-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use classifier::{classify, has_bom, ArtifactMatch, EntryKind, FileListingEntry};
pub use client::{RateLimitedClient, RetryPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::{Collector, FetchLog, FetchRecord, RunReport, WorkItem, WorkItemState};
pub use config::Config;
pub use credentials::{CredentialPool, Lease, UsageReport};
pub use fetcher::{FetchError, Fetcher, FetcherRegistry};
pub use identity::CanonicalIdentity;
pub use merger::{EnrichmentDelta, EnrichmentMerger, MergeReport};
pub use resolver::{DeduplicationResolver, ResolveReport};
pub use store::{CanonicalStore, CrossReference, SqliteStore};

//! Per-source fetch capability
//!
//! A [`Fetcher`] turns one work item into a raw JSON payload. Fetchers are looked
//! up by source tag in a [`FetcherRegistry`]; the collector never knows which
//! upstream it is talking to.

mod composite;
mod template;

pub use composite::{fetch_sub_resources, SubResource};
pub use template::TemplateFetcher;

use crate::classifier::{EntryKind, FileListingEntry};
use crate::client::ClientError;
use crate::collector::WorkItem;
use crate::HarvestError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Why a work item could not be fetched
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The upstream has no such item
    #[error("not found: {0}")]
    NotFound(String),

    /// A required payload was missing or not shaped as expected
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A non-retryable HTTP status
    #[error("HTTP {0}")]
    Http(u16),

    /// Transient failures outlasted the retry budget
    #[error("transient failure: {0}")]
    Transient(String),

    /// No credential becomes ready within the allowed wait
    #[error("quota deferred until {ready_at}")]
    QuotaDeferred { ready_at: DateTime<Utc> },

    /// Every credential was rejected by the upstream
    #[error("credential pool exhausted")]
    PoolExhausted,
}

impl FetchError {
    /// Returns true if the error ends the work item (it is recorded as Failed)
    ///
    /// Transient failures leave the item pending so a later pass retries it.
    pub fn is_item_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Malformed(_) | Self::Http(_))
    }

    /// Returns true if no other fetch in this pass could succeed either
    pub fn is_run_level(&self) -> bool {
        matches!(self, Self::QuotaDeferred { .. } | Self::PoolExhausted)
    }
}

impl From<ClientError> for FetchError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound { url } => FetchError::NotFound(url),
            ClientError::Fatal { status, .. } => FetchError::Http(status),
            ClientError::RetriesExhausted { .. } => FetchError::Transient(err.to_string()),
            ClientError::QuotaDeferred { ready_at } => FetchError::QuotaDeferred { ready_at },
            ClientError::PoolExhausted => FetchError::PoolExhausted,
            ClientError::InvalidHeader(_) | ClientError::Request(_) => {
                FetchError::Malformed(err.to_string())
            }
        }
    }
}

/// Fetches the raw payload of one work item from one upstream source
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches every sub-resource of `item` into one JSON payload
    async fn fetch(&self, item: &WorkItem) -> Result<Value, FetchError>;

    /// Extracts the file listing from a fetched payload
    ///
    /// The default reads a git-tree shaped `tree` sub-resource:
    /// `{"tree": {"tree": [{"path": .., "size": .., "type": "blob"}]}}`.
    fn file_listing(&self, payload: &Value) -> Vec<FileListingEntry> {
        git_tree_listing(payload)
    }
}

/// Reads a git tree listing from a payload's `tree` sub-resource
///
/// Accepts the tree object itself (`{"tree": [...]}`) nested under `tree`, or the
/// entry array directly under `tree`. Entries without a path are skipped.
pub fn git_tree_listing(payload: &Value) -> Vec<FileListingEntry> {
    let Some(tree) = payload.get("tree") else {
        return Vec::new();
    };
    let entries = match tree {
        Value::Array(entries) => entries,
        Value::Object(_) => match tree.get("tree") {
            Some(Value::Array(entries)) => entries,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| {
            let path = entry.get("path")?.as_str()?.to_string();
            let kind = match entry.get("type").and_then(Value::as_str) {
                Some("blob") => EntryKind::File,
                Some("tree") => EntryKind::Directory,
                _ => EntryKind::Other,
            };
            Some(FileListingEntry {
                path,
                size: entry.get("size").and_then(Value::as_u64),
                kind,
            })
        })
        .collect()
}

/// Fetchers keyed by source tag
#[derive(Default, Clone)]
pub struct FetcherRegistry {
    fetchers: HashMap<String, Arc<dyn Fetcher>>,
}

impl FetcherRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fetcher, replacing any previous one with the same tag
    pub fn register(&mut self, tag: impl Into<String>, fetcher: Arc<dyn Fetcher>) {
        let tag = tag.into();
        if self.fetchers.insert(tag.clone(), fetcher).is_some() {
            tracing::debug!("Replaced fetcher for source '{}'", tag);
        }
    }

    /// Looks up the fetcher for a source
    pub fn get(&self, tag: &str) -> Option<Arc<dyn Fetcher>> {
        self.fetchers.get(tag).cloned()
    }

    /// Looks up the fetcher for a source, failing if none is registered
    pub fn require(&self, tag: &str) -> Result<Arc<dyn Fetcher>, HarvestError> {
        self.get(tag)
            .ok_or_else(|| HarvestError::UnknownSource(tag.to_string()))
    }

    /// Registered source tags, sorted
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.fetchers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

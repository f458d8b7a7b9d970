/// Work item state definitions for tracking collection progress
///
/// This module defines all possible states a work item can be in during a run.
use std::fmt;

/// Represents the current state of a work item in the collection process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkItemState {
    // ===== Active States =====
    /// Item has no fetch record yet
    Pending,

    /// Item is currently being fetched
    Fetching,

    // ===== Terminal States =====
    /// Item was fetched and its record appended
    Done,

    /// Item fetch failed permanently (404, malformed payload, rejected request);
    /// a record with `ok = false` was appended
    Failed,
}

impl WorkItemState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of fetch work: an upstream identifier on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Identifier as the upstream addresses it, e.g. `owner/repo`
    pub id: String,

    /// Host the identifier belongs to, e.g. `github.com`
    pub host: String,

    pub state: WorkItemState,
}

impl WorkItem {
    /// Creates a pending work item
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            state: WorkItemState::Pending,
        }
    }
}

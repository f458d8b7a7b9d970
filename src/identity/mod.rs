//! Canonical identity of a project across sources
//!
//! Both the enrichment merger and the deduplication resolver key entities by the
//! `(host, owner, id)` triple produced here, so the two can never disagree about
//! whether two URLs name the same project.

mod normalize;

pub use normalize::{identities_in, normalize_identity};

use std::fmt;

/// Git hosts whose first path segment is the account that owns the repository
pub const CODE_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// Normalized `(host, owner, id)` triple naming one upstream project
///
/// `owner` is empty for single-segment hosts such as `osf.io`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalIdentity {
    pub host: String,
    pub owner: String,
    pub id: String,
}

impl CanonicalIdentity {
    /// Creates an identity from already-normalized parts
    pub fn new(host: impl Into<String>, owner: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            owner: owner.into(),
            id: id.into(),
        }
    }

    /// Builds the identity of a work item fetched from `host`
    ///
    /// # Arguments
    ///
    /// * `host` - The upstream host the work item belongs to (e.g. `github.com`)
    /// * `work_item_id` - The work item id, `owner/id` or a bare `id`
    ///
    /// # Returns
    ///
    /// The identity, or `None` if the id does not normalize
    pub fn from_work_item(host: &str, work_item_id: &str) -> Option<Self> {
        normalize_identity(&format!("{}/{}", host, work_item_id))
    }

    /// Returns true if `owner` names a user or organization on a git host
    pub fn is_code_host(&self) -> bool {
        CODE_HOSTS.contains(&self.host.as_str())
    }

    /// The identifier used for this project in a work list (`owner/id`, or `id`)
    pub fn work_item_id(&self) -> String {
        if self.owner.is_empty() {
            self.id.clone()
        } else {
            format!("{}/{}", self.owner, self.id)
        }
    }
}

impl fmt::Display for CanonicalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.work_item_id())
    }
}

//! Canonical store of project records
//!
//! This module handles all database operations on canonical entities, including:
//! - Entity upsert keyed by `(source, source_id)`
//! - Per-entity enrichment (metrics, artifact paths, licenses, tags, contributors)
//! - Cross-reference replacement for the deduplication pass
//! - Counts for statistics

mod schema;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteStore;
pub use traits::{CanonicalStore, StoreError, StoreResult};

use crate::identity::{identities_in, CanonicalIdentity};

/// Row id of an entity in the canonical store
pub type EntityId = i64;

/// An entity as loaded by the upstream ingestion stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewEntity {
    pub source: String,
    pub source_id: String,
    pub name: String,
    pub author: Option<String>,
    pub url: Option<String>,
    pub repo_url: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl NewEntity {
    /// Creates an entity with only its identity and name set
    pub fn new(source: impl Into<String>, source_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_repo_url(mut self, repo_url: impl Into<String>) -> Self {
        self.repo_url = Some(repo_url.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// A stored canonical entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: EntityId,
    pub source: String,
    pub source_id: String,
    pub name: String,
    pub author: Option<String>,
    pub url: Option<String>,
    pub repo_url: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl EntityRecord {
    /// Every canonical identity this entity links to
    ///
    /// Repository URLs (possibly several, comma-separated) come first, then the
    /// entity's own URL. Duplicates are dropped.
    pub fn identities(&self) -> Vec<CanonicalIdentity> {
        let mut identities = Vec::new();
        for field in [self.repo_url.as_deref(), self.url.as_deref()].into_iter().flatten() {
            for identity in identities_in(field) {
                if !identities.contains(&identity) {
                    identities.push(identity);
                }
            }
        }
        identities
    }
}

/// Fill-if-null update of an entity's descriptive columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityPatch {
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl EntityPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.created_at.is_none() && self.updated_at.is_none()
    }
}

/// Repository activity metrics, one row per entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoMetrics {
    pub repo_url: String,
    pub stars: Option<i64>,
    pub forks: Option<i64>,
    pub watchers: Option<i64>,
    pub open_issues: Option<i64>,
    /// Issues excluding pull requests
    pub total_issues: Option<i64>,
    pub open_prs: Option<i64>,
    pub closed_prs: Option<i64>,
    pub total_prs: Option<i64>,
    pub releases_count: Option<i64>,
    pub branches_count: Option<i64>,
    pub tags_count: Option<i64>,
    pub contributors_count: Option<i64>,
    pub primary_language: Option<String>,
    pub has_bom: bool,
    pub repo_size_kb: Option<i64>,
    pub total_files: Option<i64>,
    pub archived: bool,
    pub pushed_at: Option<String>,
    /// Community profile health percentage (0-100)
    pub community_health: Option<i64>,
    pub has_readme: bool,
}

/// A license attached to an entity; unique per `(entity, license_type)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LicenseRow {
    pub license_type: String,
    pub license_name: String,
}

/// A contributor attached to an entity; unique per `(entity, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContributorRow {
    pub name: String,
    pub role: Option<String>,
}

/// How a cross-reference was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchType {
    /// Both entities normalize to the same canonical identity
    IdentityExact,
    /// Same author and near-identical names
    NameAuthor,
}

impl MatchType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::IdentityExact => "identity_exact",
            Self::NameAuthor => "name_author",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "identity_exact" => Some(Self::IdentityExact),
            "name_author" => Some(Self::NameAuthor),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// A confidence-scored link between two entities, stored as an unordered pair
#[derive(Debug, Clone, PartialEq)]
pub struct CrossReference {
    /// Lower entity id of the pair
    pub entity_a: EntityId,
    /// Higher entity id of the pair
    pub entity_b: EntityId,
    pub match_type: MatchType,
    pub confidence: f64,
}

impl CrossReference {
    /// Creates a cross-reference, ordering the pair so `entity_a < entity_b`
    pub fn new(x: EntityId, y: EntityId, match_type: MatchType, confidence: f64) -> Self {
        Self {
            entity_a: x.min(y),
            entity_b: x.max(y),
            match_type,
            confidence,
        }
    }
}

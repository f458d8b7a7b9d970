//! Enrichment deltas
//!
//! A delta is every child row one fetch record contributes to one canonical
//! entity. Extraction is pure; the store decides how each part is merged.

use crate::classifier::{ArtifactMatch, EntryKind};
use crate::collector::FetchRecord;
use crate::fetcher::git_tree_listing;
use crate::identity::CanonicalIdentity;
use crate::store::{ContributorRow, EntityPatch, LicenseRow, RepoMetrics};
use serde_json::Value;
use thiserror::Error;

/// How many contributors are kept per repository
pub const TOP_CONTRIBUTORS: usize = 10;

/// License type recorded for repository licenses
pub const SOFTWARE_LICENSE: &str = "software";

/// Child rows derived from one fetch record, merged into exactly one entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentDelta {
    /// Descriptive columns, filled only where the entity has none
    pub patch: EntityPatch,

    /// Replaces the entity's metrics row
    pub metrics: Option<RepoMetrics>,

    /// Replaces the entity's artifact-path set whenever `metrics` is present
    pub artifact_paths: Vec<ArtifactMatch>,

    pub licenses: Vec<LicenseRow>,
    pub tags: Vec<String>,
    pub contributors: Vec<ContributorRow>,
}

/// The payload of a fetch record could not be turned into a delta
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed payload for '{work_item_id}': {reason}")]
pub struct MalformedPayload {
    pub work_item_id: String,
    pub reason: String,
}

/// Converts a fetch record into an enrichment delta
pub trait DeltaExtractor: Send + Sync {
    /// Builds the delta for `record`, fetched for `identity`
    fn extract(
        &self,
        record: &FetchRecord,
        identity: &CanonicalIdentity,
    ) -> Result<EnrichmentDelta, MalformedPayload>;
}

/// Extractor for repository-shaped payloads
///
/// Reads the `repository` object plus the optional `contributors`, `issues`,
/// `pulls`, `releases`, `branches`, `tags`, `topics`, `community`, `readme` and
/// `tree` sub-resources of a git hosting API.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryDeltaExtractor;

impl DeltaExtractor for RepositoryDeltaExtractor {
    fn extract(
        &self,
        record: &FetchRecord,
        identity: &CanonicalIdentity,
    ) -> Result<EnrichmentDelta, MalformedPayload> {
        let payload = &record.raw_payload;
        let repo = match payload.get("repository") {
            Some(repo @ Value::Object(_)) => repo,
            _ => {
                return Err(MalformedPayload {
                    work_item_id: record.work_item_id.clone(),
                    reason: "missing 'repository' object".to_string(),
                })
            }
        };

        let patch = EntityPatch {
            description: text(repo, "description"),
            created_at: text(repo, "created_at"),
            updated_at: text(repo, "updated_at"),
        };

        let contributors_list = array(payload, "contributors");
        let pulls = array(payload, "pulls");
        let total_files = match payload.get("tree") {
            None | Some(Value::Null) => None,
            Some(_) => Some(
                git_tree_listing(payload)
                    .iter()
                    .filter(|entry| entry.kind == EntryKind::File)
                    .count() as i64,
            ),
        };

        let metrics = RepoMetrics {
            repo_url: repo_url(identity),
            stars: int(repo, "stargazers_count"),
            forks: int(repo, "forks_count"),
            watchers: int(repo, "watchers_count"),
            open_issues: int(repo, "open_issues_count"),
            // The issues endpoint lists pull requests too
            total_issues: array(payload, "issues")
                .map(|list| list.iter().filter(|i| i.get("pull_request").is_none()).count() as i64),
            open_prs: pulls.map(|list| count_state(list, "open")),
            closed_prs: pulls.map(|list| count_state(list, "closed")),
            total_prs: pulls.map(|list| list.len() as i64),
            releases_count: array(payload, "releases").map(|a| a.len() as i64),
            branches_count: array(payload, "branches").map(|a| a.len() as i64),
            tags_count: array(payload, "tags").map(|a| a.len() as i64),
            contributors_count: contributors_list.map(|a| a.len() as i64),
            primary_language: text(repo, "language"),
            has_bom: record.has_bom,
            repo_size_kb: int(repo, "size"),
            total_files,
            archived: repo.get("archived").and_then(Value::as_bool).unwrap_or(false),
            pushed_at: text(repo, "pushed_at"),
            community_health: payload
                .get("community")
                .and_then(|c| int(c, "health_percentage")),
            has_readme: matches!(payload.get("readme"), Some(Value::Object(readme)) if !readme.is_empty()),
        };

        let licenses = license_name(repo)
            .map(|name| LicenseRow {
                license_type: SOFTWARE_LICENSE.to_string(),
                license_name: name,
            })
            .into_iter()
            .collect();

        let contributors = contributors_list
            .map(|list| list.iter().take(TOP_CONTRIBUTORS).filter_map(contributor).collect())
            .unwrap_or_default();

        Ok(EnrichmentDelta {
            patch,
            metrics: Some(metrics),
            artifact_paths: record.artifacts.clone(),
            licenses,
            tags: topics(payload, repo),
            contributors,
        })
    }
}

/// Canonical web URL of a repository identity
fn repo_url(identity: &CanonicalIdentity) -> String {
    format!("https://{}/{}", identity.host, identity.work_item_id())
}

/// Non-empty trimmed string field
fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer field, accepting numeric strings
fn int(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn array<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    value.get(key).and_then(Value::as_array)
}

fn count_state(list: &[Value], state: &str) -> i64 {
    list.iter()
        .filter(|entry| entry.get("state").and_then(Value::as_str) == Some(state))
        .count() as i64
}

/// License name from an object (`{"name": ..}`) or a bare string
fn license_name(repo: &Value) -> Option<String> {
    match repo.get("license")? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        license @ Value::Object(_) => text(license, "name"),
        _ => None,
    }
}

fn contributor(entry: &Value) -> Option<ContributorRow> {
    let name = text(entry, "login")?;
    let role = int(entry, "contributions")
        .filter(|n| *n > 0)
        .map(|n| format!("{} commits", n));
    Some(ContributorRow { name, role })
}

/// Topic names from the `topics` sub-resource, falling back to the repository's own list
fn topics(payload: &Value, repo: &Value) -> Vec<String> {
    let names = payload
        .get("topics")
        .and_then(|t| t.get("names"))
        .and_then(Value::as_array)
        .or_else(|| array(repo, "topics"));

    let mut tags: Vec<String> = Vec::new();
    for name in names.into_iter().flatten().filter_map(Value::as_str) {
        let name = name.trim();
        if !name.is_empty() && !tags.iter().any(|t| t == name) {
            tags.push(name.to_string());
        }
    }
    tags
}

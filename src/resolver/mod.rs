//! Cross-source deduplication
//!
//! Links entities from different sources that describe the same project. The
//! whole cross-reference set is recomputed on every pass and replaced in one
//! transaction, so stale links never survive a re-ingest.
//!
//! Two signals are used:
//! - `identity_exact`: both entities normalize to the same canonical identity
//! - `name_author`: same author and near-identical names, only for entities
//!   with no exact link

use crate::config::ResolverConfig;
use crate::identity::{identities_in, CanonicalIdentity};
use crate::store::{CanonicalStore, CrossReference, EntityId, EntityRecord, MatchType, StoreResult};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use strsim::jaro_winkler;

/// Confidence of an exact identity link
pub const EXACT_CONFIDENCE: f64 = 1.0;

/// Outcome of one resolver pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// `identity_exact` links stored
    pub exact: usize,

    /// `name_author` links stored
    pub weak: usize,
}

impl fmt::Display for ResolveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "identity_exact={}, name_author={}", self.exact, self.weak)
    }
}

/// Finds and stores cross-references between entities
#[derive(Debug, Clone, Copy)]
pub struct DeduplicationResolver {
    name_threshold: f64,
    name_weight: f64,
}

impl Default for DeduplicationResolver {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

type LinkKey = (EntityId, EntityId, MatchType);

impl DeduplicationResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            name_threshold: config.name_threshold,
            name_weight: config.name_weight,
        }
    }

    /// Lowercases and collapses everything but ASCII alphanumerics to single spaces
    pub fn normalize_name(input: &str) -> String {
        input
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Recomputes every cross-reference and replaces the stored set
    ///
    /// # Returns
    ///
    /// * `Ok(ResolveReport)` - Counts of links stored per match type
    /// * `Err(StoreError)` - Reading entities or writing links failed
    pub fn run(&self, store: &mut dyn CanonicalStore) -> StoreResult<ResolveReport> {
        let entities = store.list_entities()?;
        tracing::info!("Resolving cross-references over {} entities", entities.len());

        let links = self.find_links(&entities);
        let report = ResolveReport {
            exact: links
                .iter()
                .filter(|x| x.match_type == MatchType::IdentityExact)
                .count(),
            weak: links
                .iter()
                .filter(|x| x.match_type == MatchType::NameAuthor)
                .count(),
        };

        let stored = store.replace_cross_references(&links)?;
        if stored != links.len() {
            tracing::warn!("Stored {} of {} cross-references", stored, links.len());
        }

        tracing::info!("Resolve complete: {}", report);
        Ok(report)
    }

    /// Computes the cross-reference set for `entities`
    ///
    /// Output is sorted by pair and match type with every unordered pair
    /// appearing at most once per match type, so the same input always yields
    /// the same links.
    pub fn find_links(&self, entities: &[EntityRecord]) -> Vec<CrossReference> {
        let mut links: BTreeMap<LinkKey, f64> = BTreeMap::new();
        let linked = self.exact_links(entities, &mut links);
        self.weak_links(entities, &linked, &mut links);

        links
            .into_iter()
            .map(|((a, b, match_type), confidence)| CrossReference::new(a, b, match_type, confidence))
            .collect()
    }

    /// Emits `identity_exact` links and returns every entity that got one
    fn exact_links(
        &self,
        entities: &[EntityRecord],
        links: &mut BTreeMap<LinkKey, f64>,
    ) -> HashSet<EntityId> {
        let mut groups: BTreeMap<CanonicalIdentity, Vec<&EntityRecord>> = BTreeMap::new();
        for entity in entities {
            for identity in entity.identities() {
                groups.entry(identity).or_default().push(entity);
            }
        }

        let mut linked = HashSet::new();
        for (identity, members) in &groups {
            // One representative per source: the lowest id
            let mut representatives: BTreeMap<&str, EntityId> = BTreeMap::new();
            for entity in members {
                let slot = representatives.entry(entity.source.as_str()).or_insert(entity.id);
                *slot = (*slot).min(entity.id);
            }
            if representatives.len() < 2 {
                continue;
            }

            let ids: Vec<EntityId> = representatives.values().copied().collect();
            tracing::debug!("{} is shared by entities {:?}", identity, ids);
            for (i, a) in ids.iter().enumerate() {
                for b in &ids[i + 1..] {
                    links.insert(
                        (*a.min(b), *a.max(b), MatchType::IdentityExact),
                        EXACT_CONFIDENCE,
                    );
                }
            }
            linked.extend(members.iter().map(|e| e.id));
        }
        linked
    }

    /// Emits `name_author` links among entities without an exact link
    fn weak_links(
        &self,
        entities: &[EntityRecord],
        linked: &HashSet<EntityId>,
        links: &mut BTreeMap<LinkKey, f64>,
    ) {
        let mut by_author: BTreeMap<String, Vec<(&EntityRecord, String)>> = BTreeMap::new();
        for entity in entities.iter().filter(|e| !linked.contains(&e.id)) {
            let name = Self::normalize_name(&entity.name);
            let Some(author) = author_key(entity) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            by_author.entry(author).or_default().push((entity, name));
        }

        for candidates in by_author.values() {
            for (i, (a, name_a)) in candidates.iter().enumerate() {
                for (b, name_b) in &candidates[i + 1..] {
                    if a.source == b.source {
                        continue;
                    }
                    let similarity = jaro_winkler(name_a, name_b);
                    if similarity < self.name_threshold {
                        continue;
                    }
                    let key = (a.id.min(b.id), a.id.max(b.id), MatchType::NameAuthor);
                    links.insert(key, self.name_weight * similarity);
                }
            }
        }
    }
}

/// Normalized author of an entity
///
/// Falls back to the owner of the first git-host repository URL. Other URL
/// path segments (e.g. `hackaday.io/project/..`) do not name a person.
fn author_key(entity: &EntityRecord) -> Option<String> {
    entity
        .author
        .as_deref()
        .map(DeduplicationResolver::normalize_name)
        .filter(|a| !a.is_empty())
        .or_else(|| {
            identities_in(entity.repo_url.as_deref()?)
                .into_iter()
                .filter(CanonicalIdentity::is_code_host)
                .map(|identity| DeduplicationResolver::normalize_name(&identity.owner))
                .find(|owner| !owner.is_empty())
        })
}

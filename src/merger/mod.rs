//! Enrichment merger
//!
//! Applies fetch records to the canonical store. Each record is matched to
//! exactly one entity through its canonical identity; records that match no
//! entity or several entities are skipped and logged, never guessed.

mod delta;

pub use delta::{
    DeltaExtractor, EnrichmentDelta, MalformedPayload, RepositoryDeltaExtractor, SOFTWARE_LICENSE,
    TOP_CONTRIBUTORS,
};

use crate::collector::{FetchLog, FetchRecord};
use crate::identity::CanonicalIdentity;
use crate::store::{CanonicalStore, EntityId, StoreResult};
use crate::HarvestError;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Outcome of one merge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Deltas applied to an entity
    pub applied: usize,

    /// Records whose identity matched no entity
    pub skipped_no_match: usize,

    /// Records whose identity matched more than one entity
    pub skipped_ambiguous: usize,

    /// Records of failed fetches
    pub skipped_failed: usize,

    /// Records whose id or payload could not be interpreted
    pub skipped_malformed: usize,
}

impl MergeReport {
    /// Total records skipped for any reason
    pub fn skipped(&self) -> usize {
        self.skipped_no_match + self.skipped_ambiguous + self.skipped_failed + self.skipped_malformed
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied={}, no_match={}, ambiguous={}, failed={}, malformed={}",
            self.applied,
            self.skipped_no_match,
            self.skipped_ambiguous,
            self.skipped_failed,
            self.skipped_malformed
        )
    }
}

/// Merges fetch records into canonical entities
pub struct EnrichmentMerger {
    extractor: Box<dyn DeltaExtractor>,
    default_host: Option<String>,
}

impl Default for EnrichmentMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrichmentMerger {
    /// Creates a merger for repository-shaped payloads
    pub fn new() -> Self {
        Self::with_extractor(Box::new(RepositoryDeltaExtractor))
    }

    /// Creates a merger with a custom payload extractor
    pub fn with_extractor(extractor: Box<dyn DeltaExtractor>) -> Self {
        Self {
            extractor,
            default_host: None,
        }
    }

    /// Host assumed for records that carry none
    pub fn with_default_host(mut self, host: impl Into<String>) -> Self {
        self.default_host = Some(host.into());
        self
    }

    /// Merges every record of the fetch log at `path`
    pub fn run_log(
        &self,
        path: &Path,
        store: &mut dyn CanonicalStore,
    ) -> Result<MergeReport, HarvestError> {
        let records = FetchLog::read_records(path)?;
        tracing::info!("Merging {} fetch record(s) from {}", records.len(), path.display());
        Ok(self.run(&records, store)?)
    }

    /// Merges `records` into `store`
    ///
    /// The identity index is built once from the store's entities. Each applied
    /// delta runs in its own transaction, so the pass can be interrupted and
    /// repeated; applying a record again leaves the entity unchanged.
    ///
    /// # Returns
    ///
    /// * `Ok(MergeReport)` - Counts of applied and skipped records
    /// * `Err(StoreError)` - A store write failed; earlier deltas stay applied
    pub fn run(
        &self,
        records: &[FetchRecord],
        store: &mut dyn CanonicalStore,
    ) -> StoreResult<MergeReport> {
        let index = identity_index(store)?;
        let mut report = MergeReport::default();

        for record in records {
            if !record.ok {
                tracing::debug!("Skipping failed fetch of '{}'", record.work_item_id);
                report.skipped_failed += 1;
                continue;
            }

            let host = if record.host.is_empty() {
                self.default_host.as_deref().unwrap_or_default()
            } else {
                record.host.as_str()
            };

            let Some(identity) = CanonicalIdentity::from_work_item(host, &record.work_item_id)
            else {
                tracing::warn!(
                    "Cannot derive an identity for '{}' on '{}'",
                    record.work_item_id,
                    host
                );
                report.skipped_malformed += 1;
                continue;
            };

            let id = match index.get(&identity).map(Vec::as_slice) {
                None | Some([]) => {
                    tracing::warn!("No match for {}, skipping delta", identity);
                    report.skipped_no_match += 1;
                    continue;
                }
                Some([id]) => *id,
                Some(ids) => {
                    tracing::warn!(
                        "Ambiguous match for {} ({} entities: {:?}), skipping delta",
                        identity,
                        ids.len(),
                        ids
                    );
                    report.skipped_ambiguous += 1;
                    continue;
                }
            };

            let delta = match self.extractor.extract(record, &identity) {
                Ok(delta) => delta,
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.skipped_malformed += 1;
                    continue;
                }
            };

            store.apply_delta(id, &delta)?;
            tracing::debug!("Applied delta for {} to entity {}", identity, id);
            report.applied += 1;
        }

        tracing::info!("Merge complete: {}", report);
        Ok(report)
    }
}

/// Maps every canonical identity to the entities that carry it
fn identity_index(
    store: &dyn CanonicalStore,
) -> StoreResult<HashMap<CanonicalIdentity, Vec<EntityId>>> {
    let mut index: HashMap<CanonicalIdentity, Vec<EntityId>> = HashMap::new();
    for entity in store.list_entities()? {
        for identity in entity.identities() {
            index.entry(identity).or_default().push(entity.id);
        }
    }
    Ok(index)
}

//! Store traits and error types
//!
//! This module defines the trait interface for canonical store backends and
//! associated error types.

use crate::merger::EnrichmentDelta;
use crate::store::{
    ContributorRow, CrossReference, EntityId, EntityRecord, LicenseRow, NewEntity, RepoMetrics,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for canonical store implementations
///
/// Entities are created by the ingestion stage; the harvest pipeline only
/// enriches their child rows and links them to each other.
pub trait CanonicalStore {
    // ===== Entities =====

    /// Inserts an entity or updates the existing one with the same `(source, source_id)`
    ///
    /// # Returns
    ///
    /// The entity ID (either newly created or existing)
    fn upsert_entity(&mut self, entity: &NewEntity) -> StoreResult<EntityId>;

    /// Gets an entity by ID
    fn get_entity(&self, id: EntityId) -> StoreResult<EntityRecord>;

    /// Gets every entity, ordered by ID
    fn list_entities(&self) -> StoreResult<Vec<EntityRecord>>;

    /// Gets every entity that has no metrics row yet, ordered by ID
    fn entities_without_metrics(&self) -> StoreResult<Vec<EntityRecord>>;

    // ===== Enrichment =====

    /// Applies one enrichment delta to an entity inside a single transaction
    ///
    /// Descriptive columns are filled only where null, the metrics row is
    /// replaced, the artifact-path set is replaced, and licenses, tags and
    /// contributors are inserted only if absent. Applying the same delta again
    /// leaves the entity unchanged.
    fn apply_delta(&mut self, id: EntityId, delta: &EnrichmentDelta) -> StoreResult<()>;

    /// Checks if an entity has a metrics row
    fn has_metrics(&self, id: EntityId) -> StoreResult<bool>;

    /// Gets the metrics row of an entity
    fn get_metrics(&self, id: EntityId) -> StoreResult<Option<RepoMetrics>>;

    /// Gets the artifact paths of an entity, sorted
    fn artifact_paths(&self, id: EntityId) -> StoreResult<Vec<String>>;

    /// Gets the licenses of an entity, sorted
    fn licenses(&self, id: EntityId) -> StoreResult<Vec<LicenseRow>>;

    /// Gets the tags of an entity, sorted
    fn tags(&self, id: EntityId) -> StoreResult<Vec<String>>;

    /// Gets the contributors of an entity, sorted by name
    fn contributors(&self, id: EntityId) -> StoreResult<Vec<ContributorRow>>;

    // ===== Cross References =====

    /// Replaces the whole cross-reference set inside a single transaction
    ///
    /// # Returns
    ///
    /// The number of rows stored after duplicates are dropped
    fn replace_cross_references(&mut self, xrefs: &[CrossReference]) -> StoreResult<usize>;

    /// Gets every cross-reference, ordered by pair and match type
    fn list_cross_references(&self) -> StoreResult<Vec<CrossReference>>;

    // ===== Statistics =====

    /// Counts entities per source
    fn count_entities_by_source(&self) -> StoreResult<HashMap<String, u64>>;

    /// Counts entities that have a metrics row
    fn count_entities_with_metrics(&self) -> StoreResult<u64>;

    /// Counts entities that have at least one artifact path
    fn count_entities_with_artifacts(&self) -> StoreResult<u64>;

    /// Counts cross-references per match type
    fn count_cross_references_by_type(&self) -> StoreResult<HashMap<String, u64>>;
}

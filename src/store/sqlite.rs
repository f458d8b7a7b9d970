//! SQLite store implementation
//!
//! This module provides a SQLite-based implementation of the CanonicalStore trait.

use crate::merger::EnrichmentDelta;
use crate::store::schema::initialize_schema;
use crate::store::traits::{CanonicalStore, StoreError, StoreResult};
use crate::store::{
    ContributorRow, CrossReference, EntityId, EntityRecord, LicenseRow, MatchType, NewEntity,
    RepoMetrics,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::Path;

const ENTITY_COLUMNS: &str = "id, source, source_id, name, author, url, repo_url, description, created_at, updated_at";

/// SQLite store backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a store database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<EntityRecord> {
        Ok(EntityRecord {
            id: row.get(0)?,
            source: row.get(1)?,
            source_id: row.get(2)?,
            name: row.get(3)?,
            author: row.get(4)?,
            url: row.get(5)?,
            repo_url: row.get(6)?,
            description: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn query_entities(&self, sql: &str) -> StoreResult<Vec<EntityRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let entities = stmt
            .query_map([], Self::entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn count(&self, sql: &str) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_grouped(&self, sql: &str) -> StoreResult<HashMap<String, u64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(counts)
    }
}

fn write_delta(tx: &Transaction<'_>, id: EntityId, delta: &EnrichmentDelta) -> StoreResult<()> {
    let patch = &delta.patch;
    if !patch.is_empty() {
        tx.execute(
            "UPDATE entities SET
                description = COALESCE(description, ?1),
                created_at = COALESCE(created_at, ?2),
                updated_at = COALESCE(updated_at, ?3)
             WHERE id = ?4",
            params![patch.description, patch.created_at, patch.updated_at, id],
        )?;
    }

    if let Some(m) = &delta.metrics {
        tx.execute(
            "INSERT INTO repo_metrics (
                entity_id, repo_url, stars, forks, watchers, open_issues, total_issues,
                open_prs, closed_prs, total_prs, releases_count, branches_count, tags_count,
                contributors_count, primary_language, has_bom, repo_size_kb, total_files,
                archived, pushed_at, community_health, has_readme
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                       ?17, ?18, ?19, ?20, ?21, ?22)
             ON CONFLICT(entity_id) DO UPDATE SET
                repo_url = excluded.repo_url,
                stars = excluded.stars,
                forks = excluded.forks,
                watchers = excluded.watchers,
                open_issues = excluded.open_issues,
                total_issues = excluded.total_issues,
                open_prs = excluded.open_prs,
                closed_prs = excluded.closed_prs,
                total_prs = excluded.total_prs,
                releases_count = excluded.releases_count,
                branches_count = excluded.branches_count,
                tags_count = excluded.tags_count,
                contributors_count = excluded.contributors_count,
                primary_language = excluded.primary_language,
                has_bom = excluded.has_bom,
                repo_size_kb = excluded.repo_size_kb,
                total_files = excluded.total_files,
                archived = excluded.archived,
                pushed_at = excluded.pushed_at,
                community_health = excluded.community_health,
                has_readme = excluded.has_readme",
            params![
                id,
                m.repo_url,
                m.stars,
                m.forks,
                m.watchers,
                m.open_issues,
                m.total_issues,
                m.open_prs,
                m.closed_prs,
                m.total_prs,
                m.releases_count,
                m.branches_count,
                m.tags_count,
                m.contributors_count,
                m.primary_language,
                m.has_bom,
                m.repo_size_kb,
                m.total_files,
                m.archived,
                m.pushed_at,
                m.community_health,
                m.has_readme,
            ],
        )?;

        // Listings change over time; stale paths must not survive a re-fetch
        tx.execute("DELETE FROM artifact_paths WHERE entity_id = ?1", params![id])?;
        for artifact in &delta.artifact_paths {
            tx.execute(
                "INSERT OR IGNORE INTO artifact_paths (entity_id, file_path, rule_id) VALUES (?1, ?2, ?3)",
                params![id, artifact.path, artifact.rule_id],
            )?;
        }
    }

    for license in &delta.licenses {
        tx.execute(
            "INSERT OR IGNORE INTO licenses (entity_id, license_type, license_name) VALUES (?1, ?2, ?3)",
            params![id, license.license_type, license.license_name],
        )?;
    }

    for tag in &delta.tags {
        tx.execute(
            "INSERT OR IGNORE INTO tags (entity_id, tag) VALUES (?1, ?2)",
            params![id, tag],
        )?;
    }

    for contributor in &delta.contributors {
        tx.execute(
            "INSERT OR IGNORE INTO contributors (entity_id, name, role) VALUES (?1, ?2, ?3)",
            params![id, contributor.name, contributor.role],
        )?;
    }

    Ok(())
}

impl CanonicalStore for SqliteStore {
    // ===== Entities =====

    fn upsert_entity(&mut self, entity: &NewEntity) -> StoreResult<EntityId> {
        self.conn.execute(
            "INSERT INTO entities
                (source, source_id, name, author, url, repo_url, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(source, source_id) DO UPDATE SET
                name = excluded.name,
                author = COALESCE(excluded.author, author),
                url = COALESCE(excluded.url, url),
                repo_url = COALESCE(excluded.repo_url, repo_url),
                description = COALESCE(excluded.description, description),
                created_at = COALESCE(excluded.created_at, created_at),
                updated_at = COALESCE(excluded.updated_at, updated_at)",
            params![
                entity.source,
                entity.source_id,
                entity.name,
                entity.author,
                entity.url,
                entity.repo_url,
                entity.description,
                entity.created_at,
                entity.updated_at,
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM entities WHERE source = ?1 AND source_id = ?2",
            params![entity.source, entity.source_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_entity(&self, id: EntityId) -> StoreResult<EntityRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM entities WHERE id = ?1", ENTITY_COLUMNS),
                params![id],
                Self::entity_from_row,
            )
            .optional()?
            .ok_or(StoreError::EntityNotFound(id))
    }

    fn list_entities(&self) -> StoreResult<Vec<EntityRecord>> {
        self.query_entities(&format!("SELECT {} FROM entities ORDER BY id", ENTITY_COLUMNS))
    }

    fn entities_without_metrics(&self) -> StoreResult<Vec<EntityRecord>> {
        self.query_entities(&format!(
            "SELECT {} FROM entities
             WHERE id NOT IN (SELECT entity_id FROM repo_metrics)
             ORDER BY id",
            ENTITY_COLUMNS
        ))
    }

    // ===== Enrichment =====

    fn apply_delta(&mut self, id: EntityId, delta: &EnrichmentDelta) -> StoreResult<()> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT id FROM entities WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::EntityNotFound(id));
        }

        let tx = self.conn.transaction()?;
        write_delta(&tx, id, delta)?;
        tx.commit()?;
        Ok(())
    }

    fn has_metrics(&self, id: EntityId) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT entity_id FROM repo_metrics WHERE entity_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_metrics(&self, id: EntityId) -> StoreResult<Option<RepoMetrics>> {
        let metrics = self
            .conn
            .query_row(
                "SELECT repo_url, stars, forks, watchers, open_issues, total_issues, open_prs,
                        closed_prs, total_prs, releases_count, branches_count, tags_count,
                        contributors_count, primary_language, has_bom, repo_size_kb,
                        total_files, archived, pushed_at, community_health, has_readme
                 FROM repo_metrics WHERE entity_id = ?1",
                params![id],
                |row| {
                    Ok(RepoMetrics {
                        repo_url: row.get(0)?,
                        stars: row.get(1)?,
                        forks: row.get(2)?,
                        watchers: row.get(3)?,
                        open_issues: row.get(4)?,
                        total_issues: row.get(5)?,
                        open_prs: row.get(6)?,
                        closed_prs: row.get(7)?,
                        total_prs: row.get(8)?,
                        releases_count: row.get(9)?,
                        branches_count: row.get(10)?,
                        tags_count: row.get(11)?,
                        contributors_count: row.get(12)?,
                        primary_language: row.get(13)?,
                        has_bom: row.get(14)?,
                        repo_size_kb: row.get(15)?,
                        total_files: row.get(16)?,
                        archived: row.get(17)?,
                        pushed_at: row.get(18)?,
                        community_health: row.get(19)?,
                        has_readme: row.get(20)?,
                    })
                },
            )
            .optional()?;
        Ok(metrics)
    }

    fn artifact_paths(&self, id: EntityId) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_path FROM artifact_paths WHERE entity_id = ?1 ORDER BY file_path")?;
        let paths = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    fn licenses(&self, id: EntityId) -> StoreResult<Vec<LicenseRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT license_type, license_name FROM licenses WHERE entity_id = ?1
             ORDER BY license_type, license_name",
        )?;
        let licenses = stmt
            .query_map(params![id], |row| {
                Ok(LicenseRow {
                    license_type: row.get(0)?,
                    license_name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(licenses)
    }

    fn tags(&self, id: EntityId) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM tags WHERE entity_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn contributors(&self, id: EntityId) -> StoreResult<Vec<ContributorRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, role FROM contributors WHERE entity_id = ?1 ORDER BY name")?;
        let contributors = stmt
            .query_map(params![id], |row| {
                Ok(ContributorRow {
                    name: row.get(0)?,
                    role: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(contributors)
    }

    // ===== Cross References =====

    fn replace_cross_references(&mut self, xrefs: &[CrossReference]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM cross_references", [])?;

        let mut stored = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO cross_references (entity_a, entity_b, match_type, confidence)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for xref in xrefs {
                if xref.entity_a == xref.entity_b {
                    continue;
                }
                let (a, b) = (xref.entity_a.min(xref.entity_b), xref.entity_a.max(xref.entity_b));
                stored += stmt.execute(params![a, b, xref.match_type.to_db_string(), xref.confidence])?;
            }
        }

        tx.commit()?;
        Ok(stored)
    }

    fn list_cross_references(&self) -> StoreResult<Vec<CrossReference>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_a, entity_b, match_type, confidence FROM cross_references
             ORDER BY entity_a, entity_b, match_type",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, EntityId>(0)?,
                    row.get::<_, EntityId>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(a, b, match_type, confidence)| {
                let match_type = MatchType::from_db_string(&match_type).ok_or_else(|| {
                    StoreError::Database(format!("Unknown match type '{}'", match_type))
                })?;
                Ok(CrossReference {
                    entity_a: a,
                    entity_b: b,
                    match_type,
                    confidence,
                })
            })
            .collect()
    }

    // ===== Statistics =====

    fn count_entities_by_source(&self) -> StoreResult<HashMap<String, u64>> {
        self.count_grouped("SELECT source, COUNT(*) FROM entities GROUP BY source")
    }

    fn count_entities_with_metrics(&self) -> StoreResult<u64> {
        self.count("SELECT COUNT(*) FROM repo_metrics")
    }

    fn count_entities_with_artifacts(&self) -> StoreResult<u64> {
        self.count("SELECT COUNT(DISTINCT entity_id) FROM artifact_paths")
    }

    fn count_cross_references_by_type(&self) -> StoreResult<HashMap<String, u64>> {
        self.count_grouped("SELECT match_type, COUNT(*) FROM cross_references GROUP BY match_type")
    }
}

//! Statistics generation from the canonical store and fetch logs
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics.

use crate::collector::FetchRecord;
use crate::store::{CanonicalStore, StoreResult};
use std::collections::HashMap;

/// Canonical store statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Total number of entities
    pub total_entities: u64,

    /// Count of entities by source tag
    pub entities_by_source: HashMap<String, u64>,

    /// Entities that have a metrics row
    pub entities_with_metrics: u64,

    /// Entities with at least one flagged artifact path
    pub entities_with_artifacts: u64,

    /// Count of cross-references by match type
    pub cross_references_by_type: HashMap<String, u64>,
}

/// Summary of one fetch log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStatistics {
    pub records: u64,
    pub ok: u64,
    pub failed: u64,
    pub with_bom: u64,
}

impl LogStatistics {
    /// Tallies a sequence of fetch records
    pub fn from_records(records: &[FetchRecord]) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.records += 1;
            if record.ok {
                stats.ok += 1;
            } else {
                stats.failed += 1;
            }
            if record.has_bom {
                stats.with_bom += 1;
            }
        }
        stats
    }
}

/// Loads statistics from the store
///
/// # Arguments
///
/// * `store` - The store backend to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(StoreError)` - Failed to query statistics
pub fn load_statistics(store: &dyn CanonicalStore) -> StoreResult<StoreStatistics> {
    let entities_by_source = store.count_entities_by_source()?;

    Ok(StoreStatistics {
        total_entities: entities_by_source.values().sum(),
        entities_by_source,
        entities_with_metrics: store.count_entities_with_metrics()?,
        entities_with_artifacts: store.count_entities_with_artifacts()?,
        cross_references_by_type: store.count_cross_references_by_type()?,
    })
}

/// Prints store statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Total entities: {}", stats.total_entities);
    println!(
        "  With metrics: {} ({:.1}%)",
        stats.entities_with_metrics,
        percentage(stats.entities_with_metrics, stats.total_entities)
    );
    println!(
        "  With BOM artifacts: {} ({:.1}%)",
        stats.entities_with_artifacts,
        percentage(stats.entities_with_artifacts, stats.total_entities)
    );
    println!();

    println!("Entities by Source:");
    let mut sources: Vec<_> = stats.entities_by_source.iter().collect();
    sources.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (source, count) in sources {
        println!("  {}: {}", source, count);
    }
    println!();

    if !stats.cross_references_by_type.is_empty() {
        println!("Cross-References:");
        let mut types: Vec<_> = stats.cross_references_by_type.iter().collect();
        types.sort_by(|a, b| a.0.cmp(b.0));
        for (match_type, count) in types {
            println!("  {}: {}", match_type, count);
        }
        println!();
    }
}

/// Prints one fetch log summary to stdout
pub fn print_log_statistics(source: &str, stats: &LogStatistics) {
    println!(
        "Fetch log '{}': {} records ({} ok, {} failed, {} with BOM)",
        source, stats.records, stats.ok, stats.failed, stats.with_bom
    );
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::WorkItem;
    use crate::store::{CrossReference, MatchType, NewEntity, SqliteStore};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_load_statistics() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let a = store.upsert_entity(&NewEntity::new("ohr", "1", "Widget")).unwrap();
        store.upsert_entity(&NewEntity::new("ohr", "2", "Gizmo")).unwrap();
        let c = store.upsert_entity(&NewEntity::new("hackaday", "9", "Widget")).unwrap();
        store
            .replace_cross_references(&[CrossReference::new(a, c, MatchType::IdentityExact, 1.0)])
            .unwrap();

        let stats = load_statistics(&store).unwrap();

        assert_eq!(stats.total_entities, 3);
        assert_eq!(stats.entities_by_source.get("ohr"), Some(&2));
        assert_eq!(stats.entities_with_metrics, 0);
        assert_eq!(stats.cross_references_by_type.get("identity_exact"), Some(&1));
    }

    #[test]
    fn test_empty_store_statistics() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert_eq!(load_statistics(&store).unwrap(), StoreStatistics::default());
    }

    #[test]
    fn test_log_statistics() {
        let item = WorkItem::new("acme/widget", "github.com");
        let mut with_bom = FetchRecord::success(&item, Utc::now(), json!({}), Vec::new());
        with_bom.has_bom = true;
        let records = vec![
            with_bom,
            FetchRecord::success(&WorkItem::new("acme/gizmo", "github.com"), Utc::now(), json!({}), Vec::new()),
            FetchRecord::failure(&WorkItem::new("acme/gone", "github.com"), Utc::now(), "not found"),
        ];

        let stats = LogStatistics::from_records(&records);

        assert_eq!(
            stats,
            LogStatistics {
                records: 3,
                ok: 2,
                failed: 1,
                with_bom: 1,
            }
        );
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 4), 25.0);
        assert_eq!(percentage(3, 0), 0.0);
    }
}

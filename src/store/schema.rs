//! Reference schema for the canonical store
//!
//! The production database is owned by the ingestion stage; this DDL matches it
//! closely enough for local runs and tests.

/// SQL schema for the canonical store
pub const SCHEMA_SQL: &str = r#"
-- Canonical entities, one per (source, source_id)
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    source_id TEXT NOT NULL,
    name TEXT NOT NULL,
    author TEXT,
    url TEXT,
    repo_url TEXT,
    description TEXT,
    created_at TEXT,
    updated_at TEXT,
    UNIQUE(source, source_id)
);

CREATE INDEX IF NOT EXISTS idx_entities_source ON entities(source);
CREATE INDEX IF NOT EXISTS idx_entities_repo ON entities(repo_url);

CREATE TABLE IF NOT EXISTS licenses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL REFERENCES entities(id),
    license_type TEXT NOT NULL,
    license_name TEXT NOT NULL,
    UNIQUE(entity_id, license_type)
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL REFERENCES entities(id),
    tag TEXT NOT NULL,
    UNIQUE(entity_id, tag)
);

CREATE TABLE IF NOT EXISTS contributors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL REFERENCES entities(id),
    name TEXT NOT NULL,
    role TEXT,
    UNIQUE(entity_id, name)
);

-- One metrics row per entity, replaced on every enrichment
CREATE TABLE IF NOT EXISTS repo_metrics (
    entity_id INTEGER PRIMARY KEY REFERENCES entities(id),
    repo_url TEXT NOT NULL,
    stars INTEGER,
    forks INTEGER,
    watchers INTEGER,
    open_issues INTEGER,
    total_issues INTEGER,
    open_prs INTEGER,
    closed_prs INTEGER,
    total_prs INTEGER,
    releases_count INTEGER,
    branches_count INTEGER,
    tags_count INTEGER,
    contributors_count INTEGER,
    primary_language TEXT,
    has_bom INTEGER NOT NULL DEFAULT 0,
    repo_size_kb INTEGER,
    total_files INTEGER,
    archived INTEGER NOT NULL DEFAULT 0,
    pushed_at TEXT,
    community_health INTEGER,
    has_readme INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS artifact_paths (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL REFERENCES entities(id),
    file_path TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    UNIQUE(entity_id, file_path)
);

CREATE INDEX IF NOT EXISTS idx_artifact_paths_entity ON artifact_paths(entity_id);

-- Unordered entity pairs, stored with entity_a < entity_b
CREATE TABLE IF NOT EXISTS cross_references (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_a INTEGER NOT NULL REFERENCES entities(id),
    entity_b INTEGER NOT NULL REFERENCES entities(id),
    match_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    CHECK(entity_a < entity_b),
    UNIQUE(entity_a, entity_b, match_type)
);

CREATE INDEX IF NOT EXISTS idx_xref_a ON cross_references(entity_a);
CREATE INDEX IF NOT EXISTS idx_xref_b ON cross_references(entity_b);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

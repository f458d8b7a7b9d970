//! Durable fetch record log
//!
//! One JSON object per line, append-only. The set of work item ids present in the
//! log is the only resume checkpoint: an id with a record is never fetched again.

use crate::classifier::ArtifactMatch;
use crate::collector::WorkItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the fetch log
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Fetch log IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize fetch record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt fetch log at line {line}: {message}")]
    Corrupt { line: usize, message: String },

    #[error("Work item '{0}' already has a fetch record")]
    Duplicate(String),
}

/// Immutable result of fetching one work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub work_item_id: String,

    #[serde(default)]
    pub host: String,

    pub fetched_at: DateTime<Utc>,

    #[serde(default)]
    pub raw_payload: Value,

    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub has_bom: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactMatch>,
}

impl FetchRecord {
    /// Record of a successful fetch
    pub fn success(
        item: &WorkItem,
        fetched_at: DateTime<Utc>,
        payload: Value,
        artifacts: Vec<ArtifactMatch>,
    ) -> Self {
        Self {
            work_item_id: item.id.clone(),
            host: item.host.clone(),
            fetched_at,
            raw_payload: payload,
            ok: true,
            error: None,
            has_bom: crate::classifier::has_bom(&artifacts),
            artifacts,
        }
    }

    /// Record of a permanently failed fetch
    pub fn failure(item: &WorkItem, fetched_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            work_item_id: item.id.clone(),
            host: item.host.clone(),
            fetched_at,
            raw_payload: Value::Null,
            ok: false,
            error: Some(error.into()),
            has_bom: false,
            artifacts: Vec::new(),
        }
    }
}

/// Append-only JSON-lines log of fetch records
pub struct FetchLog {
    path: PathBuf,
    file: File,
    completed: HashSet<String>,
    needs_newline: bool,
}

struct ParsedLog {
    records: Vec<FetchRecord>,
    torn_at: Option<u64>,
    missing_newline: bool,
}

impl FetchLog {
    /// Opens (or creates) a fetch log and indexes the ids it already holds
    ///
    /// A torn final line left by a crash mid-write is dropped from the file. A
    /// corrupt line anywhere else is an error.
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the `.jsonl` log file; parent directories are created
    ///
    /// # Returns
    ///
    /// * `Ok(FetchLog)` - Log ready for appends
    /// * `Err(LogError)` - The file could not be read or is corrupt
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = read_if_exists(&path)?;
        let parsed = parse_log(&bytes, &path)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if let Some(offset) = parsed.torn_at {
            file.set_len(offset)?;
            file.sync_data()?;
        }

        let mut completed = HashSet::with_capacity(parsed.records.len());
        for record in &parsed.records {
            if !completed.insert(record.work_item_id.clone()) {
                tracing::warn!(
                    "Fetch log {} holds more than one record for '{}'",
                    path.display(),
                    record.work_item_id
                );
            }
        }

        tracing::info!(
            "Opened fetch log {} with {} completed item(s)",
            path.display(),
            completed.len()
        );

        Ok(Self {
            path,
            file,
            completed,
            needs_newline: parsed.missing_newline,
        })
    }

    /// Appends one record and syncs it to disk before returning
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The record is durable
    /// * `Err(LogError::Duplicate)` - The work item already has a record
    /// * `Err(LogError)` - The write failed
    pub fn append(&mut self, record: &FetchRecord) -> Result<(), LogError> {
        if self.completed.contains(&record.work_item_id) {
            return Err(LogError::Duplicate(record.work_item_id.clone()));
        }

        let mut line = String::new();
        if self.needs_newline {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(record)?);
        line.push('\n');

        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;

        self.needs_newline = false;
        self.completed.insert(record.work_item_id.clone());
        Ok(())
    }

    /// Returns true if the work item already has a record
    pub fn contains(&self, work_item_id: &str) -> bool {
        self.completed.contains(work_item_id)
    }

    /// Number of records in the log
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record in append order
    pub fn records(&self) -> Result<Vec<FetchRecord>, LogError> {
        Self::read_records(&self.path)
    }

    /// Reads every record of the log at `path` without opening it for writing
    ///
    /// A missing file reads as an empty log.
    pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<FetchRecord>, LogError> {
        let path = path.as_ref();
        let bytes = read_if_exists(path)?;
        Ok(parse_log(&bytes, path)?.records)
    }
}

fn read_if_exists(path: &Path) -> Result<Vec<u8>, LogError> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn parse_log(bytes: &[u8], path: &Path) -> Result<ParsedLog, LogError> {
    let is_blank = |line: &[u8]| line.iter().all(u8::is_ascii_whitespace);
    let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    let last_content = lines.iter().rposition(|line| !is_blank(line));

    let mut records = Vec::new();
    let mut torn_at = None;
    let mut offset = 0u64;

    for (index, line) in lines.iter().enumerate() {
        let start = offset;
        offset += line.len() as u64 + 1;

        if is_blank(line) {
            continue;
        }

        match serde_json::from_slice::<FetchRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) if Some(index) == last_content => {
                tracing::warn!(
                    "Ignoring torn final line {} of {}: {}",
                    index + 1,
                    path.display(),
                    e
                );
                torn_at = Some(start);
            }
            Err(e) => {
                return Err(LogError::Corrupt {
                    line: index + 1,
                    message: e.to_string(),
                })
            }
        }
    }

    let missing_newline = torn_at.is_none() && bytes.last().is_some_and(|b| *b != b'\n');

    Ok(ParsedLog {
        records,
        torn_at,
        missing_newline,
    })
}

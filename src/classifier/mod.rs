//! Artifact classifier
//!
//! Flags bill-of-materials files in a fetched file listing by matching file names
//! against a small fixed rule table. Matching is case-insensitive and looks only at
//! the last path segment of file entries.

mod rules;

pub use rules::{matches_glob, Rule, DATA_EXTENSIONS, RULES, TABLE_EXTENSIONS};

use serde::{Deserialize, Serialize};

/// Kind of entry in a file listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One entry of a fetched file listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListingEntry {
    pub path: String,
    pub size: Option<u64>,
    pub kind: EntryKind,
}

impl FileListingEntry {
    /// Creates a file entry with unknown size
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            kind: EntryKind::File,
        }
    }

    /// Last path segment
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A listing entry flagged by a classifier rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactMatch {
    pub path: String,
    pub rule_id: String,
}

/// Classifies a file listing
///
/// Every matching file entry is reported, in input order. Directories and other
/// non-file entries never match.
///
/// # Arguments
///
/// * `entries` - The file listing of one fetched resource
///
/// # Returns
///
/// One `ArtifactMatch` per matching entry, named by the first rule it satisfies
///
/// # Examples
///
/// ```
/// use osh_harvest::classifier::{classify, has_bom, FileListingEntry};
///
/// let entries = vec![
///     FileListingEntry::file("hardware/bom.csv"),
///     FileListingEntry::file("src/main.c"),
///     FileListingEntry::file("docs/BILL_OF_MATERIALS.pdf"),
/// ];
/// let matches = classify(&entries);
/// assert_eq!(matches.len(), 2);
/// assert!(has_bom(&matches));
/// ```
pub fn classify(entries: &[FileListingEntry]) -> Vec<ArtifactMatch> {
    entries
        .iter()
        .filter(|entry| entry.kind == EntryKind::File)
        .filter_map(|entry| {
            let name = entry.file_name().to_lowercase();
            RULES
                .iter()
                .find(|rule| rule.matches(&name))
                .map(|rule| ArtifactMatch {
                    path: entry.path.clone(),
                    rule_id: rule.id.to_string(),
                })
        })
        .collect()
}

/// Returns true if a classification found at least one artifact
pub fn has_bom(matches: &[ArtifactMatch]) -> bool {
    !matches.is_empty()
}

/// Extensions of tabular or structured data files
pub const DATA_EXTENSIONS: &[&str] = &[
    ".csv", ".tsv", ".xlsx", ".xls", ".ods", ".json", ".xml", ".yaml", ".yml",
];

/// Extensions accepted for bare component tables and `*-bom` files
pub const TABLE_EXTENSIONS: &[&str] = &[".csv", ".tsv", ".xlsx", ".xls", ".json", ".xml"];

/// A named group of file-name patterns
///
/// A rule with `extensions` only accepts names ending in one of them, and its
/// patterns are matched against the name with that extension removed. A rule
/// without extensions matches its patterns against the whole name.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    pub patterns: &'static [&'static str],
    pub extensions: &'static [&'static str],
}

/// Fixed rule table, checked in order; the first matching rule names the match
pub const RULES: &[Rule] = &[
    Rule {
        id: "bom-file",
        patterns: &["bom", "bom_*", "bom-*", "bom.*"],
        extensions: DATA_EXTENSIONS,
    },
    Rule {
        id: "parts-list",
        patterns: &["parts_list*", "parts-list*", "partslist*"],
        extensions: DATA_EXTENSIONS,
    },
    Rule {
        id: "components",
        patterns: &["components"],
        extensions: TABLE_EXTENSIONS,
    },
    Rule {
        id: "bill-of-materials",
        patterns: &[
            "bill_of_materials.*",
            "bill-of-materials.*",
            "bill_of-materials.*",
            "bill-of_materials.*",
        ],
        extensions: &[],
    },
    Rule {
        id: "bom-suffixed",
        patterns: &["*-bom", "*_bom"],
        extensions: TABLE_EXTENSIONS,
    },
    Rule {
        id: "bom-extension",
        patterns: &["*.bom"],
        extensions: &[],
    },
];

impl Rule {
    /// Checks a lowercase file name against every pattern of this rule
    pub fn matches(&self, file_name: &str) -> bool {
        let subject = if self.extensions.is_empty() {
            file_name
        } else {
            match self
                .extensions
                .iter()
                .find_map(|ext| file_name.strip_suffix(ext))
            {
                Some(stem) => stem,
                None => return false,
            }
        };
        self.patterns.iter().any(|p| matches_glob(p, subject))
    }
}

/// Checks if a file name matches a single-wildcard glob
///
/// Patterns support at most one `*`:
/// 1. Exact match: `bom.csv` matches only `bom.csv`
/// 2. Prefix glob: `bom_*.csv` matches `bom_main.csv` but not `bom_.txt`
/// 3. Suffix glob: `*-bom.xml` matches `board-bom.xml` and `-bom.xml`
///
/// # Arguments
///
/// * `pattern` - The glob, lowercase
/// * `candidate` - The file name to check, lowercase
///
/// # Returns
///
/// * `true` - If the candidate matches the pattern
/// * `false` - Otherwise
pub fn matches_glob(pattern: &str, candidate: &str) -> bool {
    match pattern.split_once('*') {
        Some((head, tail)) => {
            candidate.len() >= head.len() + tail.len()
                && candidate.starts_with(head)
                && candidate.ends_with(tail)
        }
        None => candidate == pattern,
    }
}

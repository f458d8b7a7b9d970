use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for osh-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Looks up a source by its tag
    pub fn source(&self, tag: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.tag == tag)
    }
}

/// HTTP client behavior
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-call timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Attempts per request, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff (seconds)
    #[serde(rename = "max-delay-secs", default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// Collection run behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Directory holding one fetch log per source (`<tag>.jsonl`)
    #[serde(rename = "log-dir", default = "default_log_dir")]
    pub log_dir: String,

    /// Longest the run waits for a credential before stopping cleanly (seconds)
    #[serde(rename = "max-wait-secs", default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Number of work items fetched in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            max_wait_secs: default_max_wait_secs(),
            concurrency: default_concurrency(),
        }
    }
}

impl CollectorConfig {
    /// Fetch log file of a source
    pub fn log_path(&self, tag: &str) -> PathBuf {
        PathBuf::from(&self.log_dir).join(format!("{}.jsonl", tag))
    }
}

/// Canonical store location
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Cross-source deduplication tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Minimum Jaro-Winkler similarity of normalized names for a weak link
    #[serde(rename = "name-threshold", default = "default_name_threshold")]
    pub name_threshold: f64,

    /// Multiplier applied to the similarity to get a weak link's confidence
    #[serde(rename = "name-weight", default = "default_name_weight")]
    pub name_weight: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            name_threshold: default_name_threshold(),
            name_weight: default_name_weight(),
        }
    }
}

/// One upstream source and how to fetch its work items
///
/// A GitHub source fetching everything the repository extractor reads:
///
/// ```toml
/// [[source]]
/// tag = "github"
/// host = "github.com"
/// base-url = "https://api.github.com"
/// token-env = "GITHUB_TOKEN"
///
/// [source.headers]
/// Accept = "application/vnd.github+json"
///
/// [[source.resource]]
/// name = "repository"
/// path = "/repos/{id}"
///
/// [[source.resource]]
/// name = "contributors"
/// path = "/repos/{id}/contributors?per_page=100"
/// required = false
///
/// [[source.resource]]
/// name = "issues"
/// path = "/repos/{id}/issues?state=all&per_page=100"
/// required = false
///
/// [[source.resource]]
/// name = "pulls"
/// path = "/repos/{id}/pulls?state=all&per_page=100"
/// required = false
///
/// [[source.resource]]
/// name = "releases"
/// path = "/repos/{id}/releases?per_page=100"
/// required = false
///
/// [[source.resource]]
/// name = "branches"
/// path = "/repos/{id}/branches?per_page=100"
/// required = false
///
/// [[source.resource]]
/// name = "tags"
/// path = "/repos/{id}/tags?per_page=100"
/// required = false
///
/// [[source.resource]]
/// name = "community"
/// path = "/repos/{id}/community/profile"
/// required = false
///
/// [[source.resource]]
/// name = "readme"
/// path = "/repos/{id}/readme"
/// required = false
///
/// [[source.resource]]
/// name = "topics"
/// path = "/repos/{id}/topics"
/// required = false
///
/// [[source.resource]]
/// name = "tree"
/// path = "/repos/{id}/git/trees/{default_branch}?recursive=1"
/// required = false
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Registry key, also the fetch log file name (e.g. "github")
    pub tag: String,

    /// Host whose identities this source fetches (e.g. "github.com")
    pub host: String,

    /// API root the resource paths are joined to
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Inline tokens, in rotation order
    #[serde(default)]
    pub tokens: Vec<String>,

    /// File with one token per line (`#` starts a comment)
    #[serde(rename = "token-file", default)]
    pub token_file: Option<String>,

    /// Environment variable consulted when no other tokens are configured
    #[serde(rename = "token-env", default = "default_token_env")]
    pub token_env: String,

    /// Calls per window assumed before the upstream reports its own quota
    #[serde(rename = "initial-quota", default)]
    pub initial_quota: Option<u32>,

    /// Sub-resources fetched per work item; the first one is the primary resource
    #[serde(rename = "resource")]
    pub resources: Vec<ResourceConfig>,
}

/// A named sub-resource of a work item
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    /// Key of this resource in the fetched payload
    pub name: String,

    /// Path relative to the base URL; may contain `{id}` and `{field.path}` placeholders
    pub path: String,

    /// Whether a failure of this call fails the whole work item
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_user_agent() -> String {
    format!("osh-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_secs() -> u64 {
    60
}

fn default_log_dir() -> String {
    "./fetch-logs".to_string()
}

fn default_max_wait_secs() -> u64 {
    3600
}

fn default_concurrency() -> usize {
    1
}

fn default_name_threshold() -> f64 {
    0.95
}

fn default_name_weight() -> f64 {
    0.5
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_required() -> bool {
    true
}

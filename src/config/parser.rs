use crate::config::types::{Config, SourceConfig};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads, parses and validates a harvest configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use osh_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Sources: {}", config.sources.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_hash(path).map(|(config, _)| config)
}

/// SHA-256 of the configuration file, hex-encoded
///
/// Logged at the start of every run so a fetch log can be matched to the
/// configuration that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(content_hash(&std::fs::read(path)?))
}

/// Loads a configuration together with the hash of the exact bytes parsed
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - The validated configuration and its content hash
/// * `Err(ConfigError)` - The file could not be read, parsed or validated
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok((config, content_hash(content.as_bytes())))
}

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Collects the tokens configured for a source, reading the process environment
///
/// See [`resolve_tokens_with`] for the lookup order.
pub fn resolve_tokens(source: &SourceConfig) -> Result<Vec<String>, ConfigError> {
    resolve_tokens_with(source, |name| std::env::var(name).ok())
}

/// Collects the tokens configured for a source
///
/// Inline `tokens` come first, followed by the lines of `token-file`. Only when
/// both are empty is the `token-env` variable consulted.
///
/// # Arguments
///
/// * `source` - The source whose tokens to collect
/// * `env` - Environment lookup
///
/// # Returns
///
/// * `Ok(Vec<String>)` - At least one token, in rotation order
/// * `Err(ConfigError::NoCredentials)` - Nothing configured anywhere
pub fn resolve_tokens_with<F>(source: &SourceConfig, env: F) -> Result<Vec<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut tokens: Vec<String> = source
        .tokens
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if let Some(file) = &source.token_file {
        let content = std::fs::read_to_string(file)?;
        tokens.extend(parse_token_file(&content));
    }

    if tokens.is_empty() {
        if let Some(value) = env(&source.token_env) {
            let value = value.trim();
            if !value.is_empty() {
                tokens.push(value.to_string());
            }
        }
    }

    if tokens.is_empty() {
        return Err(ConfigError::NoCredentials(source.token_env.clone()));
    }

    let mut unique = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !unique.contains(&token) {
            unique.push(token);
        }
    }

    tracing::debug!("Resolved {} token(s) for source '{}'", unique.len(), source.tag);
    Ok(unique)
}

fn parse_token_file(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

use crate::config::types::{
    ClientConfig, CollectorConfig, Config, ResolverConfig, SourceConfig, StoreConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_client_config(&config.client)?;
    validate_collector_config(&config.collector)?;
    validate_store_config(&config.store)?;
    validate_resolver_config(&config.resolver)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates HTTP client configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 || config.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be between 1 and 300, got {}",
            config.timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 || config.connect_timeout_secs > config.timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs must be between 1 and timeout_secs ({}), got {}",
            config.timeout_secs, config.connect_timeout_secs
        )));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.base_delay_ms < 1 {
        return Err(ConfigError::Validation(
            "base_delay_ms must be >= 1".to_string(),
        ));
    }

    if config.max_delay_secs * 1000 < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_secs ({}s) must not be shorter than base_delay_ms ({}ms)",
            config.max_delay_secs, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates collector configuration
fn validate_collector_config(config: &CollectorConfig) -> Result<(), ConfigError> {
    if config.log_dir.is_empty() {
        return Err(ConfigError::Validation(
            "log_dir cannot be empty".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > 32 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 32, got {}",
            config.concurrency
        )));
    }

    Ok(())
}

/// Validates store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates resolver thresholds
fn validate_resolver_config(config: &ResolverConfig) -> Result<(), ConfigError> {
    if !(config.name_threshold > 0.0 && config.name_threshold <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "name_threshold must be in (0, 1], got {}",
            config.name_threshold
        )));
    }

    // A weak link must always rank below an exact identity match
    if !(config.name_weight > 0.0 && config.name_weight < 1.0) {
        return Err(ConfigError::Validation(format!(
            "name_weight must be in (0, 1), got {}",
            config.name_weight
        )));
    }

    Ok(())
}

/// Validates source entries
fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut tags = HashSet::new();
    for source in sources {
        validate_source(source)?;
        if !tags.insert(source.tag.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate source tag '{}'",
                source.tag
            )));
        }
    }
    Ok(())
}

/// Validates a single source entry
fn validate_source(source: &SourceConfig) -> Result<(), ConfigError> {
    if source.tag.is_empty()
        || !source
            .tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "Source tag must be non-empty and contain only alphanumerics, '-' or '_', got '{}'",
            source.tag
        )));
    }

    validate_host(&source.host)?;

    let url = Url::parse(&source.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base_url '{}': {}", source.base_url, e))
    })?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use HTTP or HTTPS",
            source.base_url
        )));
    }

    if source.resources.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Source '{}' must declare at least one resource",
            source.tag
        )));
    }

    let mut names = HashSet::new();
    for (index, resource) in source.resources.iter().enumerate() {
        if resource.name.is_empty() || !names.insert(resource.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Source '{}' has an empty or duplicate resource name '{}'",
                source.tag, resource.name
            )));
        }

        if !resource.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "Resource path '{}' must start with '/'",
                resource.path
            )));
        }

        let placeholders = placeholders(&resource.path)?;
        if index == 0 {
            if !resource.required {
                return Err(ConfigError::Validation(format!(
                    "The first resource of source '{}' must be required",
                    source.tag
                )));
            }
            if let Some(field) = placeholders.iter().find(|p| **p != "id") {
                return Err(ConfigError::Validation(format!(
                    "The first resource of source '{}' may only use {{id}}, found {{{}}}",
                    source.tag, field
                )));
            }
        }
    }

    Ok(())
}

/// Validates a host name (no scheme, no path)
fn validate_host(host: &str) -> Result<(), ConfigError> {
    if host.is_empty()
        || !host
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "Host '{}' must be a lowercase host name such as 'github.com'",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.contains("..") || !host.contains('.')
    {
        return Err(ConfigError::Validation(format!(
            "Host '{}' is not a valid host name",
            host
        )));
    }

    Ok(())
}

/// Extracts `{placeholder}` names from a resource path
fn placeholders(path: &str) -> Result<Vec<&str>, ConfigError> {
    let mut found = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            ConfigError::Validation(format!("Unclosed placeholder in path '{}'", path))
        })?;
        let name = &after[..end];
        if name.is_empty() || name.contains('{') {
            return Err(ConfigError::Validation(format!(
                "Malformed placeholder in path '{}'",
                path
            )));
        }
        found.push(name);
        rest = &after[end + 1..];
    }
    if rest.contains('}') {
        return Err(ConfigError::Validation(format!(
            "Unmatched '}}' in path '{}'",
            path
        )));
    }
    Ok(found)
}

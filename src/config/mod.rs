//! Configuration module for osh-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and resolving the credential tokens each source rotates through.
//!
//! # Example
//!
//! ```no_run
//! use osh_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Fetch logs go to: {}", config.collector.log_dir);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClientConfig, CollectorConfig, Config, ResolverConfig, ResourceConfig, SourceConfig,
    StoreConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, resolve_tokens, resolve_tokens_with,
};

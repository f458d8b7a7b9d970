//! osh-harvest main entry point
//!
//! This is the command-line interface for one bounded harvest step at a time.
//! Re-running `collect` until it reports nothing pending is left to the caller
//! (cron, a systemd timer, a shell loop).

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use osh_harvest::collector::{work_items_from_store, Collector, FetchLog, StopReason};
use osh_harvest::config::{load_config_with_hash, resolve_tokens, Config, SourceConfig};
use osh_harvest::credentials::{Credential, CredentialPool};
use osh_harvest::fetcher::{FetcherRegistry, TemplateFetcher};
use osh_harvest::merger::EnrichmentMerger;
use osh_harvest::output::{load_statistics, print_log_statistics, print_statistics, LogStatistics};
use osh_harvest::resolver::DeduplicationResolver;
use osh_harvest::store::SqliteStore;
use osh_harvest::{RateLimitedClient, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// osh-harvest: resumable metadata harvesting for open hardware projects
///
/// Fetches repository metadata from rate-limited APIs into per-source fetch
/// logs, merges it into the canonical store and links records that describe
/// the same project across sources.
#[derive(Parser, Debug)]
#[command(name = "osh-harvest")]
#[command(version)]
#[command(about = "Resumable, quota-aware metadata harvesting", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one bounded collection pass for a source
    Collect {
        /// Source tag from the configuration
        #[arg(long)]
        source: String,
    },

    /// Merge a source's fetch log into the canonical store
    Enrich {
        /// Source tag from the configuration
        #[arg(long)]
        source: String,
    },

    /// Recompute cross-references between entities
    Resolve,

    /// Show statistics from the store and fetch logs
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Collect { source } => handle_collect(&config, &source).await,
        Command::Enrich { source } => handle_enrich(&config, &source),
        Command::Resolve => handle_resolve(&config),
        Command::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("osh_harvest=info,warn"),
            1 => EnvFilter::new("osh_harvest=debug,info"),
            2 => EnvFilter::new("osh_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn find_source<'a>(config: &'a Config, tag: &str) -> anyhow::Result<&'a SourceConfig> {
    config
        .source(tag)
        .ok_or_else(|| anyhow!("Source '{}' is not configured", tag))
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    let path = Path::new(&config.store.database_path);
    SqliteStore::new(path).with_context(|| format!("Failed to open store {}", path.display()))
}

/// Handles `collect`: one bounded pass over the source's pending work
async fn handle_collect(config: &Config, tag: &str) -> anyhow::Result<()> {
    let source = find_source(config, tag)?;
    let max_wait = Duration::from_secs(config.collector.max_wait_secs);

    let credentials: Vec<Credential> = resolve_tokens(source)?
        .into_iter()
        .map(|token| match source.initial_quota {
            Some(quota) => Credential::with_quota(token, quota, None),
            None => Credential::new(token),
        })
        .collect();
    let pool = CredentialPool::new(credentials, Arc::new(SystemClock));

    let client = RateLimitedClient::from_config(&config.client, &source.headers, pool.clone(), max_wait)?;
    let mut registry = FetcherRegistry::new();
    registry.register(source.tag.clone(), Arc::new(TemplateFetcher::from_source(client, source)));
    let fetcher = registry.require(&source.tag)?;

    let store = open_store(config)?;
    let items = work_items_from_store(&store, &source.host)?;

    let log_path = config.collector.log_path(&source.tag);
    let mut log = FetchLog::open(&log_path)
        .with_context(|| format!("Failed to open fetch log {}", log_path.display()))?;

    let report = Collector::new(fetcher, pool, max_wait)
        .with_concurrency(config.collector.concurrency)
        .run(items, &mut log)
        .await?;

    println!("{}", report);
    match report.stop {
        StopReason::Completed if report.pending > 0 => {
            println!("{} item(s) hit transient errors; re-run to retry them", report.pending)
        }
        StopReason::Completed => {}
        StopReason::Deferred { ready_at } => println!("Quota exhausted; re-run after {}", ready_at),
        StopReason::QuotaUnknown => {
            println!("Quota exhausted and no reset time was reported; re-run once the quota window has passed")
        }
    }

    Ok(())
}

/// Handles `enrich`: merges the source's fetch log into the store
fn handle_enrich(config: &Config, tag: &str) -> anyhow::Result<()> {
    let source = find_source(config, tag)?;
    let mut store = open_store(config)?;

    let report = EnrichmentMerger::new()
        .with_default_host(source.host.clone())
        .run_log(&config.collector.log_path(&source.tag), &mut store)?;

    println!("{}", report);
    Ok(())
}

/// Handles `resolve`: rebuilds every cross-reference
fn handle_resolve(config: &Config) -> anyhow::Result<()> {
    let mut store = open_store(config)?;
    let report = DeduplicationResolver::new(&config.resolver).run(&mut store)?;

    println!("{}", report);
    Ok(())
}

/// Handles `stats`: shows store and fetch-log statistics
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.store.database_path);

    let store = open_store(config)?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    for source in &config.sources {
        let path = config.collector.log_path(&source.tag);
        if !path.exists() {
            continue;
        }
        let records = FetchLog::read_records(&path)?;
        print_log_statistics(&source.tag, &LogStatistics::from_records(&records));
    }

    Ok(())
}

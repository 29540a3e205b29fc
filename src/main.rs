//! Stacksift main entry point
//!
//! Command-line interface for the stacksift catalog crawler.

use clap::Parser;
use stacksift::config::load_config_with_hash;
use stacksift::crawler::{Coordinator, PageFetcher, TaskScheduler};
use stacksift::output::CsvExporter;
use stacksift::pool::{ConnectionPool, HttpConnector};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Stacksift: a concurrent catalog crawler
///
/// Stacksift crawls a catalog site's category listings, keeps the entries
/// that pass per-category score and rating thresholds, deduplicates them,
/// and writes one CSV file per configured criteria.
#[derive(Parser, Debug)]
#[command(name = "stacksift")]
#[command(version = "1.0.0")]
#[command(about = "A concurrent catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("stacksift=info,warn"),
            1 => EnvFilter::new("stacksift=debug,info"),
            2 => EnvFilter::new("stacksift=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the crawl plan
fn handle_dry_run(config: &stacksift::Config) {
    println!("=== Stacksift Dry Run ===\n");

    println!("Catalog:");
    println!("  Base URL: {}", config.catalog.base_url);
    println!("  Taxonomy path: {}", config.catalog.taxonomy_path);
    println!("  Page size: {}", config.catalog.page_size);
    println!("  User agent: {}", config.catalog.user_agent);
    println!(
        "  Session cookie: {}",
        if config.catalog.session_cookie.is_some() {
            "set"
        } else {
            "none"
        }
    );

    println!("\nConnection Pool:");
    println!("  Max connections: {}", config.pool.max_connections);
    println!("  Max per host: {}", config.pool.max_per_host);
    println!("  Acquire timeout: {:?}", config.pool.acquire_timeout());
    println!("  Idle timeout: {:?}", config.pool.idle_timeout());
    println!("  Eviction interval: {:?}", config.pool.evict_interval());

    println!("\nScheduler:");
    println!("  Workers: {}", config.scheduler.workers);
    println!("  Queue capacity: {}", config.scheduler.queue_capacity);

    println!("\nOutput directory: {}", config.output.directory);

    println!("\nCriteria ({}):", config.criteria.len());
    for criteria in &config.criteria {
        println!(
            "  - tag '{}': score >= {}, ratings >= {}",
            criteria.tag, criteria.min_score, criteria.min_count
        );
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would run {} crawl(s)", config.criteria.len());
}

/// Handles the main crawl operation
async fn handle_crawl(config: stacksift::Config) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();

    let pool = Arc::new(ConnectionPool::new(
        config.pool.clone(),
        Arc::new(HttpConnector::new(
            config.pool.connect_timeout(),
            config.pool.read_timeout(),
        )),
    ));
    let scheduler = TaskScheduler::new(&config.scheduler);
    let fetcher = PageFetcher::new(Arc::clone(&pool), &config.catalog);
    let exporter = Box::new(CsvExporter::new(&config.output.directory));

    let coordinator = Coordinator::new(
        fetcher,
        scheduler.handle(),
        config.catalog.clone(),
        exporter,
    );

    tracing::info!("Starting {} crawl run(s)", config.criteria.len());
    let reports = coordinator.run_all(&config.criteria).await;

    scheduler.shutdown().await;
    pool.shutdown().await;

    let total_records: usize = reports.iter().map(|r| r.records).sum();
    let total_failed: usize = reports.iter().map(|r| r.tasks_failed).sum();
    tracing::info!(
        "Finished {} of {} run(s): {} record(s), {} failed task(s), elapsed {:.2?}",
        reports.len(),
        config.criteria.len(),
        total_records,
        total_failed,
        started.elapsed()
    );

    if reports.len() < config.criteria.len() {
        return Err("one or more crawl runs aborted".into());
    }
    Ok(())
}

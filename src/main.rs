//! Variant-Harvest main entry point
//!
//! This is the command-line interface for the Variant-Harvest catalog crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use variant_harvest::config::{load_config_with_hash, Config};
use variant_harvest::crawler::{run_harvest, HarvestOptions};
use variant_harvest::output::{
    generate_markdown_summary, generate_summary, load_statistics, print_statistics,
};
use variant_harvest::storage::open_storage;

/// Variant-Harvest: a two-phase product catalog harvester
///
/// Variant-Harvest walks a paginated catalog to discover product pages, then
/// extracts one record per product, including an image gallery per color.
/// Progress is kept in SQLite, so an interrupted harvest resumes where it
/// stopped.
#[derive(Parser, Debug)]
#[command(name = "variant-harvest")]
#[command(version)]
#[command(about = "A two-phase product catalog harvester", long_about = None)]
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

    /// Resume an interrupted harvest (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh harvest, clearing queues and records
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        handle_harvest(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("variant_harvest=info,warn"),
            1 => EnvFilter::new("variant_harvest=debug,info"),
            2 => EnvFilter::new("variant_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) {
    println!("=== Variant-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Catalog concurrency: {}",
        config.crawler.catalog_concurrency
    );
    println!(
        "  Product concurrency: {}",
        config.crawler.product_concurrency
    );
    println!("  Max retries: {}", config.crawler.max_request_retries);
    println!(
        "  Task timeout: {}s",
        config.crawler.request_timeout_secs
    );
    match config.crawler.max_products {
        Some(max) => println!("  Product limit: {}", max),
        None => println!("  Product limit: none"),
    }

    println!("\nSite:");
    println!("  Origin: {}", config.site.origin);
    println!("  Page parameter: {}", config.site.page_param);
    println!("  Product path: {}", config.site.product_path);
    println!("  Start URLs ({}):", config.site.start_urls.len());
    for url in &config.site.start_urls {
        println!("    * {}", url);
    }

    println!("\nCapture:");
    println!("  Scope: {:?}", config.capture.scope);
    println!("  Image keywords: {:?}", config.capture.image_keywords);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!(
        "  Records: {} ({:?})",
        config.output.records_path, config.output.format
    );
    println!("  Summary: {}", config.output.summary_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start harvesting from {} catalog URLs",
        config.site.start_urls.len()
    );
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Harvest Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    write_summary(config)?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

fn write_summary(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;

    tracing::info!("Loading harvest data from database...");
    let summary = generate_summary(&storage)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))?;

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh harvest (ignoring previous state)");
    } else {
        tracing::info!("Starting harvest (will resume if interrupted run exists)");
    }

    tracing::info!(
        "Start URLs: {}, catalog concurrency: {}, product concurrency: {}",
        config.site.start_urls.len(),
        config.crawler.catalog_concurrency,
        config.crawler.product_concurrency
    );

    let options = HarvestOptions {
        fresh,
        ..HarvestOptions::default()
    };

    let report = run_harvest(config.clone(), config_hash, options)
        .await
        .context("Harvest failed")?;

    if let Some(catalog) = &report.catalog {
        tracing::info!(
            "Catalog phase: {} pages processed, {} abandoned, {} URLs enqueued",
            catalog.processed,
            catalog.failed,
            catalog.enqueued
        );
    }
    tracing::info!(
        "Product phase: {} processed, {} failed, {} skipped, {} records emitted",
        report.product.processed,
        report.product.failed,
        report.product.skipped,
        report.product.emitted
    );

    if let Err(e) = write_summary(&config) {
        tracing::warn!("Could not write summary: {:#}", e);
    } else {
        tracing::info!("Summary written to {}", config.output.summary_path);
    }

    Ok(())
}

//! Harvest coordinator - the pipeline driver
//!
//! This module sequences the two phases of a harvest:
//! - Creating or resuming a run, and re-offering interrupted requests
//! - Seeding the catalog queue with the start URLs
//! - Draining the catalog queue (phase 1), which may keep re-filling itself
//! - Draining the product queue (phase 2) once phase 1 is exhausted
//! - Marking the run completed

use crate::config::Config;
use crate::crawler::{
    run_phase, CatalogWorker, HarvestReport, PoolSettings, ProductLimit, ProductWorker,
};
use crate::extract::{FieldExtractor, GalleryCapture, VariantWalker};
use crate::frontier::{lock_storage, Frontier, SharedStorage};
use crate::output::{FanoutSink, JsonLinesSink, RecordSink, SqliteRecordSink};
use crate::render::{build_http_client, HttpRenderer, Renderer, VisibilityRules};
use crate::storage::{open_storage, QueueKind, RunStatus, SqliteStorage, Storage};
use crate::Result;
use std::path::Path;
use std::sync::{Arc, Mutex};
use url::Url;

/// How a harvest starts
#[derive(Debug, Clone, Copy)]
pub struct HarvestOptions {
    /// Clear queues and records and start a new run
    pub fresh: bool,
    /// Append records to the configured JSON lines file
    pub write_records_file: bool,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            fresh: false,
            write_records_file: true,
        }
    }
}

/// Main harvest coordinator structure
pub struct Harvester {
    config: Arc<Config>,
    storage: SharedStorage,
    frontier: Arc<Frontier>,
    renderer: Arc<dyn Renderer>,
    run_id: i64,
    already_recorded: usize,
    write_records_file: bool,
    extra_sinks: Vec<Box<dyn RecordSink>>,
}

impl Harvester {
    /// Opens the configured database and fetches pages over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `config_hash` - Hash of the configuration file, recorded on the run
    /// * `options` - Fresh/resume behavior
    pub fn open(config: Config, config_hash: &str, options: HarvestOptions) -> Result<Self> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let client = build_http_client(&config.user_agent, config.crawler.request_timeout())?;
        let renderer = Arc::new(HttpRenderer::new(
            client,
            VisibilityRules::from(&config.capture),
        ));

        Self::with_components(config, config_hash, storage, renderer, options)
    }

    /// Creates a coordinator over an already opened storage and renderer
    pub fn with_components(
        config: Config,
        config_hash: &str,
        mut storage: SqliteStorage,
        renderer: Arc<dyn Renderer>,
        options: HarvestOptions,
    ) -> Result<Self> {
        let run_id = if options.fresh {
            tracing::info!("Starting fresh harvest, clearing queues and records");
            storage.clear_queues()?;
            storage.clear_records()?;
            storage.create_run(config_hash)?
        } else {
            match storage.get_latest_run()? {
                Some(run) if run.status == RunStatus::Running => {
                    if run.config_hash != config_hash {
                        tracing::warn!(
                            "Configuration changed since run {} started (was {}, now {})",
                            run.id,
                            run.config_hash,
                            config_hash
                        );
                    }
                    tracing::info!("Resuming interrupted run {}", run.id);
                    run.id
                }
                Some(_) => {
                    tracing::info!("Starting new run");
                    storage.create_run(config_hash)?
                }
                None => {
                    tracing::info!("No previous runs found, starting new run");
                    storage.create_run(config_hash)?
                }
            }
        };

        let recovered = storage.recover_in_flight()?;
        if recovered > 0 {
            tracing::info!(
                "Re-offered {} requests left in flight by a previous process",
                recovered
            );
        }

        let already_recorded = usize::try_from(storage.count_records()?).unwrap_or(usize::MAX);

        let storage = Arc::new(Mutex::new(storage));
        let frontier = Arc::new(Frontier::new(Arc::clone(&storage)));

        Ok(Self {
            config: Arc::new(config),
            storage,
            frontier,
            renderer,
            run_id,
            already_recorded,
            write_records_file: options.write_records_file,
            extra_sinks: Vec::new(),
        })
    }

    /// Adds a sink that receives every record after the database does
    pub fn with_sink(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.extra_sinks.push(sink);
        self
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Runs both phases to exhaustion
    ///
    /// Page-level failures are absorbed by the worker pools; an error here
    /// means the storage, the sink, or the configuration failed, and the run
    /// is marked failed.
    pub async fn run(mut self) -> Result<HarvestReport> {
        tracing::info!("Starting harvest run {}", self.run_id);

        let sink = self.build_sink()?;
        match self.run_phases(sink).await {
            Ok(report) => {
                lock_storage(&self.storage)?.complete_run(self.run_id)?;
                tracing::info!(
                    "Harvest run {} completed: {} records in store",
                    self.run_id,
                    report.records_total
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Harvest run {} failed: {}", self.run_id, e);
                lock_storage(&self.storage)?.update_run_status(self.run_id, RunStatus::Failed)?;
                Err(e)
            }
        }
    }

    /// The database is the primary sink, so a URL already recorded by an
    /// earlier process is never written to the secondaries again
    fn build_sink(&mut self) -> Result<Arc<dyn RecordSink>> {
        let mut sink = FanoutSink::new(Box::new(SqliteRecordSink::new(
            Arc::clone(&self.storage),
            self.run_id,
        )));

        if self.write_records_file {
            let output = &self.config.output;
            let jsonl = JsonLinesSink::open(Path::new(&output.records_path), output.format)?;
            tracing::info!("Appending records to {}", output.records_path);
            sink = sink.with_secondary(Box::new(jsonl));
        }

        for extra in std::mem::take(&mut self.extra_sinks) {
            sink = sink.with_secondary(extra);
        }

        Ok(Arc::new(sink))
    }

    async fn run_phases(&self, sink: Arc<dyn RecordSink>) -> Result<HarvestReport> {
        let config = &self.config;

        let (catalog_stats, product_stats) = self.frontier.open()?;
        tracing::info!(
            "Catalog queue: {} pending, {} total; product queue: {} pending, {} total",
            catalog_stats.pending,
            catalog_stats.total,
            product_stats.pending,
            product_stats.total
        );

        let seeded = self.frontier.seed(&config.site.start_urls)?;
        tracing::info!(
            "Seeded {} of {} start URLs",
            seeded,
            config.site.start_urls.len()
        );

        // ===== Phase 1: catalog =====
        let catalog_stats = self.frontier.stats(QueueKind::Catalog)?;
        let catalog = if catalog_stats.total == 0 {
            tracing::error!("Catalog queue is empty after seeding, skipping the catalog phase");
            None
        } else {
            let worker = CatalogWorker::new(
                Arc::clone(&self.renderer),
                Arc::clone(&self.frontier),
                &config.site,
                config.selectors.clone(),
                config.timing.clone(),
            )?;
            let settings = PoolSettings {
                concurrency: config.crawler.catalog_concurrency as usize,
                max_retries: config.crawler.max_request_retries,
                task_timeout: config.crawler.request_timeout(),
            };
            Some(run_phase(Arc::new(worker), Arc::clone(&self.frontier), settings).await?)
        };

        let product_stats = self.frontier.stats(QueueKind::Product)?;
        tracing::info!(
            "Catalog phase done; {} product URLs discovered, {} pending",
            product_stats.total,
            product_stats.pending
        );

        // ===== Phase 2: products =====
        let origin = Url::parse(&config.site.origin)?;
        let gallery = GalleryCapture::new(&config.selectors, &config.capture, origin);
        let walker = VariantWalker::new(&config.selectors, config.timing.clone(), gallery);
        let fields = FieldExtractor::from_selectors(&config.selectors)?;
        let limit = ProductLimit::new(config.crawler.max_products, self.already_recorded);

        let worker = ProductWorker::new(
            Arc::clone(&self.renderer),
            sink,
            fields,
            walker,
            &config.selectors,
            config.timing.clone(),
            limit,
        );
        let settings = PoolSettings {
            concurrency: config.crawler.product_concurrency as usize,
            max_retries: config.crawler.max_request_retries,
            task_timeout: config.crawler.request_timeout(),
        };
        let product = run_phase(Arc::new(worker), Arc::clone(&self.frontier), settings).await?;

        let records_total = lock_storage(&self.storage)?.count_records()?;
        if records_total < product.emitted as u64 {
            tracing::error!(
                "Only {} of {} emitted records are in the database",
                records_total,
                product.emitted
            );
        }

        Ok(HarvestReport {
            run_id: self.run_id,
            catalog,
            product,
            records_total,
        })
    }
}

/// Runs a complete harvest with the HTTP renderer
///
/// # Example
///
/// ```no_run
/// use variant_harvest::config::load_config_with_hash;
/// use variant_harvest::crawler::{run_harvest, HarvestOptions};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let report = run_harvest(config, &hash, HarvestOptions::default()).await?;
/// println!("{} records", report.records_total);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(
    config: Config,
    config_hash: &str,
    options: HarvestOptions,
) -> Result<HarvestReport> {
    Harvester::open(config, config_hash, options)?.run().await
}

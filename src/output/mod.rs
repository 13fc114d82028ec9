//! Output module for record sinks, summaries and reports
//!
//! This module handles:
//! - Emitting product records (JSON lines, SQLite, in-memory)
//! - Generating markdown summaries of harvest results
//! - Recording harvest statistics

mod jsonl;
mod markdown;
mod memory;
mod sqlite_output;
pub mod stats;
mod traits;

pub use jsonl::JsonLinesSink;
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use memory::{FanoutSink, MemorySink};
pub use sqlite_output::SqliteRecordSink;
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
pub use traits::{HarvestSummary, OutputError, OutputResult, RecordSink};

use crate::state::RequestState;
use crate::storage::{QueueKind, Storage};
use crate::HarvestError;
use chrono::{DateTime, Utc};

/// Generates a harvest summary for the latest run in storage
///
/// # Arguments
///
/// * `storage` - The storage backend containing harvest data
///
/// # Returns
///
/// * `Ok(HarvestSummary)` - Successfully generated summary
/// * `Err(HarvestError)` - No run exists or a query failed
pub fn generate_summary(storage: &dyn Storage) -> Result<HarvestSummary, HarvestError> {
    let run = storage.get_latest_run()?.ok_or(OutputError::NoRuns)?;

    // Calculate duration if finished
    let duration_seconds = match (
        run.started_at.parse::<DateTime<Utc>>(),
        run.finished_at.as_deref().map(str::parse::<DateTime<Utc>>),
    ) {
        (Ok(started), Some(Ok(finished))) => {
            Some((finished - started).num_seconds().max(0) as u64)
        }
        _ => None,
    };

    let stats = stats::load_statistics(storage)?;

    let images_captured = storage
        .list_records()?
        .iter()
        .map(|record| record.image_count)
        .sum();

    let failed_catalog_pages = storage.urls_in_state(QueueKind::Catalog, RequestState::Failed)?;

    Ok(HarvestSummary {
        run_id: run.id,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_seconds,
        status: run.status.to_db_string().to_string(),
        config_hash: run.config_hash,
        catalog: stats.catalog,
        product: stats.product,
        records: stats.records,
        partial_records: stats.partial_records,
        images_captured,
        failed_products: stats.failed_products,
        failed_catalog_pages,
    })
}

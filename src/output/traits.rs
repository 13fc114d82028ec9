//! Record sink trait and summary types
//!
//! This module defines the interface every record sink implements and the
//! data structure used to summarize a harvest run.

use crate::record::ProductRecord;
use crate::storage::{QueueStats, StorageError};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No harvest runs found in database")]
    NoRuns,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receives product records, one call per terminal product outcome
///
/// Sinks are append-only. Implementations are shared between product
/// workers, so `emit` takes `&self` and serializes internally.
pub trait RecordSink: Send + Sync {
    /// Writes one record
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The record was written
    /// * `Ok(false)` - A record for the same source URL already exists
    /// * `Err(OutputError)` - The record could not be written
    fn emit(&self, record: &ProductRecord) -> OutputResult<bool>;

    /// Short name used in log lines
    fn name(&self) -> &str;
}

impl<T: RecordSink + ?Sized> RecordSink for Arc<T> {
    fn emit(&self, record: &ProductRecord) -> OutputResult<bool> {
        (**self).emit(record)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Summary statistics for a harvest run
#[derive(Debug, Clone, Default)]
pub struct HarvestSummary {
    // Run metadata
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,

    // Queue breakdown
    pub catalog: QueueStats,
    pub product: QueueStats,

    // Records
    pub records: u64,
    pub partial_records: u64,
    pub images_captured: u64,

    /// Product URLs whose retry budget was exhausted
    pub failed_products: Vec<String>,

    /// Catalog URLs abandoned after exhausting retries
    pub failed_catalog_pages: Vec<String>,
}

impl HarvestSummary {
    /// Records emitted without an error annotation
    pub fn complete_records(&self) -> u64 {
        self.records.saturating_sub(self.partial_records)
    }

    /// Calculates the success rate as a percentage
    ///
    /// A product counts as a success when its record carries no error. The
    /// denominator is every product URL that reached a terminal state other
    /// than skipped.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.product.handled + self.product.failed;
        if attempted == 0 {
            0.0
        } else {
            (self.complete_records() as f64 / attempted as f64) * 100.0
        }
    }

    /// Calculates the share of attempted products that failed terminally
    pub fn failure_rate(&self) -> f64 {
        let attempted = self.product.handled + self.product.failed;
        if attempted == 0 {
            0.0
        } else {
            (self.product.failed as f64 / attempted as f64) * 100.0
        }
    }

    /// Product URLs discovered but never given a record
    ///
    /// Skipped URLs are excluded since the product cap never records them.
    pub fn unrecorded_products(&self) -> u64 {
        let terminal = self.product.handled + self.product.failed;
        terminal.saturating_sub(self.records)
    }
}

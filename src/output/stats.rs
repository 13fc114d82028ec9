//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! queue and record statistics from the storage layer.

use crate::state::RequestState;
use crate::storage::{QueueKind, QueueStats, Storage};
use crate::HarvestError;

/// Harvest statistics summary
#[derive(Debug, Clone, Default)]
pub struct HarvestStatistics {
    /// Catalog queue counts by state
    pub catalog: QueueStats,

    /// Product queue counts by state
    pub product: QueueStats,

    /// Records persisted, partial ones included
    pub records: u64,

    /// Records carrying an error annotation
    pub partial_records: u64,

    /// Product URLs whose retry budget was exhausted
    pub failed_products: Vec<String>,
}

impl HarvestStatistics {
    pub fn queue(&self, queue: QueueKind) -> &QueueStats {
        match queue {
            QueueKind::Catalog => &self.catalog,
            QueueKind::Product => &self.product,
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics, HarvestError> {
    let catalog = storage.queue_stats(QueueKind::Catalog)?;
    let product = storage.queue_stats(QueueKind::Product)?;
    let records = storage.count_records()?;
    let partial_records = storage.count_partial_records()?;
    let failed_products = storage.urls_in_state(QueueKind::Product, RequestState::Failed)?;

    Ok(HarvestStatistics {
        catalog,
        product,
        records,
        partial_records,
        failed_products,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    for queue in QueueKind::all() {
        let counts = stats.queue(queue);
        println!("{} queue ({} total):", queue, counts.total);

        for state in RequestState::all_states() {
            let count = counts.count(state);
            let percentage = if counts.total > 0 {
                (count as f64 / counts.total as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", state, count, percentage);
        }
        println!();
    }

    println!("Records:");
    println!("  Total: {}", stats.records);
    println!("  Partial: {}", stats.partial_records);
    println!();

    if !stats.failed_products.is_empty() {
        println!("Failed Products ({}):", stats.failed_products.len());
        for url in &stats.failed_products {
            println!("  - {}", url);
        }
        println!();
    }

    let complete = stats.records.saturating_sub(stats.partial_records);
    let attempted = stats.product.handled + stats.product.failed;
    let success_rate = if attempted > 0 {
        (complete as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} products fully extracted)",
        success_rate, complete, attempted
    );
}

//! Crawler module for the two harvest phases
//!
//! This module contains the crawl orchestration, including:
//! - A bounded worker pool that drains one queue to exhaustion
//! - The catalog task (product links and pagination discovery)
//! - The product task (fields, variant walk, record emission)
//! - The pipeline driver that runs phase 1 before phase 2

mod catalog;
mod coordinator;
mod pool;
mod product;

pub use catalog::CatalogWorker;
pub use coordinator::{run_harvest, HarvestOptions, Harvester};
pub use pool::{run_phase, PhaseWorker, PoolSettings};
pub use product::{ProductLimit, ProductWorker};

use crate::render::RenderError;
use std::fmt;

/// The two pipeline phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Catalog,
    Product,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::Product => write!(f, "product"),
        }
    }
}

/// Why a page task did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Whether another attempt may succeed
    pub retryable: bool,
    pub message: String,
}

impl TaskFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

impl From<RenderError> for TaskFailure {
    fn from(error: RenderError) -> Self {
        Self {
            retryable: error.is_retryable(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// What a completed task produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSuccess {
    /// URLs newly accepted into either queue
    pub enqueued: usize,
    /// Records written to the sink
    pub emitted: usize,
}

/// Counters for one drained phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Tasks that completed
    pub processed: usize,
    /// Tasks whose retry budget ran out, or that failed fatally
    pub failed: usize,
    /// Entries dequeued but never fetched
    pub skipped: usize,
    /// Attempts returned to the queue
    pub retried: usize,
    /// URLs newly accepted into either queue
    pub enqueued: usize,
    /// Records written, partial records included
    pub emitted: usize,
}

impl PhaseReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            processed: 0,
            failed: 0,
            skipped: 0,
            retried: 0,
            enqueued: 0,
            emitted: 0,
        }
    }
}

/// Result of a full harvest run
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub run_id: i64,
    /// None when the catalog phase was skipped
    pub catalog: Option<PhaseReport>,
    pub product: PhaseReport,
    /// Records the sink holds after the run, across all runs
    pub records_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_timeout_is_retryable_failure() {
        let failure: TaskFailure = RenderError::Timeout {
            selector: ".style-number-font".to_string(),
            waited_ms: 30_000,
        }
        .into();
        assert!(failure.retryable);
        assert!(failure.message.contains(".style-number-font"));
    }

    #[test]
    fn test_selector_error_is_fatal_failure() {
        let failure: TaskFailure = RenderError::Selector("ul[".to_string()).into();
        assert!(!failure.retryable);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Catalog.to_string(), "catalog");
        assert_eq!(Phase::Product.to_string(), "product");
    }
}

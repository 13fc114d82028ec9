//! Storage module for persisting harvest state
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Durable catalog and product request queues
//! - Run tracking and resumption support
//! - The record table that enforces one record per product URL

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::RequestState;
use std::fmt;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// The two independent work queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Catalog,
    Product,
}

impl QueueKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Product => "product",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "catalog" => Some(Self::Catalog),
            "product" => Some(Self::Product),
            _ => None,
        }
    }

    pub fn all() -> [Self; 2] {
        [Self::Catalog, Self::Product]
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A request claimed from a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: i64,
    pub queue: QueueKind,
    pub url: String,
    pub retry_count: u32,
    /// The page the URL was discovered on (None for seeds)
    pub source: Option<String>,
}

/// Per-state counts for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub in_flight: u64,
    pub handled: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total: u64,
}

impl QueueStats {
    /// Returns true if nothing is pending or in flight
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }

    /// Returns the count for a single state
    pub fn count(&self, state: RequestState) -> u64 {
        match state {
            RequestState::Pending => self.pending,
            RequestState::InFlight => self.in_flight,
            RequestState::Handled => self.handled,
            RequestState::Failed => self.failed,
            RequestState::Skipped => self.skipped,
        }
    }
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A persisted product record row
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub source_url: String,
    pub identifier: Option<String>,
    pub is_partial: bool,
    pub image_count: u64,
    pub captured_at: String,
    /// The record serialized as JSON
    pub payload: String,
}

//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::record::ProductRecord;
use crate::state::RequestState;
use crate::storage::{QueueEntry, QueueKind, QueueStats, RunRecord, RunStatus, StoredRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue entry not found: {0}")]
    EntryNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid state transition for entry {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: i64,
        from: RequestState,
        to: RequestState,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the harvester.
/// Callers share one backend behind a mutex, so every method is a short
/// synchronous transaction.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Queue Management =====

    /// Opens a queue, returning its current statistics
    fn open_queue(&mut self, queue: QueueKind) -> StorageResult<QueueStats>;

    /// Adds a URL to a queue unless it was ever added before
    ///
    /// # Arguments
    ///
    /// * `queue` - The target queue
    /// * `url` - The normalized URL
    /// * `source` - The page the URL was discovered on
    ///
    /// # Returns
    ///
    /// `true` if the URL was accepted as a new pending entry, `false` if the
    /// queue already held it in any state
    fn add_if_absent(
        &mut self,
        queue: QueueKind,
        url: &str,
        source: Option<&str>,
    ) -> StorageResult<bool>;

    /// Claims the oldest pending entry, moving it to in-flight
    fn claim_next(&mut self, queue: QueueKind) -> StorageResult<Option<QueueEntry>>;

    /// Marks an in-flight entry as handled
    fn mark_handled(&mut self, entry_id: i64) -> StorageResult<()>;

    /// Returns an in-flight entry to pending and bumps its retry count
    fn release_for_retry(&mut self, entry_id: i64, error: &str) -> StorageResult<u32>;

    /// Marks an in-flight entry as terminally failed
    fn mark_failed(&mut self, entry_id: i64, error: &str) -> StorageResult<()>;

    /// Marks an in-flight entry as skipped without processing
    fn mark_skipped(&mut self, entry_id: i64) -> StorageResult<()>;

    /// Returns every in-flight entry to pending after an interruption
    ///
    /// # Returns
    ///
    /// The number of entries recovered
    fn recover_in_flight(&mut self) -> StorageResult<u64>;

    /// Gets per-state counts for a queue
    fn queue_stats(&self, queue: QueueKind) -> StorageResult<QueueStats>;

    /// Gets the current state of a URL in a queue
    fn request_state(&self, queue: QueueKind, url: &str) -> StorageResult<Option<RequestState>>;

    /// Gets every URL in a queue with the given state, in insertion order
    fn urls_in_state(&self, queue: QueueKind, state: RequestState) -> StorageResult<Vec<String>>;

    /// Deletes every queue entry
    fn clear_queues(&mut self) -> StorageResult<()>;

    // ===== Record Management =====

    /// Inserts a record unless one already exists for its source URL
    ///
    /// # Returns
    ///
    /// `true` if the record was inserted
    fn insert_record(&mut self, run_id: i64, record: &ProductRecord) -> StorageResult<bool>;

    /// Gets a record by its source URL
    fn get_record(&self, source_url: &str) -> StorageResult<Option<StoredRecord>>;

    /// Gets every stored record, oldest first
    fn list_records(&self) -> StorageResult<Vec<StoredRecord>>;

    /// Counts stored records
    fn count_records(&self) -> StorageResult<u64>;

    /// Counts stored records that carry an error annotation
    fn count_partial_records(&self) -> StorageResult<u64>;

    /// Deletes every stored record
    fn clear_records(&mut self) -> StorageResult<()>;
}

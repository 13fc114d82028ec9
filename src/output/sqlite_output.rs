//! SQLite-based record sink
//!
//! Records are written to the same database that holds the queues. The
//! `records` table is keyed on the source URL, so a product URL can only ever
//! be persisted once, across restarts included.

use crate::frontier::{lock_storage, SharedStorage};
use crate::output::traits::{OutputResult, RecordSink};
use crate::record::ProductRecord;
use crate::storage::Storage;

/// SQLite-based record sink
pub struct SqliteRecordSink {
    storage: SharedStorage,
    run_id: i64,
}

impl SqliteRecordSink {
    /// Creates a new SQLite record sink
    ///
    /// # Arguments
    ///
    /// * `storage` - The storage backend to use
    /// * `run_id` - The run new records are attributed to
    pub fn new(storage: SharedStorage, run_id: i64) -> Self {
        Self { storage, run_id }
    }
}

impl RecordSink for SqliteRecordSink {
    fn emit(&self, record: &ProductRecord) -> OutputResult<bool> {
        let mut storage = lock_storage(&self.storage)?;
        let inserted = storage.insert_record(self.run_id, record)?;

        if !inserted {
            tracing::warn!(
                "A record for {} already exists, keeping the first one",
                record.source_url
            );
        }

        Ok(inserted)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

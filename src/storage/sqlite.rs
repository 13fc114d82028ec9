//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::record::ProductRecord;
use crate::state::RequestState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{QueueEntry, QueueKind, QueueStats, RunRecord, RunStatus, StoredRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn entry_state(&self, entry_id: i64) -> StorageResult<Option<RequestState>> {
        let state: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM requests WHERE id = ?1",
                params![entry_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(state.and_then(|s| RequestState::from_db_string(&s)))
    }

    /// Moves an in-flight entry to `to`, rejecting any other starting state
    fn finish_in_flight(
        &mut self,
        entry_id: i64,
        to: RequestState,
        error: Option<&str>,
        retry_increment: u32,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE requests
             SET state = ?1,
                 error_message = COALESCE(?2, error_message),
                 retry_count = retry_count + ?3,
                 updated_at = ?4
             WHERE id = ?5 AND state = ?6",
            params![
                to.to_db_string(),
                error,
                retry_increment,
                now,
                entry_id,
                RequestState::InFlight.to_db_string()
            ],
        )?;

        if changed == 0 {
            return Err(match self.entry_state(entry_id)? {
                Some(from) => StorageError::InvalidTransition {
                    id: entry_id,
                    from,
                    to,
                },
                None => StorageError::EntryNotFound(entry_id),
            });
        }

        Ok(())
    }

    fn count_in_state(&self, queue: QueueKind, state: RequestState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE queue = ?1 AND state = ?2",
            params![queue.to_db_string(), state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        source_url: row.get(0)?,
        identifier: row.get(1)?,
        is_partial: row.get::<_, i64>(2)? != 0,
        image_count: row.get::<_, i64>(3)? as u64,
        captured_at: row.get(4)?,
        payload: row.get(5)?,
    })
}

const RECORD_COLUMNS: &str = "source_url, identifier, is_partial, image_count, captured_at, payload";

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Queue Management =====

    fn open_queue(&mut self, queue: QueueKind) -> StorageResult<QueueStats> {
        let stats = self.queue_stats(queue)?;
        tracing::debug!(
            "Opened {} queue: {} pending, {} in flight, {} total",
            queue,
            stats.pending,
            stats.in_flight,
            stats.total
        );
        Ok(stats)
    }

    fn add_if_absent(
        &mut self,
        queue: QueueKind,
        url: &str,
        source: Option<&str>,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO requests (queue, url, state, source, enqueued_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                queue.to_db_string(),
                url,
                RequestState::Pending.to_db_string(),
                source,
                now
            ],
        )?;
        Ok(inserted == 1)
    }

    fn claim_next(&mut self, queue: QueueKind) -> StorageResult<Option<QueueEntry>> {
        let tx = self.conn.transaction()?;

        let next = tx
            .query_row(
                "SELECT id, url, retry_count, source FROM requests
                 WHERE queue = ?1 AND state = ?2
                 ORDER BY id LIMIT 1",
                params![queue.to_db_string(), RequestState::Pending.to_db_string()],
                |row| {
                    Ok(QueueEntry {
                        id: row.get(0)?,
                        queue,
                        url: row.get(1)?,
                        retry_count: row.get(2)?,
                        source: row.get(3)?,
                    })
                },
            )
            .optional()?;

        if let Some(entry) = &next {
            tx.execute(
                "UPDATE requests SET state = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    RequestState::InFlight.to_db_string(),
                    Utc::now().to_rfc3339(),
                    entry.id
                ],
            )?;
        }

        tx.commit()?;
        Ok(next)
    }

    fn mark_handled(&mut self, entry_id: i64) -> StorageResult<()> {
        self.finish_in_flight(entry_id, RequestState::Handled, None, 0)
    }

    fn release_for_retry(&mut self, entry_id: i64, error: &str) -> StorageResult<u32> {
        self.finish_in_flight(entry_id, RequestState::Pending, Some(error), 1)?;
        let retry_count: u32 = self.conn.query_row(
            "SELECT retry_count FROM requests WHERE id = ?1",
            params![entry_id],
            |row| row.get(0),
        )?;
        Ok(retry_count)
    }

    fn mark_failed(&mut self, entry_id: i64, error: &str) -> StorageResult<()> {
        self.finish_in_flight(entry_id, RequestState::Failed, Some(error), 0)
    }

    fn mark_skipped(&mut self, entry_id: i64) -> StorageResult<()> {
        self.finish_in_flight(entry_id, RequestState::Skipped, None, 0)
    }

    fn recover_in_flight(&mut self) -> StorageResult<u64> {
        let now = Utc::now().to_rfc3339();
        let recovered = self.conn.execute(
            "UPDATE requests SET state = ?1, updated_at = ?2 WHERE state = ?3",
            params![
                RequestState::Pending.to_db_string(),
                now,
                RequestState::InFlight.to_db_string()
            ],
        )?;
        Ok(recovered as u64)
    }

    fn queue_stats(&self, queue: QueueKind) -> StorageResult<QueueStats> {
        let mut stats = QueueStats {
            pending: self.count_in_state(queue, RequestState::Pending)?,
            in_flight: self.count_in_state(queue, RequestState::InFlight)?,
            handled: self.count_in_state(queue, RequestState::Handled)?,
            failed: self.count_in_state(queue, RequestState::Failed)?,
            skipped: self.count_in_state(queue, RequestState::Skipped)?,
            total: 0,
        };
        stats.total =
            stats.pending + stats.in_flight + stats.handled + stats.failed + stats.skipped;
        Ok(stats)
    }

    fn request_state(&self, queue: QueueKind, url: &str) -> StorageResult<Option<RequestState>> {
        let state: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM requests WHERE queue = ?1 AND url = ?2",
                params![queue.to_db_string(), url],
                |row| row.get(0),
            )
            .optional()?;

        Ok(state.and_then(|s| RequestState::from_db_string(&s)))
    }

    fn urls_in_state(&self, queue: QueueKind, state: RequestState) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM requests WHERE queue = ?1 AND state = ?2 ORDER BY id")?;

        let urls = stmt
            .query_map(params![queue.to_db_string(), state.to_db_string()], |row| {
                row.get(0)
            })?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(urls)
    }

    fn clear_queues(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM requests", [])?;
        Ok(())
    }

    // ===== Record Management =====

    fn insert_record(&mut self, run_id: i64, record: &ProductRecord) -> StorageResult<bool> {
        let payload = serde_json::to_string(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO records
             (source_url, identifier, is_partial, image_count, captured_at, run_id, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.source_url,
                record.identifier,
                record.is_partial() as i64,
                record.image_count() as i64,
                record.captured_at.to_rfc3339(),
                run_id,
                payload
            ],
        )?;

        Ok(inserted == 1)
    }

    fn get_record(&self, source_url: &str) -> StorageResult<Option<StoredRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM records WHERE source_url = ?1", RECORD_COLUMNS),
                params![source_url],
                record_from_row,
            )
            .optional()?;

        Ok(record)
    }

    fn list_records(&self) -> StorageResult<Vec<StoredRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM records ORDER BY id", RECORD_COLUMNS))?;

        let records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_partial_records(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE is_partial = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn clear_records(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM records", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_P1: &str = "https://shop.example/c?page=1";
    const CATALOG_P2: &str = "https://shop.example/c?page=2";

    #[test]
    fn test_create_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Running);

        storage.complete_run(run_id).unwrap();
        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_get_missing_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(99),
            Err(StorageError::RunNotFound(99))
        ));
    }

    #[test]
    fn test_add_if_absent_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        assert!(storage
            .add_if_absent(QueueKind::Catalog, CATALOG_P1, None)
            .unwrap());
        assert!(!storage
            .add_if_absent(QueueKind::Catalog, CATALOG_P1, None)
            .unwrap());

        // Queues are independent
        assert!(storage
            .add_if_absent(QueueKind::Product, CATALOG_P1, None)
            .unwrap());
    }

    #[test]
    fn test_handled_url_is_not_re_added() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .add_if_absent(QueueKind::Catalog, CATALOG_P1, None)
            .unwrap();
        let entry = storage.claim_next(QueueKind::Catalog).unwrap().unwrap();
        storage.mark_handled(entry.id).unwrap();

        assert!(!storage
            .add_if_absent(QueueKind::Catalog, CATALOG_P1, None)
            .unwrap());
        assert!(storage.claim_next(QueueKind::Catalog).unwrap().is_none());
    }

    #[test]
    fn test_claim_next_is_fifo() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .add_if_absent(QueueKind::Catalog, CATALOG_P1, None)
            .unwrap();
        storage
            .add_if_absent(QueueKind::Catalog, CATALOG_P2, Some(CATALOG_P1))
            .unwrap();

        let first = storage.claim_next(QueueKind::Catalog).unwrap().unwrap();
        let second = storage.claim_next(QueueKind::Catalog).unwrap().unwrap();
        assert_eq!(first.url, CATALOG_P1);
        assert_eq!(first.source, None);
        assert_eq!(second.url, CATALOG_P2);
        assert_eq!(second.source.as_deref(), Some(CATALOG_P1));

        let stats = storage.queue_stats(QueueKind::Catalog).unwrap();
        assert_eq!(stats.in_flight, 2);
        assert_eq!(stats.pending, 0);
        assert!(storage.claim_next(QueueKind::Catalog).unwrap().is_none());
    }

    #[test]
    fn test_release_for_retry_bumps_count() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .add_if_absent(QueueKind::Product, CATALOG_P1, None)
            .unwrap();

        let entry = storage.claim_next(QueueKind::Product).unwrap().unwrap();
        assert_eq!(entry.retry_count, 0);
        assert_eq!(storage.release_for_retry(entry.id, "timeout").unwrap(), 1);

        let again = storage.claim_next(QueueKind::Product).unwrap().unwrap();
        assert_eq!(again.id, entry.id);
        assert_eq!(again.retry_count, 1);

        storage.mark_failed(again.id, "timeout").unwrap();
        assert_eq!(
            storage
                .request_state(QueueKind::Product, CATALOG_P1)
                .unwrap(),
            Some(RequestState::Failed)
        );
    }

    #[test]
    fn test_transition_requires_in_flight() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .add_if_absent(QueueKind::Product, CATALOG_P1, None)
            .unwrap();
        let entry = storage.claim_next(QueueKind::Product).unwrap().unwrap();
        storage.mark_skipped(entry.id).unwrap();

        assert!(matches!(
            storage.mark_handled(entry.id),
            Err(StorageError::InvalidTransition {
                from: RequestState::Skipped,
                to: RequestState::Handled,
                ..
            })
        ));
        assert!(matches!(
            storage.mark_handled(4242),
            Err(StorageError::EntryNotFound(4242))
        ));
    }

    #[test]
    fn test_recover_in_flight() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .add_if_absent(QueueKind::Catalog, CATALOG_P1, None)
            .unwrap();
        storage
            .add_if_absent(QueueKind::Catalog, CATALOG_P2, None)
            .unwrap();
        let first = storage.claim_next(QueueKind::Catalog).unwrap().unwrap();
        storage.mark_handled(first.id).unwrap();
        storage.claim_next(QueueKind::Catalog).unwrap().unwrap();

        assert_eq!(storage.recover_in_flight().unwrap(), 1);

        let stats = storage.open_queue(QueueKind::Catalog).unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.handled, 1);
        assert_eq!(stats.total, 2);
        assert_eq!(
            storage
                .urls_in_state(QueueKind::Catalog, RequestState::Pending)
                .unwrap(),
            vec![CATALOG_P2.to_string()]
        );
    }

    #[test]
    fn test_clear_queues() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .add_if_absent(QueueKind::Catalog, CATALOG_P1, None)
            .unwrap();
        storage.clear_queues().unwrap();
        assert_eq!(storage.queue_stats(QueueKind::Catalog).unwrap().total, 0);
    }

    #[test]
    fn test_insert_record_at_most_once() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();

        let mut record = ProductRecord::new("https://shop.example/shop/p/tee/42");
        record.identifier = Some("42".to_string());
        assert!(storage.insert_record(run_id, &record).unwrap());

        let partial = ProductRecord::new("https://shop.example/shop/p/tee/42").into_partial("boom");
        assert!(!storage.insert_record(run_id, &partial).unwrap());

        let stored = storage
            .get_record("https://shop.example/shop/p/tee/42")
            .unwrap()
            .unwrap();
        assert_eq!(stored.identifier.as_deref(), Some("42"));
        assert!(!stored.is_partial);
        assert_eq!(storage.count_records().unwrap(), 1);
        assert_eq!(storage.count_partial_records().unwrap(), 0);
    }

    #[test]
    fn test_partial_records_are_counted() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();

        let partial = ProductRecord::new("https://shop.example/p/1").into_partial("timeout");
        storage.insert_record(run_id, &partial).unwrap();
        storage
            .insert_record(run_id, &ProductRecord::new("https://shop.example/p/2"))
            .unwrap();

        assert_eq!(storage.count_partial_records().unwrap(), 1);
        let listed = storage.list_records().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].payload.contains("\"errorDetail\":\"timeout\""));
    }
}

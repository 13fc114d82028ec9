//! Frontier / queue manager
//!
//! The frontier combines the two durable queues held in storage with the two
//! in-memory visited registries. Every URL is normalized before it touches
//! either, so the normalized form is the only dedup key.
//!
//! Product URLs are registered in the product registry the moment they are
//! accepted into the product queue. Catalog URLs are registered when a worker
//! claims them.

mod registry;

pub use registry::VisitedRegistry;

use crate::state::RequestState;
use crate::storage::{
    QueueEntry, QueueKind, QueueStats, SqliteStorage, Storage, StorageError, StorageResult,
};
use crate::url::normalize_url;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage shared between the frontier, the workers and the record sink
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Locks shared storage, mapping a poisoned lock to a storage error
pub fn lock_storage(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|e| StorageError::Lock(e.to_string()))
}

/// The combined queue + visited-registry abstraction
pub struct Frontier {
    storage: SharedStorage,
    catalog_visited: VisitedRegistry,
    product_visited: VisitedRegistry,
}

impl Frontier {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            catalog_visited: VisitedRegistry::new("catalog"),
            product_visited: VisitedRegistry::new("product"),
        }
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn registry(&self, queue: QueueKind) -> &VisitedRegistry {
        match queue {
            QueueKind::Catalog => &self.catalog_visited,
            QueueKind::Product => &self.product_visited,
        }
    }

    /// Opens both queues and returns their statistics
    pub fn open(&self) -> StorageResult<(QueueStats, QueueStats)> {
        let mut storage = lock_storage(&self.storage)?;
        let catalog = storage.open_queue(QueueKind::Catalog)?;
        let product = storage.open_queue(QueueKind::Product)?;
        Ok((catalog, product))
    }

    /// Offers a URL to a queue
    ///
    /// # Arguments
    ///
    /// * `queue` - The target queue
    /// * `url` - Absolute URL, normalized here before any dedup check
    /// * `source` - The page the URL was found on
    ///
    /// # Returns
    ///
    /// `true` if the URL was newly accepted as pending. URLs that fail to
    /// normalize, are already in the visited registry, or were ever present
    /// in the queue return `false`.
    pub fn enqueue(&self, queue: QueueKind, url: &str, source: Option<&str>) -> StorageResult<bool> {
        let normalized = match normalize_url(url) {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::debug!("Rejected {} for {} queue: {}", url, queue, e);
                return Ok(false);
            }
        };
        let key = normalized.as_str();
        let registry = self.registry(queue);

        // The storage lock serializes check-and-add across workers
        let mut storage = lock_storage(&self.storage)?;

        if registry.contains(key) {
            return Ok(false);
        }

        let accepted = storage.add_if_absent(queue, key, source)?;
        if accepted && queue == QueueKind::Product {
            registry.mark(key);
        }

        if accepted {
            tracing::debug!("Enqueued {} into {} queue", key, queue);
        }

        Ok(accepted)
    }

    /// Seeds the catalog queue with start URLs
    ///
    /// # Returns
    ///
    /// The number of start URLs newly accepted
    pub fn seed<S: AsRef<str>>(&self, start_urls: &[S]) -> StorageResult<usize> {
        let mut accepted = 0;
        for url in start_urls {
            if self.enqueue(QueueKind::Catalog, url.as_ref(), None)? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Claims the next pending entry of a queue
    pub fn dequeue(&self, queue: QueueKind) -> StorageResult<Option<QueueEntry>> {
        let entry = lock_storage(&self.storage)?.claim_next(queue)?;

        if let Some(entry) = &entry {
            if queue == QueueKind::Catalog {
                self.catalog_visited.mark(&entry.url);
            }
        }

        Ok(entry)
    }

    pub fn complete(&self, entry: &QueueEntry) -> StorageResult<()> {
        lock_storage(&self.storage)?.mark_handled(entry.id)
    }

    /// Returns an entry to its queue, returning the new retry count
    pub fn retry(&self, entry: &QueueEntry, error: &str) -> StorageResult<u32> {
        lock_storage(&self.storage)?.release_for_retry(entry.id, error)
    }

    pub fn fail(&self, entry: &QueueEntry, error: &str) -> StorageResult<()> {
        lock_storage(&self.storage)?.mark_failed(entry.id, error)
    }

    pub fn skip(&self, entry: &QueueEntry) -> StorageResult<()> {
        lock_storage(&self.storage)?.mark_skipped(entry.id)
    }

    pub fn stats(&self, queue: QueueKind) -> StorageResult<QueueStats> {
        lock_storage(&self.storage)?.queue_stats(queue)
    }

    /// Re-offers entries that were in flight when a previous process stopped
    pub fn recover_in_flight(&self) -> StorageResult<u64> {
        lock_storage(&self.storage)?.recover_in_flight()
    }

    pub fn state_of(&self, queue: QueueKind, url: &str) -> StorageResult<Option<RequestState>> {
        let Ok(normalized) = normalize_url(url) else {
            return Ok(None);
        };
        lock_storage(&self.storage)?.request_state(queue, normalized.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontier() -> Frontier {
        let storage = SqliteStorage::new_in_memory().unwrap();
        Frontier::new(Arc::new(Mutex::new(storage)))
    }

    #[test]
    fn test_enqueue_twice_accepts_once() {
        let frontier = frontier();
        let url = "https://shop.example/shop/c?page=2";

        assert!(frontier.enqueue(QueueKind::Catalog, url, None).unwrap());
        assert!(!frontier.enqueue(QueueKind::Catalog, url, None).unwrap());
    }

    #[test]
    fn test_enqueue_dedups_on_normalized_form() {
        let frontier = frontier();

        assert!(frontier
            .enqueue(QueueKind::Catalog, "https://Shop.example/c?sort=a&page=2", None)
            .unwrap());
        assert!(!frontier
            .enqueue(QueueKind::Catalog, "https://shop.example/c/?page=2&sort=a#x", None)
            .unwrap());
        assert_eq!(frontier.stats(QueueKind::Catalog).unwrap().total, 1);
    }

    #[test]
    fn test_product_urls_are_pre_registered() {
        let frontier = frontier();
        let url = "https://shop.example/shop/p/tee/42";

        assert!(frontier
            .enqueue(QueueKind::Product, url, Some("https://shop.example/c?page=1"))
            .unwrap());
        assert!(frontier.registry(QueueKind::Product).contains(url));

        // Claiming does not hide the entry from the worker
        let entry = frontier.dequeue(QueueKind::Product).unwrap().unwrap();
        assert_eq!(entry.url, url);
        assert_eq!(
            entry.source.as_deref(),
            Some("https://shop.example/c?page=1")
        );
    }

    #[test]
    fn test_catalog_urls_registered_on_dequeue() {
        let frontier = frontier();
        let url = "https://shop.example/c?page=1";
        frontier.seed(&[url]).unwrap();

        assert!(!frontier.registry(QueueKind::Catalog).contains(url));
        let entry = frontier.dequeue(QueueKind::Catalog).unwrap().unwrap();
        assert!(frontier.registry(QueueKind::Catalog).contains(&entry.url));

        frontier.complete(&entry).unwrap();
        assert!(!frontier.enqueue(QueueKind::Catalog, url, None).unwrap());
        assert_eq!(
            frontier.state_of(QueueKind::Catalog, url).unwrap(),
            Some(RequestState::Handled)
        );
    }

    #[test]
    fn test_registry_rejects_even_if_store_forgot() {
        let frontier = frontier();
        let url = "https://shop.example/c?page=3";
        frontier.registry(QueueKind::Catalog).mark(url);

        assert!(!frontier.enqueue(QueueKind::Catalog, url, None).unwrap());
        assert_eq!(frontier.stats(QueueKind::Catalog).unwrap().total, 0);
    }

    #[test]
    fn test_invalid_urls_are_rejected() {
        let frontier = frontier();
        assert!(!frontier
            .enqueue(QueueKind::Product, "mailto:sales@shop.example", None)
            .unwrap());
        assert!(!frontier.enqueue(QueueKind::Product, "not a url", None).unwrap());
    }

    #[test]
    fn test_retry_then_fail() {
        let frontier = frontier();
        frontier
            .enqueue(QueueKind::Product, "https://shop.example/p/1", None)
            .unwrap();

        let entry = frontier.dequeue(QueueKind::Product).unwrap().unwrap();
        assert_eq!(frontier.retry(&entry, "timeout").unwrap(), 1);

        let entry = frontier.dequeue(QueueKind::Product).unwrap().unwrap();
        frontier.fail(&entry, "timeout").unwrap();

        let stats = frontier.stats(QueueKind::Product).unwrap();
        assert_eq!(stats.failed, 1);
        assert!(stats.is_drained());
    }
}

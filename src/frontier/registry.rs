//! Visited registries
//!
//! A registry is a process-lifetime set of normalized URLs. Check-and-mark is
//! a single locked operation, so two workers can never both claim a URL.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// A deduplication set of normalized URLs
#[derive(Debug)]
pub struct VisitedRegistry {
    name: &'static str,
    seen: Mutex<HashSet<String>>,
}

impl VisitedRegistry {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if the URL has been marked
    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    /// Marks a URL as visited
    ///
    /// Returns true if the URL was not marked before.
    pub fn mark(&self, url: &str) -> bool {
        self.lock().insert(url.to_string())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the set cannot leave it half-updated
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mark_is_check_and_set() {
        let registry = VisitedRegistry::new("catalog");
        assert!(!registry.contains("https://a.example/c?page=1"));
        assert!(registry.mark("https://a.example/c?page=1"));
        assert!(!registry.mark("https://a.example/c?page=1"));
        assert!(registry.contains("https://a.example/c?page=1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_marks_accept_once() {
        let registry = Arc::new(VisitedRegistry::new("product"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.mark("https://a.example/p/1"))
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(accepted, 1);
    }
}

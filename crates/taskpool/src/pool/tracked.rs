//! Registry of workers with an armed idle timer

use std::collections::HashSet;

use parking_lot::RwLock;

/// Worker identifiers currently subject to idle eviction
///
/// `total_workers - len()` is the number of workers that are actively useful;
/// the pool compares that against `init` to decide whether a worker that just
/// finished a task should arm an idle timer.
#[derive(Debug, Default)]
pub struct TimeoutTrackedWorkers {
    ids: RwLock<HashSet<u64>>,
}

impl TimeoutTrackedWorkers {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a worker is tracked
    pub fn contains(&self, id: u64) -> bool {
        self.ids.read().contains(&id)
    }

    /// Track a worker; returns false if it was already tracked
    pub fn insert(&self, id: u64) -> bool {
        self.ids.write().insert(id)
    }

    /// Stop tracking a worker; returns false if it was not tracked
    pub fn remove(&self, id: u64) -> bool {
        self.ids.write().remove(&id)
    }

    /// Number of tracked workers
    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// Check if no worker is tracked
    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_and_remove() {
        let set = TimeoutTrackedWorkers::new();
        assert!(set.is_empty());

        assert!(set.insert(1));
        assert!(set.insert(2));
        assert!(!set.insert(1));
        assert_eq!(set.len(), 2);
        assert!(set.contains(1));

        assert!(set.remove(1));
        assert!(!set.remove(1));
        assert!(!set.contains(1));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_concurrent_updates() {
        let set = Arc::new(TimeoutTrackedWorkers::new());

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let id = t * 1000 + i;
                        set.insert(id);
                        if i % 2 == 0 {
                            set.remove(id);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(set.len(), 8 * 50);
    }
}

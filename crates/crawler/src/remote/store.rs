//
// remote/store.rs
//
// Content-addressed snapshot registry shared by host and worker
//

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::error::{CrawlerError, Result};
use crate::snapshot::{Checksum, Solution};

/// Snapshots kept resolvable at once. Older ones are evicted first.
const SNAPSHOT_STORE_MAX_ENTRIES: usize = 64;

/// Bounded `checksum -> snapshot` registry.
///
/// Hosts register a snapshot before invoking the worker; the worker resolves
/// the checksum carried by the request. Resolving promotes the entry.
pub struct SnapshotStore {
    inner: Mutex<LruCache<Checksum, Arc<Solution>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::with_capacity(SNAPSHOT_STORE_MAX_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Make a snapshot resolvable and return its checksum
    pub fn register(&self, solution: Arc<Solution>) -> Checksum {
        let checksum = solution.checksum();
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if cache.get(&checksum).is_none() {
            if let Some((evicted, _)) = cache.push(checksum, solution) {
                if evicted != checksum {
                    log::trace!("Snapshot {} evicted from store", evicted);
                }
            }
        }
        checksum
    }

    pub fn resolve(&self, checksum: Checksum) -> Result<Arc<Solution>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&checksum)
            .cloned()
            .ok_or(CrawlerError::SnapshotNotFound(checksum))
    }

    pub fn contains(&self, checksum: Checksum) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&checksum)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

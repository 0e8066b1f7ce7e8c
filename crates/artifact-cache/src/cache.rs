//! Get-or-compute artifact cache

use crate::error::{CacheError, ComputeError, StoreError};
use crate::key::CacheKey;
use crate::store::BlobStore;
use crate::sweep;
use crate::types::{CacheOptions, CacheStats, LookupResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

type KeyLocks = Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>;

/// A content-addressed cache in front of an expensive computation.
///
/// Concurrent misses on the same key run the computation once; the other
/// callers wait for it and are served the stored artifact.
pub struct ArtifactCache {
    store: Arc<dyn BlobStore>,
    options: CacheOptions,
    /// Per-key computation locks; the map lock is never held across an await
    in_flight: KeyLocks,
    sweeping: Arc<AtomicBool>,
    hits: AtomicU64,
    misses: AtomicU64,
    fresh: AtomicU64,
    empty: AtomicU64,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn BlobStore>, options: CacheOptions) -> Self {
        Self {
            store,
            options,
            in_flight: Mutex::new(HashMap::new()),
            sweeping: Arc::new(AtomicBool::new(false)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fresh: AtomicU64::new(0),
            empty: AtomicU64::new(0),
        }
    }

    /// Create the cache, emptying the store first if `purge_on_start` is set
    pub async fn open(
        store: Arc<dyn BlobStore>,
        options: CacheOptions,
    ) -> Result<Self, CacheError> {
        let cache = Self::new(store, options);
        if cache.options.purge_on_start {
            let removed = cache.purge_all().await?;
            info!(store = cache.store.kind(), removed, "Purged cache on start");
        }
        Ok(cache)
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Return the stored artifact for `key`, running `compute` on a miss.
    ///
    /// An empty computed artifact yields [`LookupResult::Empty`] and is not
    /// stored. Compute failures and timeouts store nothing.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<LookupResult, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, ComputeError>>,
    {
        // Corrupt entries are only removed under the key lock, where no
        // writer can be replacing them
        if let Some(data) = self.lookup(key, false).await? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache hit");
            return Ok(LookupResult::Cached(data));
        }

        let slot = InFlight::claim(&self.in_flight, key);
        let _guard = slot.lock.lock().await;

        // Another caller may have stored it while we waited
        if let Some(data) = self.lookup(key, true).await? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache hit after waiting on in-flight computation");
            return Ok(LookupResult::Cached(data));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache miss, computing");

        let data = match tokio::time::timeout(self.options.compute_timeout, compute()).await {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => return Err(CacheError::Compute(e)),
            Err(_) => {
                warn!(
                    key = %key,
                    timeout_ms = self.options.compute_timeout.as_millis() as u64,
                    "Computation timed out"
                );
                return Err(CacheError::Timeout(self.options.compute_timeout));
            }
        };

        if data.is_empty() {
            self.empty.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Computation produced nothing, not caching");
            return Ok(LookupResult::Empty);
        }

        self.store.write(key, &data).await?;
        self.fresh.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, size = data.len(), "Cached fresh artifact");

        self.spawn_sweep();
        Ok(LookupResult::Fresh(data))
    }

    /// Record an empty request without touching the store
    pub fn record_empty(&self) -> LookupResult {
        self.empty.fetch_add(1, Ordering::Relaxed);
        LookupResult::Empty
    }

    /// Read `key`, treating a corrupt entry as absent
    async fn lookup(
        &self,
        key: &CacheKey,
        discard_corrupt: bool,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        match self.store.read(key).await {
            Ok(data) => Ok(data),
            Err(StoreError::Corrupt(reason)) if !discard_corrupt => {
                debug!(key = %key, reason = %reason, "Corrupt cache entry, deferring to key lock");
                Ok(None)
            }
            Err(StoreError::Corrupt(reason)) => {
                warn!(key = %key, reason = %reason, "Discarding corrupt cache entry");
                if let Err(e) = self.store.remove(key).await {
                    warn!(key = %key, error = %e, "Failed to remove corrupt cache entry");
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Start a background sweep unless one is already running
    fn spawn_sweep(&self) {
        if self.sweeping.swap(true, Ordering::AcqRel) {
            return;
        }

        let store = Arc::clone(&self.store);
        let running = SweepRunning(Arc::clone(&self.sweeping));
        let retention = self.options.retention;

        tokio::spawn(async move {
            let _running = running;
            if let Err(e) = sweep::sweep(store.as_ref(), retention).await {
                warn!(store = store.kind(), error = %e, "Background sweep failed");
            }
        });
    }

    /// Sweep expired entries now
    pub async fn sweep_now(&self) -> Result<usize, CacheError> {
        Ok(sweep::sweep(self.store.as_ref(), self.options.retention).await?)
    }

    pub async fn purge_all(&self) -> Result<usize, CacheError> {
        Ok(self.store.purge_all().await?)
    }

    pub async fn close(&self) {
        self.store.close().await;
        info!(store = self.store.kind(), "Cache closed");
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let (entries, total_size) = match self.store.entries().await {
            Ok(entries) => (entries.len(), entries.iter().map(|e| e.size).sum()),
            Err(e) => {
                warn!(store = self.store.kind(), error = %e, "Failed to list cache entries");
                (0, 0)
            }
        };

        CacheStats {
            entries,
            total_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fresh: self.fresh.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
        }
    }
}

/// Clears the sweep flag when the sweep task ends, even by panicking
struct SweepRunning(Arc<AtomicBool>);

impl Drop for SweepRunning {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A claimed per-key lock, released from the map when the last holder drops it
struct InFlight<'a> {
    locks: &'a KeyLocks,
    key: CacheKey,
    lock: Arc<AsyncMutex<()>>,
}

impl<'a> InFlight<'a> {
    fn claim(locks: &'a KeyLocks, key: &CacheKey) -> Self {
        let lock = {
            let mut map = locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(key.clone()).or_default())
        };
        Self {
            locks,
            key: key.clone(),
            lock,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours means nobody else is waiting
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(&self.key);
        }
    }
}

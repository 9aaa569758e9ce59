//! Query/result memoization with a bloom-filter pre-check.
//!
//! The cache fronts the hybrid query path: a probabilistic bloom check skips
//! the authoritative lookup for keys that were provably never stored, then an
//! LRU store with TTL expiry answers the rest. The cache is shared
//! process-wide and is always fail-open: a backend failure is recorded and
//! treated as a miss, never surfaced to the caller's query.

mod bloom;

pub use bloom::BloomFilter;

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::hybrid::HybridWeights;

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries the store holds before LRU eviction.
    pub capacity: usize,

    /// Time-to-live applied to stored entries.
    pub ttl: Duration,

    /// Expected number of distinct keys the bloom filter is sized for.
    pub bloom_capacity: usize,

    /// Target bloom false-positive rate.
    pub bloom_fp_rate: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: 1000,
            ttl: Duration::from_secs(3600),
            bloom_capacity: 100_000,
            bloom_fp_rate: 0.01,
        }
    }
}

/// A cache key derived from everything that determines a query's result set.
///
/// Two queries collide only if namespace scope, query text, `k`, and both
/// weights are identical. Weights participate via their bit patterns, so no
/// two distinct floats ever share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Compute the key for a query over the given namespaces.
    pub fn compute(namespaces: &[&str], query: &str, k: usize, weights: HybridWeights) -> Self {
        // Fixed seeds keep keys stable for the process lifetime and across
        // runs, which keeps cached artifacts debuggable.
        let build = ahash::RandomState::with_seeds(
            0x8344_2fd1,
            0x1f9a_77cd,
            0x0b1c_5e63,
            0x6d2a_9c40,
        );
        let mut hasher = build.build_hasher();

        let mut sorted: Vec<&str> = namespaces.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.hash(&mut hasher);

        query.hash(&mut hasher);
        k.hash(&mut hasher);
        weights.bm25.to_bits().hash(&mut hasher);
        weights.vector.to_bits().hash(&mut hasher);

        CacheKey(hasher.finish())
    }

    /// The raw 64-bit key value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Counters describing cache behavior since startup (or the last flush).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CacheStats {
    /// Lookups answered from the store.
    pub hits: u64,
    /// Lookups that reached the store and missed (or found an expired entry).
    pub misses: u64,
    /// Lookups short-circuited by a negative bloom answer.
    pub bloom_skips: u64,
    /// Backend failures absorbed by the fail-open policy.
    pub backend_errors: u64,
    /// Entries currently held.
    pub entries: usize,
}

/// Storage backend for the authoritative cache store.
///
/// The in-process [`MemoryBackend`] is the default; the trait exists so a
/// remote store can be plugged in. Implementations provide per-key atomicity;
/// the [`QueryCache`] wrapper converts any backend error into a miss.
pub trait CacheBackend<V>: Send + Sync + std::fmt::Debug {
    /// Fetch a live entry, refreshing its recency. Expired entries are
    /// dropped and reported as absent.
    fn get(&self, key: u64, now: Instant) -> Result<Option<V>>;

    /// Insert or overwrite an entry.
    fn put(&self, key: u64, namespaces: Vec<String>, value: V, expires_at: Instant) -> Result<()>;

    /// Remove exactly the entries scoped to `namespace`; returns how many.
    fn invalidate_namespace(&self, namespace: &str) -> Result<usize>;

    /// Drop every entry.
    fn clear(&self) -> Result<()>;

    /// Number of live entries (expired ones may still be counted).
    fn len(&self) -> Result<usize>;
}

#[derive(Debug)]
struct MemoryEntry<V> {
    value: V,
    namespaces: Vec<String>,
    expires_at: Instant,
    last_used: u64,
}

#[derive(Debug)]
struct MemoryInner<V> {
    entries: AHashMap<u64, MemoryEntry<V>>,
    tick: u64,
}

/// Bounded in-memory LRU store with TTL expiry.
///
/// Eviction is least-recently-used and independent of TTL: a full store
/// evicts its coldest entry even if that entry has time left.
#[derive(Debug)]
pub struct MemoryBackend<V> {
    capacity: usize,
    inner: Mutex<MemoryInner<V>>,
}

impl<V> MemoryBackend<V> {
    /// Create a store bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        MemoryBackend {
            capacity: capacity.max(1),
            inner: Mutex::new(MemoryInner {
                entries: AHashMap::new(),
                tick: 0,
            }),
        }
    }
}

impl<V: Clone + Send + Sync + std::fmt::Debug> CacheBackend<V> for MemoryBackend<V> {
    fn get(&self, key: u64, now: Instant) -> Result<Option<V>> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(&key) {
            None => return Ok(None),
            Some(entry) => now >= entry.expires_at,
        };
        if expired {
            inner.entries.remove(&key);
            return Ok(None);
        }

        inner.tick += 1;
        let tick = inner.tick;
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.last_used = tick;
            Ok(Some(entry.value.clone()))
        } else {
            Ok(None)
        }
    }

    fn put(&self, key: u64, namespaces: Vec<String>, value: V, expires_at: Instant) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let coldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(&key, _)| key);
            if let Some(coldest) = coldest {
                inner.entries.remove(&coldest);
            }
        }

        inner.tick += 1;
        let last_used = inner.tick;
        inner.entries.insert(
            key,
            MemoryEntry {
                value,
                namespaces,
                expires_at,
                last_used,
            },
        );
        Ok(())
    }

    fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| !entry.namespaces.iter().any(|ns| ns == namespace));
        Ok(before - inner.entries.len())
    }

    fn clear(&self) -> Result<()> {
        self.inner.lock().entries.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner.lock().entries.len())
    }
}

/// The query cache: bloom pre-check in front of an authoritative store.
///
/// All methods are safe under concurrent readers and writers, and none of
/// them can fail the surrounding query: backend errors degrade to misses.
#[derive(Debug)]
pub struct QueryCache<V> {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend<V>>,
    bloom: Mutex<BloomFilter>,
    hits: AtomicU64,
    misses: AtomicU64,
    bloom_skips: AtomicU64,
    backend_errors: AtomicU64,
}

impl<V: Clone + Send + Sync + std::fmt::Debug + 'static> QueryCache<V> {
    /// Create a cache with the in-memory backend.
    pub fn new(config: CacheConfig) -> Self {
        let backend = Arc::new(MemoryBackend::new(config.capacity));
        Self::with_backend(config, backend)
    }

    /// Create a cache over a custom backend.
    pub fn with_backend(config: CacheConfig, backend: Arc<dyn CacheBackend<V>>) -> Self {
        let bloom = BloomFilter::new(config.bloom_capacity, config.bloom_fp_rate);
        QueryCache {
            config,
            backend,
            bloom: Mutex::new(bloom),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bloom_skips: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
        }
    }

    /// Look up a key, returning the cached value on a hit.
    ///
    /// A negative bloom answer skips the store entirely. Backend failures
    /// count as misses (fail-open).
    pub fn lookup(&self, key: CacheKey) -> Option<V> {
        if !self.bloom.lock().might_contain(key.as_u64()) {
            self.bloom_skips.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match self.backend.get(key.as_u64(), Instant::now()) {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key.as_u64(), "cache hit");
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "cache backend unavailable, treating as miss");
                None
            }
        }
    }

    /// Store a value under a key with the default TTL, overwriting any
    /// previous value for that key.
    pub fn store(&self, key: CacheKey, namespaces: Vec<String>, value: V) {
        self.store_with_ttl(key, namespaces, value, self.config.ttl);
    }

    /// Store a value with an explicit TTL.
    pub fn store_with_ttl(
        &self,
        key: CacheKey,
        namespaces: Vec<String>,
        value: V,
        ttl: Duration,
    ) {
        let expires_at = Instant::now() + ttl;
        if let Err(e) = self
            .backend
            .put(key.as_u64(), namespaces, value, expires_at)
        {
            self.backend_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "cache backend unavailable, dropping store");
            return;
        }
        self.bloom.lock().insert(key.as_u64());
    }

    /// Remove exactly the entries scoped to `namespace`.
    ///
    /// The bloom filter is left untouched: it may still answer "maybe" for
    /// invalidated keys, which is safe because the authoritative store then
    /// misses.
    pub fn invalidate_namespace(&self, namespace: &str) {
        match self.backend.invalidate_namespace(namespace) {
            Ok(removed) => {
                debug!(namespace, removed, "invalidated cache entries");
            }
            Err(e) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, namespace, "cache invalidation failed");
            }
        }
    }

    /// Drop every entry and rebuild the bloom filter.
    pub fn flush(&self) {
        if let Err(e) = self.backend.clear() {
            self.backend_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "cache flush failed");
            return;
        }
        self.bloom.lock().clear();
    }

    /// Current cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bloom_skips: self.bloom_skips.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            entries: self.backend.len().unwrap_or(0),
        }
    }
}

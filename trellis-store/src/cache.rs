//! Physical cache boundary and the in-memory reference implementation.
//!
//! This module defines the contract a physical record cache must satisfy.
//! The store only ever talks to the cache through this trait, so durable
//! backends can be plugged in without touching the transaction layer.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use trellis_core::error::{StoreError, TrellisResult};
use trellis_core::record::{Record, RecordSet};
use trellis_core::CacheKey;

/// Contract for pluggable physical record caches.
///
/// Implementations must be thread-safe and support concurrent access; the
/// store guarantees that `merge`, `remove_record`, `remove_matching`, and
/// `clear` only run inside the exclusive write slot, while `load_records`
/// may run from any number of concurrent read transactions.
#[async_trait]
pub trait NormalizedCache: Send + Sync {
    /// Load the records stored under `keys`.
    ///
    /// Returns a partial map: keys with no stored record are simply absent
    /// from the result, which is not an error.
    async fn load_records(&self, keys: &[CacheKey]) -> TrellisResult<HashMap<CacheKey, Record>>;

    /// Fold a record set into the cache, field-wise and last-write-wins.
    ///
    /// Returns the dependency paths of every field that was added or whose
    /// value changed.
    async fn merge(&self, records: RecordSet) -> TrellisResult<HashSet<CacheKey>>;

    /// Remove the record stored under `key`. Returns whether it existed.
    async fn remove_record(&self, key: &CacheKey) -> TrellisResult<bool>;

    /// Remove every record whose key contains `pattern`. Returns the number
    /// of records removed.
    async fn remove_matching(&self, pattern: &str) -> TrellisResult<u64>;

    /// Drop every record.
    async fn clear(&self) -> TrellisResult<()>;
}

// ============================================================================
// IN-MEMORY CACHE
// ============================================================================

/// Usage counters for an [`InMemoryCache`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of records currently held.
    pub record_count: u64,
    /// Number of merge operations performed.
    pub merges: u64,
    /// Number of records removed (single, pattern, and clear combined).
    pub removals: u64,
}

#[derive(Debug, Default)]
struct CacheCounters {
    merges: u64,
    removals: u64,
}

/// In-memory [`NormalizedCache`] implementation.
///
/// The reference cache: a `RecordSet` behind an `RwLock`. Suitable for
/// clients that can refetch on restart; durable backends implement the same
/// trait.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    records: RwLock<RecordSet>,
    counters: RwLock<CacheCounters>,
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache pre-populated with `records`.
    pub fn with_records(records: RecordSet) -> Self {
        Self {
            records: RwLock::new(records),
            counters: RwLock::new(CacheCounters::default()),
        }
    }

    /// Snapshot the usage counters.
    pub fn stats(&self) -> TrellisResult<CacheStats> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        let counters = self.counters.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(CacheStats {
            record_count: records.len() as u64,
            merges: counters.merges,
            removals: counters.removals,
        })
    }

    /// Snapshot the full record set, for inspection in tests and tooling.
    pub fn contents(&self) -> TrellisResult<RecordSet> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.clone())
    }
}

#[async_trait]
impl NormalizedCache for InMemoryCache {
    async fn load_records(&self, keys: &[CacheKey]) -> TrellisResult<HashMap<CacheKey, Record>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(keys
            .iter()
            .filter_map(|key| records.get(key).map(|record| (key.clone(), record.clone())))
            .collect())
    }

    async fn merge(&self, incoming: RecordSet) -> TrellisResult<HashSet<CacheKey>> {
        let changed = self
            .records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .merge(incoming);
        self.counters
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .merges += 1;
        Ok(changed)
    }

    async fn remove_record(&self, key: &CacheKey) -> TrellisResult<bool> {
        let removed = self
            .records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(key)
            .is_some();
        if removed {
            self.counters
                .write()
                .map_err(|_| StoreError::LockPoisoned)?
                .removals += 1;
        }
        Ok(removed)
    }

    async fn remove_matching(&self, pattern: &str) -> TrellisResult<u64> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        let matching: Vec<CacheKey> = records
            .keys()
            .filter(|key| key.contains(pattern))
            .cloned()
            .collect();
        for key in &matching {
            records.remove(key);
        }
        drop(records);

        let count = matching.len() as u64;
        self.counters
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .removals += count;
        Ok(count)
    }

    async fn clear(&self) -> TrellisResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        let count = records.len() as u64;
        records.clear();
        drop(records);

        self.counters
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .removals += count;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

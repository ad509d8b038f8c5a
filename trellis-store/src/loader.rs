//! Per-transaction record loader.
//!
//! A [`RecordLoader`] sits between the executor and the physical cache. It
//! memoizes every lookup for the life of one transaction, so a selection
//! that references the same record from ten places costs one cache load,
//! and a read observes a stable snapshot of each record it touches.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use trellis_core::error::{StoreError, TrellisResult};
use trellis_core::record::Record;
use trellis_core::CacheKey;
use trellis_exec::RecordSource;

use crate::activity::{ActivityEvent, ActivityOutcome, CacheActivity, SubscriberRegistry};
use crate::cache::NormalizedCache;

/// Lookup counters for a [`RecordLoader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Lookups answered from the memo table.
    pub hits: u64,
    /// Lookups that went to the cache.
    pub misses: u64,
}

impl LoaderStats {
    /// Fraction of lookups answered without touching the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct LoaderState {
    memo: HashMap<CacheKey, Option<Arc<Record>>>,
    stats: LoaderStats,
}

/// Memoizing, subscriber-announcing record source over a [`NormalizedCache`].
///
/// Absent records are memoized too, so repeated lookups of a missing key hit
/// the cache once.
pub struct RecordLoader {
    cache: Arc<dyn NormalizedCache>,
    subscribers: Arc<SubscriberRegistry>,
    state: Mutex<LoaderState>,
}

impl RecordLoader {
    pub fn new(cache: Arc<dyn NormalizedCache>, subscribers: Arc<SubscriberRegistry>) -> Self {
        Self {
            cache,
            subscribers,
            state: Mutex::new(LoaderState::default()),
        }
    }

    /// Load the record stored under `key`, memoized.
    pub async fn load(&self, key: &CacheKey) -> TrellisResult<Option<Arc<Record>>> {
        {
            let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
            if let Some(memoized) = state.memo.get(key) {
                let memoized = memoized.clone();
                state.stats.hits += 1;
                return Ok(memoized);
            }
        }

        let event = ActivityEvent::new(CacheActivity::Load {
            keys: vec![key.clone()],
        });
        self.subscribers.will_perform(&event)?;
        let mut loaded = self.cache.load_records(std::slice::from_ref(key)).await?;
        let record = loaded.remove(key).map(Arc::new);
        self.subscribers.did_perform(
            &event,
            &ActivityOutcome::Loaded {
                found: usize::from(record.is_some()),
            },
        )?;

        let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
        state.memo.insert(key.clone(), record.clone());
        state.stats.misses += 1;
        Ok(record)
    }

    /// Drop every memoized record. Called after writes so later reads in the
    /// same transaction observe them.
    pub fn invalidate(&self) -> TrellisResult<()> {
        self.state
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .memo
            .clear();
        Ok(())
    }

    /// Snapshot the lookup counters.
    pub fn stats(&self) -> TrellisResult<LoaderStats> {
        Ok(self.state.lock().map_err(|_| StoreError::LockPoisoned)?.stats)
    }
}

#[async_trait]
impl RecordSource for RecordLoader {
    async fn record(&self, key: &CacheKey) -> TrellisResult<Option<Arc<Record>>> {
        self.load(key).await
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Store façade: the public entry point.
//!
//! The store owns the physical cache, the subscriber registry, and the
//! readers-writer gate that coordinates transactions. Any number of read
//! transactions run concurrently; a write transaction is exclusive. The
//! gate is fair: a pending write blocks new reads from starting, so writers
//! cannot starve under a stream of reads.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use trellis_core::error::TrellisResult;
use trellis_core::record::RecordSet;
use trellis_core::selection::{SelectionSet, Variables};
use trellis_core::{CacheKey, SubscriberId, QUERY_ROOT_KEY};

use crate::activity::{StoreSubscriber, SubscriberRegistry};
use crate::cache::{InMemoryCache, NormalizedCache};
use crate::result::QueryResult;
use crate::transaction::{ReadTransaction, WriteTransaction};

/// Handle to a normalized object-graph store.
///
/// Cloning is cheap and every clone shares the same cache, subscribers, and
/// transaction gate.
#[derive(Clone)]
pub struct Store {
    cache: Arc<dyn NormalizedCache>,
    subscribers: Arc<SubscriberRegistry>,
    gate: Arc<RwLock<()>>,
}

impl Store {
    /// Create a store over the given physical cache.
    pub fn new(cache: Arc<dyn NormalizedCache>) -> Self {
        Self {
            cache,
            subscribers: Arc::new(SubscriberRegistry::new()),
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// Create a store over a fresh [`InMemoryCache`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCache::new()))
    }

    /// Register a subscriber for cache activity.
    pub fn subscribe(&self, subscriber: Arc<dyn StoreSubscriber>) -> TrellisResult<SubscriberId> {
        self.subscribers.subscribe(subscriber)
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> TrellisResult<bool> {
        self.subscribers.unsubscribe(id)
    }

    /// Open a read transaction, waiting while a write is active or pending.
    ///
    /// Prefer [`read`](Self::read) when the transaction does not need to
    /// outlive a single block; holding the returned transaction keeps a
    /// reader slot occupied.
    pub async fn begin_read(&self) -> ReadTransaction {
        let slot = self.gate.clone().read_owned().await;
        ReadTransaction::new(self.cache.clone(), self.subscribers.clone(), slot)
    }

    /// Open a write transaction, waiting for active readers to finish.
    pub async fn begin_write(&self) -> WriteTransaction {
        let slot = self.gate.clone().write_owned().await;
        WriteTransaction::new(self.cache.clone(), self.subscribers.clone(), slot)
    }

    /// Run `body` inside a read transaction. The reader slot is released
    /// when the transaction drops, on every exit path.
    pub async fn read<T, F, Fut>(&self, body: F) -> TrellisResult<T>
    where
        F: FnOnce(ReadTransaction) -> Fut,
        Fut: Future<Output = TrellisResult<T>>,
    {
        let transaction = self.begin_read().await;
        body(transaction).await
    }

    /// Run `body` inside an exclusive write transaction.
    pub async fn write<T, F, Fut>(&self, body: F) -> TrellisResult<T>
    where
        F: FnOnce(WriteTransaction) -> Fut,
        Fut: Future<Output = TrellisResult<T>>,
    {
        let transaction = self.begin_write().await;
        body(transaction).await
    }

    /// One-shot read of `selection_set` rooted at the query root.
    pub async fn load(
        &self,
        selection_set: &SelectionSet,
        variables: &Variables,
    ) -> TrellisResult<QueryResult> {
        self.read(|tx| async move {
            tx.read_selection(&QUERY_ROOT_KEY.to_string(), selection_set, variables)
                .await
        })
        .await
    }

    /// One-shot merge of pre-normalized records. Returns the changed
    /// dependency paths.
    pub async fn publish(&self, records: RecordSet) -> TrellisResult<HashSet<CacheKey>> {
        self.write(|tx| async move { tx.merge_records(records).await })
            .await
    }
}

// =============================================================================
// TESTS
// =============================================================================

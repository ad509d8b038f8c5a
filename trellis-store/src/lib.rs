//! Trellis Store - Normalized Cache Store and Transactions
//!
//! This crate owns the physical side of the cache: the pluggable
//! `NormalizedCache` boundary with its in-memory reference implementation,
//! per-transaction record loading, the readers-writer transaction gate, the
//! `Store` facade with will/did activity subscriptions, and incremental
//! (deferred) result merging.
//!
//! # Architecture
//!
//! ```text
//! Store ──┬── NormalizedCache (InMemoryCache)
//!         ├── SubscriberRegistry ── StoreSubscriber*
//!         └── RwLock gate ──┬── ReadTransaction  ── RecordLoader
//!                           └── WriteTransaction ── RecordLoader
//! ```
//!
//! Reads run concurrently; a write holds the gate exclusively. Every cache
//! action fires a `will` activity event (subscribers may veto) before it
//! executes and a `did` event with its outcome after.

mod activity;
mod cache;
mod incremental;
mod loader;
mod result;
mod store;
mod transaction;

pub use activity::{
    ActivityEvent, ActivityOutcome, CacheActivity, StalenessWatch, StoreSubscriber,
    SubscriberRegistry,
};
pub use cache::{CacheStats, InMemoryCache, NormalizedCache};
pub use incremental::IncrementalResult;
pub use loader::{LoaderStats, RecordLoader};
pub use result::{GraphError, QueryResult};
pub use store::Store;
pub use transaction::{ReadTransaction, WriteTransaction};

// Re-export the identifiers callers need for subscriptions.
pub use trellis_core::{new_subscriber_id, SubscriberId};

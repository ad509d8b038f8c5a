//! Cache activities and the subscriber registry.
//!
//! Every mutation and load that the store performs is described by a
//! [`CacheActivity`]. Subscribers see each activity twice: once before it
//! runs (with veto power) and once after it ran (with its outcome).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use trellis_core::error::{StoreError, TrellisResult};
use trellis_core::record::RecordSet;
use trellis_core::{new_subscriber_id, CacheKey, SubscriberId, Timestamp};
use uuid::Uuid;

/// A cache operation, described before it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheActivity {
    /// Records about to be loaded from the cache.
    Load { keys: Vec<CacheKey> },
    /// Records about to be folded into the cache.
    Merge { records: RecordSet },
    /// A single record about to be removed.
    RemoveRecord { key: CacheKey },
    /// Every record whose key contains `pattern` is about to be removed.
    RemoveMatching { pattern: String },
    /// Every record is about to be dropped.
    Clear,
}

/// What actually happened when an activity ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityOutcome {
    /// How many of the requested records were found.
    Loaded { found: usize },
    /// The dependency paths whose values were added or changed.
    Merged { changed: HashSet<CacheKey> },
    /// Whether the record existed.
    Removed { removed: bool },
    /// How many records matched and were removed.
    RemovedMatching { count: u64 },
    /// The cache is now empty.
    Cleared,
}

/// A cache activity stamped with identity and wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub at: Timestamp,
    pub activity: CacheActivity,
}

impl ActivityEvent {
    pub fn new(activity: CacheActivity) -> Self {
        Self {
            id: Uuid::now_v7(),
            at: chrono::Utc::now(),
            activity,
        }
    }
}

// ============================================================================
// SUBSCRIBERS
// ============================================================================

/// Observer of store activity.
///
/// `will_perform` runs before the activity touches the cache and may reject
/// it by returning an error; a rejection aborts the activity and surfaces to
/// the caller. `did_perform` runs after the cache was updated and is purely
/// informational.
///
/// Callbacks run synchronously inside the store's transaction slot, so they
/// should be quick; anything slow belongs on a channel.
pub trait StoreSubscriber: Send + Sync {
    /// Called before `event` runs. Returning an error vetoes the activity.
    fn will_perform(&self, _event: &ActivityEvent) -> TrellisResult<()> {
        Ok(())
    }

    /// Called after `event` ran, with what it did.
    fn did_perform(&self, _event: &ActivityEvent, _outcome: &ActivityOutcome) {}
}

/// Registered subscribers, notified in subscription order.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<Vec<(SubscriberId, Arc<dyn StoreSubscriber>)>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. The returned id can later be passed to
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, subscriber: Arc<dyn StoreSubscriber>) -> TrellisResult<SubscriberId> {
        let id = new_subscriber_id();
        self.subscribers
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push((id, subscriber));
        Ok(id)
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> TrellisResult<bool> {
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let before = subscribers.len();
        subscribers.retain(|(subscriber_id, _)| *subscriber_id != id);
        Ok(subscribers.len() < before)
    }

    /// Announce `event` to every subscriber, stopping at the first veto.
    pub fn will_perform(&self, event: &ActivityEvent) -> TrellisResult<()> {
        let subscribers = self
            .subscribers
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        for (_, subscriber) in subscribers.iter() {
            subscriber.will_perform(event)?;
        }
        Ok(())
    }

    /// Report `outcome` for `event` to every subscriber.
    pub fn did_perform(&self, event: &ActivityEvent, outcome: &ActivityOutcome) -> TrellisResult<()> {
        let subscribers = self
            .subscribers
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        for (_, subscriber) in subscribers.iter() {
            subscriber.did_perform(event, outcome);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// STALENESS
// ============================================================================

/// The dependency footprint of a finished read, used to decide whether a
/// later write made that read stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessWatch {
    dependent_keys: HashSet<CacheKey>,
}

impl StalenessWatch {
    pub fn new(dependent_keys: HashSet<CacheKey>) -> Self {
        Self { dependent_keys }
    }

    /// Whether a write that changed `changed` paths invalidates this read.
    pub fn is_affected_by(&self, changed: &HashSet<CacheKey>) -> bool {
        !self.dependent_keys.is_disjoint(changed)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use trellis_core::error::TrellisError;

    #[derive(Default)]
    struct CountingSubscriber {
        wills: AtomicU64,
        dids: AtomicU64,
    }

    impl StoreSubscriber for CountingSubscriber {
        fn will_perform(&self, _event: &ActivityEvent) -> TrellisResult<()> {
            self.wills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn did_perform(&self, _event: &ActivityEvent, _outcome: &ActivityOutcome) {
            self.dids.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct VetoingSubscriber;

    impl StoreSubscriber for VetoingSubscriber {
        fn will_perform(&self, _event: &ActivityEvent) -> TrellisResult<()> {
            Err(StoreError::ActionRejected {
                reason: "not today".to_string(),
            }
            .into())
        }
    }

    #[test]
    fn test_subscribers_notified_in_order() {
        let registry = SubscriberRegistry::new();
        let counting = Arc::new(CountingSubscriber::default());
        registry.subscribe(counting.clone()).unwrap();

        let event = ActivityEvent::new(CacheActivity::Clear);
        registry.will_perform(&event).unwrap();
        registry
            .did_perform(&event, &ActivityOutcome::Cleared)
            .unwrap();

        assert_eq!(counting.wills.load(Ordering::SeqCst), 1);
        assert_eq!(counting.dids.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_veto_stops_later_subscribers() {
        let registry = SubscriberRegistry::new();
        registry.subscribe(Arc::new(VetoingSubscriber)).unwrap();
        let counting = Arc::new(CountingSubscriber::default());
        registry.subscribe(counting.clone()).unwrap();

        let event = ActivityEvent::new(CacheActivity::Clear);
        let err = registry.will_perform(&event).unwrap_err();
        assert!(matches!(
            err,
            TrellisError::Store(StoreError::ActionRejected { .. })
        ));
        assert_eq!(counting.wills.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_removes_by_id() {
        let registry = SubscriberRegistry::new();
        let id = registry
            .subscribe(Arc::new(CountingSubscriber::default()))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.unsubscribe(id).unwrap());
        assert!(!registry.unsubscribe(id).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_staleness_watch_overlap() {
        let watch = StalenessWatch::new(HashSet::from([
            "Character:1.name".to_string(),
            "QUERY_ROOT.hero".to_string(),
        ]));
        assert!(watch.is_affected_by(&HashSet::from(["Character:1.name".to_string()])));
        assert!(!watch.is_affected_by(&HashSet::from(["Character:2.name".to_string()])));
        assert!(!watch.is_affected_by(&HashSet::new()));
    }
}

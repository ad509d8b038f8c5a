//! Read and write transactions.
//!
//! A transaction owns one slot in the store's readers-writer gate for its
//! whole lifetime; dropping the transaction releases the slot. Each
//! transaction carries its own [`RecordLoader`], so everything it reads is
//! memoized for its duration and write transactions see their own writes
//! after the loader is invalidated.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};
use trellis_core::data::DataObject;
use trellis_core::error::{ExecutionError, StoreError, TrellisResult};
use trellis_core::record::RecordSet;
use trellis_core::selection::{SelectionSet, Variables};
use trellis_core::CacheKey;
use trellis_exec::{
    normalize, CacheSource, DependencyTracker, Executor, SelectionMapper, Zip,
};
use uuid::Uuid;

use crate::activity::{ActivityEvent, ActivityOutcome, CacheActivity, SubscriberRegistry};
use crate::cache::NormalizedCache;
use crate::loader::{LoaderStats, RecordLoader};
use crate::result::QueryResult;

// ============================================================================
// SHARED READ PATH
// ============================================================================

async fn read_selection_via(
    loader: &RecordLoader,
    root_key: &CacheKey,
    selection_set: &SelectionSet,
    variables: &Variables,
) -> TrellisResult<QueryResult> {
    let root = loader
        .load(root_key)
        .await?
        .ok_or_else(|| ExecutionError::MissingRecord {
            key: root_key.clone(),
        })?;
    let executor = Executor::new(variables);
    let source = CacheSource::new(loader);
    let mut accumulator = Zip(SelectionMapper::new(), DependencyTracker::new());
    let (data, dependent_keys) = executor
        .execute(&source, selection_set, root, root_key.clone(), &mut accumulator)
        .await?;
    Ok(QueryResult::new(data, dependent_keys))
}

async fn read_object_via(
    loader: &RecordLoader,
    key: &CacheKey,
    selection_set: &SelectionSet,
    variables: &Variables,
) -> TrellisResult<DataObject> {
    let root = loader
        .load(key)
        .await?
        .ok_or_else(|| ExecutionError::MissingRecord { key: key.clone() })?;
    let executor = Executor::new(variables);
    let source = CacheSource::new(loader);
    let mut accumulator = SelectionMapper::new();
    executor
        .execute(&source, selection_set, root, key.clone(), &mut accumulator)
        .await
}

// ============================================================================
// READ TRANSACTION
// ============================================================================

/// A shared-access transaction. Any number may run concurrently; none may
/// overlap a write transaction.
pub struct ReadTransaction {
    id: Uuid,
    loader: RecordLoader,
    _slot: OwnedRwLockReadGuard<()>,
}

impl ReadTransaction {
    pub(crate) fn new(
        cache: Arc<dyn NormalizedCache>,
        subscribers: Arc<SubscriberRegistry>,
        slot: OwnedRwLockReadGuard<()>,
    ) -> Self {
        let id = Uuid::now_v7();
        tracing::trace!(transaction = %id, "read transaction opened");
        Self {
            id,
            loader: RecordLoader::new(cache, subscribers),
            _slot: slot,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Execute `selection_set` against the record stored under `root_key`,
    /// producing shaped data plus its dependency footprint.
    pub async fn read_selection(
        &self,
        root_key: &CacheKey,
        selection_set: &SelectionSet,
        variables: &Variables,
    ) -> TrellisResult<QueryResult> {
        read_selection_via(&self.loader, root_key, selection_set, variables).await
    }

    /// Like [`read_selection`](Self::read_selection) but without dependency
    /// tracking, for callers that only want the data.
    pub async fn read_object(
        &self,
        key: &CacheKey,
        selection_set: &SelectionSet,
        variables: &Variables,
    ) -> TrellisResult<DataObject> {
        read_object_via(&self.loader, key, selection_set, variables).await
    }

    /// Lookup counters of this transaction's loader.
    pub fn loader_stats(&self) -> TrellisResult<LoaderStats> {
        self.loader.stats()
    }
}

// ============================================================================
// WRITE TRANSACTION
// ============================================================================

/// An exclusive-access transaction. Exposes the same read API as
/// [`ReadTransaction`] plus the mutation surface; reads issued after a write
/// observe that write.
///
/// Every mutation is announced to subscribers before it runs; a veto from
/// `will_perform` aborts the mutation before the cache is touched.
pub struct WriteTransaction {
    id: Uuid,
    cache: Arc<dyn NormalizedCache>,
    subscribers: Arc<SubscriberRegistry>,
    loader: RecordLoader,
    _slot: OwnedRwLockWriteGuard<()>,
}

impl WriteTransaction {
    pub(crate) fn new(
        cache: Arc<dyn NormalizedCache>,
        subscribers: Arc<SubscriberRegistry>,
        slot: OwnedRwLockWriteGuard<()>,
    ) -> Self {
        let id = Uuid::now_v7();
        tracing::trace!(transaction = %id, "write transaction opened");
        let loader = RecordLoader::new(cache.clone(), subscribers.clone());
        Self {
            id,
            cache,
            subscribers,
            loader,
            _slot: slot,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Execute `selection_set` against the record stored under `root_key`,
    /// producing shaped data plus its dependency footprint.
    pub async fn read_selection(
        &self,
        root_key: &CacheKey,
        selection_set: &SelectionSet,
        variables: &Variables,
    ) -> TrellisResult<QueryResult> {
        read_selection_via(&self.loader, root_key, selection_set, variables).await
    }

    /// Like [`read_selection`](Self::read_selection) but without dependency
    /// tracking.
    pub async fn read_object(
        &self,
        key: &CacheKey,
        selection_set: &SelectionSet,
        variables: &Variables,
    ) -> TrellisResult<DataObject> {
        read_object_via(&self.loader, key, selection_set, variables).await
    }

    /// Lookup counters of this transaction's loader.
    pub fn loader_stats(&self) -> TrellisResult<LoaderStats> {
        self.loader.stats()
    }

    /// Normalize a result tree under `selection_set` and fold the resulting
    /// records into the cache. Returns the changed dependency paths.
    pub async fn write_selection(
        &self,
        root_key: impl Into<CacheKey>,
        selection_set: &SelectionSet,
        variables: &Variables,
        tree: &serde_json::Value,
    ) -> TrellisResult<HashSet<CacheKey>> {
        let (_, records) = normalize(root_key, selection_set, variables, tree).await?;
        self.merge_records(records).await
    }

    /// Write shaped data back through `selection_set`. The data's JSON form
    /// is normalized exactly like a fresh result tree.
    pub async fn write_data(
        &self,
        root_key: impl Into<CacheKey>,
        selection_set: &SelectionSet,
        variables: &Variables,
        data: &DataObject,
    ) -> TrellisResult<HashSet<CacheKey>> {
        let tree = data.to_json();
        self.write_selection(root_key, selection_set, variables, &tree)
            .await
    }

    /// Read the object stored under `key`, apply `mutate` to it, and write
    /// the result back. Returns the changed dependency paths.
    pub async fn update_object(
        &self,
        key: &CacheKey,
        selection_set: &SelectionSet,
        variables: &Variables,
        mutate: impl FnOnce(&mut DataObject),
    ) -> TrellisResult<HashSet<CacheKey>> {
        let mut object = self.read_object(key, selection_set, variables).await?;
        mutate(&mut object);
        self.write_data(key.clone(), selection_set, variables, &object)
            .await
    }

    /// Fold pre-normalized records into the cache. Returns the changed
    /// dependency paths.
    pub async fn merge_records(&self, records: RecordSet) -> TrellisResult<HashSet<CacheKey>> {
        let event = ActivityEvent::new(CacheActivity::Merge {
            records: records.clone(),
        });
        self.subscribers.will_perform(&event)?;
        let changed = self.cache.merge(records).await?;
        tracing::debug!(
            transaction = %self.id,
            changed = changed.len(),
            "merged records"
        );
        self.subscribers.did_perform(
            &event,
            &ActivityOutcome::Merged {
                changed: changed.clone(),
            },
        )?;
        self.loader.invalidate()?;
        Ok(changed)
    }

    /// Remove the record stored under `key`. Returns whether it existed.
    pub async fn remove_record(&self, key: &CacheKey) -> TrellisResult<bool> {
        let event = ActivityEvent::new(CacheActivity::RemoveRecord { key: key.clone() });
        self.subscribers.will_perform(&event)?;
        let removed = self.cache.remove_record(key).await?;
        tracing::debug!(transaction = %self.id, key = %key, removed, "removed record");
        self.subscribers
            .did_perform(&event, &ActivityOutcome::Removed { removed })?;
        self.loader.invalidate()?;
        Ok(removed)
    }

    /// Remove every record whose key contains `pattern`. Returns the number
    /// of records removed.
    pub async fn remove_matching(&self, pattern: &str) -> TrellisResult<u64> {
        if pattern.is_empty() {
            return Err(StoreError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "empty pattern matches every record; use clear".to_string(),
            }
            .into());
        }
        let event = ActivityEvent::new(CacheActivity::RemoveMatching {
            pattern: pattern.to_string(),
        });
        self.subscribers.will_perform(&event)?;
        let count = self.cache.remove_matching(pattern).await?;
        tracing::debug!(transaction = %self.id, pattern, count, "removed matching records");
        self.subscribers
            .did_perform(&event, &ActivityOutcome::RemovedMatching { count })?;
        self.loader.invalidate()?;
        Ok(count)
    }

    /// Drop every record.
    pub async fn clear(&self) -> TrellisResult<()> {
        let event = ActivityEvent::new(CacheActivity::Clear);
        self.subscribers.will_perform(&event)?;
        self.cache.clear().await?;
        tracing::debug!(transaction = %self.id, "cleared cache");
        self.subscribers
            .did_perform(&event, &ActivityOutcome::Cleared)?;
        self.loader.invalidate()?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityEvent, StoreSubscriber};
    use crate::cache::InMemoryCache;
    use serde_json::json;
    use tokio::sync::RwLock;
    use trellis_core::data::DataValue;
    use trellis_core::error::TrellisError;
    use trellis_core::policy::FieldPolicy;
    use trellis_core::selection::{Argument, ArgumentValue, Field, FieldShape};
    use trellis_core::QUERY_ROOT_KEY;

    struct VetoMerges;

    impl StoreSubscriber for VetoMerges {
        fn will_perform(&self, event: &ActivityEvent) -> TrellisResult<()> {
            match event.activity {
                CacheActivity::Merge { .. } => Err(StoreError::ActionRejected {
                    reason: "merges disabled".to_string(),
                }
                .into()),
                _ => Ok(()),
            }
        }
    }

    fn hero_selection() -> SelectionSet {
        SelectionSet::new("Query").with_field(
            Field::new(
                "hero",
                FieldShape::Object(
                    SelectionSet::new("Character")
                        .with_field(Field::new("name", FieldShape::Scalar)),
                ),
            )
            .with_argument(Argument::new(
                "id",
                ArgumentValue::Scalar(json!("1")),
            ))
            .with_policy(FieldPolicy::from_specs(["id"]).unwrap()),
        )
    }

    struct Harness {
        cache: Arc<InMemoryCache>,
        subscribers: Arc<SubscriberRegistry>,
        gate: Arc<RwLock<()>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                cache: Arc::new(InMemoryCache::new()),
                subscribers: Arc::new(SubscriberRegistry::new()),
                gate: Arc::new(RwLock::new(())),
            }
        }

        async fn write_tx(&self) -> WriteTransaction {
            WriteTransaction::new(
                self.cache.clone(),
                self.subscribers.clone(),
                self.gate.clone().write_owned().await,
            )
        }

        async fn read_tx(&self) -> ReadTransaction {
            ReadTransaction::new(
                self.cache.clone(),
                self.subscribers.clone(),
                self.gate.clone().read_owned().await,
            )
        }
    }

    #[tokio::test]
    async fn test_write_then_read_in_same_transaction() {
        let harness = Harness::new();
        let selection = hero_selection();
        let variables = Variables::new();
        let tree = json!({"hero": {"name": "Luke"}});

        let tx = harness.write_tx().await;
        let changed = tx
            .write_selection(QUERY_ROOT_KEY, &selection, &variables, &tree)
            .await
            .unwrap();
        assert!(changed.contains("Character:1.name"));

        let result = tx
            .read_selection(&QUERY_ROOT_KEY.to_string(), &selection, &variables)
            .await
            .unwrap();
        let hero = match result.data.get("hero") {
            Some(DataValue::Object(object)) => object,
            other => panic!("expected hero object, got {other:?}"),
        };
        assert_eq!(hero.get("name"), Some(&DataValue::Scalar(json!("Luke"))));
        assert!(result.dependent_keys.contains("Character:1.name"));
    }

    #[tokio::test]
    async fn test_veto_leaves_cache_untouched() {
        let harness = Harness::new();
        harness.subscribers.subscribe(Arc::new(VetoMerges)).unwrap();

        let tx = harness.write_tx().await;
        let err = tx
            .write_selection(
                QUERY_ROOT_KEY,
                &hero_selection(),
                &Variables::new(),
                &json!({"hero": {"name": "Luke"}}),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TrellisError::Store(StoreError::ActionRejected { .. })
        ));
        let stats = harness.cache.stats().unwrap();
        assert_eq!(stats.record_count, 0);
        assert_eq!(stats.merges, 0);
    }

    #[tokio::test]
    async fn test_update_object_reports_changed_paths() {
        let harness = Harness::new();
        let selection = hero_selection();
        let variables = Variables::new();

        {
            let tx = harness.write_tx().await;
            tx.write_selection(
                QUERY_ROOT_KEY,
                &selection,
                &variables,
                &json!({"hero": {"name": "Luke"}}),
            )
            .await
            .unwrap();
        }

        let tx = harness.write_tx().await;
        let changed = tx
            .update_object(&QUERY_ROOT_KEY.to_string(), &selection, &variables, |data| {
                if let Some(DataValue::Object(hero)) = data.fields.get_mut("hero") {
                    hero.insert("name", DataValue::Scalar(json!("Leia")));
                }
            })
            .await
            .unwrap();
        assert_eq!(changed, HashSet::from(["Character:1.name".to_string()]));

        let reread = tx
            .read_object(&QUERY_ROOT_KEY.to_string(), &selection, &variables)
            .await
            .unwrap();
        assert_eq!(
            reread.value_at(&["hero".into(), "name".into()]),
            Some(&DataValue::Scalar(json!("Leia")))
        );
    }

    #[tokio::test]
    async fn test_empty_pattern_rejected_before_subscribers() {
        let harness = Harness::new();
        harness.subscribers.subscribe(Arc::new(VetoMerges)).unwrap();

        let tx = harness.write_tx().await;
        let err = tx.remove_matching("").await.unwrap_err();
        assert!(matches!(
            err,
            TrellisError::Store(StoreError::InvalidPattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_transaction_misses_root() {
        let harness = Harness::new();
        let tx = harness.read_tx().await;
        let err = tx
            .read_selection(
                &QUERY_ROOT_KEY.to_string(),
                &hero_selection(),
                &Variables::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrellisError::Execution(ExecutionError::MissingRecord { .. })
        ));
    }
}

//! Write-path normalization
//!
//! The normalizer is a `ResultAccumulator` that flattens a hierarchical
//! result tree into a `RecordSet`. Every object the executor finishes becomes
//! one record under its resolved cache key; the parent keeps only a
//! `CacheReference`. Two objects resolving to the same key within one tree
//! fold into a single record.

use crate::accumulator::{FieldContext, ObjectContext, ResultAccumulator};
use crate::engine::Executor;
use crate::source::JsonSource;
use std::mem;
use trellis_core::error::TrellisResult;
use trellis_core::record::{CacheReference, Record, RecordSet, RecordValue};
use trellis_core::selection::{SelectionSet, Variables};
use trellis_core::CacheKey;

/// Accumulator that turns an executed result tree into normalized records.
#[derive(Debug, Default)]
pub struct RecordNormalizer {
    records: RecordSet,
}

impl RecordNormalizer {
    /// Create a normalizer with an empty record set.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultAccumulator for RecordNormalizer {
    /// Absent fields produce `None` and are left out of the record, keeping
    /// the stored null-versus-absent distinction intact.
    type Partial = Option<RecordValue>;
    type Entry = (String, RecordValue);
    type Object = CacheReference;
    type Output = (CacheReference, RecordSet);

    fn scalar(
        &mut self,
        value: &serde_json::Value,
        _ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        Ok(Some(RecordValue::from_json_repr(value.clone())))
    }

    fn null(&mut self, _ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial> {
        Ok(Some(RecordValue::Null))
    }

    fn missing(&mut self, _ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial> {
        Ok(None)
    }

    fn list(
        &mut self,
        items: Vec<Self::Partial>,
        _ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        Ok(items
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .map(RecordValue::List))
    }

    fn child(
        &mut self,
        object: Self::Object,
        _ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        Ok(Some(RecordValue::Reference(object)))
    }

    fn entry(
        &mut self,
        partial: Self::Partial,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Option<Self::Entry>> {
        Ok(partial.map(|value| (ctx.storage_key.to_string(), value)))
    }

    fn object(
        &mut self,
        entries: Vec<Self::Entry>,
        ctx: &ObjectContext,
    ) -> TrellisResult<Self::Object> {
        let key = ctx.key_info.key().clone();
        self.records.merge_record(Record::with_fields(key.clone(), entries));
        Ok(CacheReference::new(key))
    }

    fn finish(&mut self, root: Self::Object) -> TrellisResult<Self::Output> {
        Ok((root, mem::take(&mut self.records)))
    }
}

/// Normalize a hierarchical result `tree` delivered for `selection_set`.
///
/// Returns the reference to the root record (stored under `root_key`) and the
/// full set of records the tree produced.
pub async fn normalize(
    root_key: impl Into<CacheKey>,
    selection_set: &SelectionSet,
    variables: &Variables,
    tree: &serde_json::Value,
) -> TrellisResult<(CacheReference, RecordSet)> {
    let executor = Executor::new(variables);
    let mut normalizer = RecordNormalizer::new();
    executor
        .execute(&JsonSource, selection_set, tree, root_key, &mut normalizer)
        .await
}

// =============================================================================
// TESTS
// =============================================================================

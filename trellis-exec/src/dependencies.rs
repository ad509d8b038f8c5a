//! Read dependency tracking

use crate::accumulator::{FieldContext, ObjectContext, ResultAccumulator};
use std::collections::HashSet;
use std::mem;
use trellis_core::error::TrellisResult;
use trellis_core::CacheKey;

/// Accumulator that records the dependency path of every field a read pass
/// touches, including fields that turn out to be absent. A read that misses a
/// field still depends on it: once the field arrives, the read is stale.
///
/// Pair it with a data-producing accumulator through [`crate::Zip`] to get
/// data and dependencies from a single pass.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    paths: HashSet<CacheKey>,
}

impl DependencyTracker {
    /// Create a tracker with no recorded paths.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultAccumulator for DependencyTracker {
    type Partial = ();
    type Entry = ();
    type Object = ();
    type Output = HashSet<CacheKey>;

    fn scalar(
        &mut self,
        _value: &serde_json::Value,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        self.paths.insert(ctx.dependency_path());
        Ok(())
    }

    fn null(&mut self, ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial> {
        self.paths.insert(ctx.dependency_path());
        Ok(())
    }

    fn missing(&mut self, ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial> {
        self.paths.insert(ctx.dependency_path());
        Ok(())
    }

    fn list(
        &mut self,
        _items: Vec<Self::Partial>,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        self.paths.insert(ctx.dependency_path());
        Ok(())
    }

    fn child(
        &mut self,
        _object: Self::Object,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        self.paths.insert(ctx.dependency_path());
        Ok(())
    }

    fn entry(
        &mut self,
        _partial: Self::Partial,
        _ctx: &FieldContext<'_>,
    ) -> TrellisResult<Option<Self::Entry>> {
        Ok(Some(()))
    }

    fn object(
        &mut self,
        _entries: Vec<Self::Entry>,
        _ctx: &ObjectContext,
    ) -> TrellisResult<Self::Object> {
        Ok(())
    }

    fn finish(&mut self, _root: Self::Object) -> TrellisResult<Self::Output> {
        Ok(mem::take(&mut self.paths))
    }
}

// =============================================================================
// TESTS
// =============================================================================

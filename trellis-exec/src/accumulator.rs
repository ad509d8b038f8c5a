//! Result accumulation interface
//!
//! The executor walks a selection tree once and feeds what it finds into a
//! `ResultAccumulator`. Swapping the accumulator swaps the product of the
//! walk: records on the write path, shaped data and dependency paths on the
//! read path. `Zip` runs two accumulators in the same pass so a read never
//! walks twice.

use std::collections::BTreeSet;
use trellis_core::error::TrellisResult;
use trellis_core::selection::Field;
use trellis_core::CacheKey;

// ============================================================================
// EXECUTION CONTEXTS
// ============================================================================

/// Resolved identity of one object during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKeyInfo {
    /// Key minted by a field policy.
    Custom(CacheKey),
    /// Key derived from the parent key, the field's storage key, and the
    /// list index when inside a list.
    Structural(CacheKey),
}

impl CacheKeyInfo {
    /// The resolved cache key.
    pub fn key(&self) -> &CacheKey {
        match self {
            CacheKeyInfo::Custom(key) | CacheKeyInfo::Structural(key) => key,
        }
    }

    /// Whether the key came from a field policy.
    pub fn is_custom(&self) -> bool {
        matches!(self, CacheKeyInfo::Custom(_))
    }
}

/// Per-position context handed to accumulator callbacks.
///
/// One context exists per field; list element positions get copies with the
/// element's own optionality.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    /// The requested field.
    pub field: &'a Field,
    /// Storage key rendered against the active variables.
    pub storage_key: &'a str,
    /// Key of the record holding the field.
    pub record_key: &'a CacheKey,
    /// Whether absence is tolerated at this position.
    pub optional: bool,
}

impl FieldContext<'_> {
    /// Response key of the field.
    pub fn response_key(&self) -> &str {
        self.field.response_key()
    }

    /// Dependency path of this field entry: `<record key>.<storage key>`.
    pub fn dependency_path(&self) -> CacheKey {
        format!("{}.{}", self.record_key, self.storage_key)
    }
}

/// Per-object context handed to [`ResultAccumulator::object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectContext {
    /// Resolved identity of the object.
    pub key_info: CacheKeyInfo,
    /// Labels of fragments whose fields were delivered with the object.
    pub fulfilled: BTreeSet<String>,
}

// ============================================================================
// ACCUMULATOR TRAIT
// ============================================================================

/// Folds one pass over a selection tree into an output.
///
/// The executor drives accumulators bottom-up: the leaf callbacks produce
/// `Partial` values, `entry` closes out one field (returning `None` omits
/// it), `object` folds an object's accepted entries, `child` re-wraps a
/// finished child object as the partial of the field that yielded it, and
/// `finish` converts the root object into the pass output.
///
/// Entries handed back from `entry` may be discarded without reaching
/// `object` when a deferred fragment turns out to be incomplete, so
/// implementations must not treat `entry` as a commitment.
pub trait ResultAccumulator {
    /// Field-level intermediate value.
    type Partial;
    /// Accepted unit for one field of an object.
    type Entry;
    /// Folded object value.
    type Object;
    /// Final result of the pass.
    type Output;

    /// A scalar leaf.
    fn scalar(
        &mut self,
        value: &serde_json::Value,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial>;

    /// An explicit null.
    fn null(&mut self, ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial>;

    /// A position the source has no value for.
    fn missing(&mut self, ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial>;

    /// An ordered list of element partials.
    fn list(
        &mut self,
        items: Vec<Self::Partial>,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial>;

    /// A finished child object, as the partial of the field that yielded it.
    fn child(
        &mut self,
        object: Self::Object,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial>;

    /// Close out one field; `None` omits the entry from the object.
    fn entry(
        &mut self,
        partial: Self::Partial,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Option<Self::Entry>>;

    /// Fold an object's accepted entries.
    fn object(
        &mut self,
        entries: Vec<Self::Entry>,
        ctx: &ObjectContext,
    ) -> TrellisResult<Self::Object>;

    /// Finish the pass with the root object.
    fn finish(&mut self, root: Self::Object) -> TrellisResult<Self::Output>;
}

// ============================================================================
// ZIP
// ============================================================================

/// Runs two accumulators over the same pass, pairing their outputs.
///
/// An entry survives only when both sides accept it.
#[derive(Debug, Default)]
pub struct Zip<A, B>(pub A, pub B);

impl<A: ResultAccumulator, B: ResultAccumulator> ResultAccumulator for Zip<A, B> {
    type Partial = (A::Partial, B::Partial);
    type Entry = (A::Entry, B::Entry);
    type Object = (A::Object, B::Object);
    type Output = (A::Output, B::Output);

    fn scalar(
        &mut self,
        value: &serde_json::Value,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        Ok((self.0.scalar(value, ctx)?, self.1.scalar(value, ctx)?))
    }

    fn null(&mut self, ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial> {
        Ok((self.0.null(ctx)?, self.1.null(ctx)?))
    }

    fn missing(&mut self, ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial> {
        // Both sides observe the position even when one rejects it, so a
        // tracker paired with a failing mapper still records the path.
        let left = self.0.missing(ctx);
        let right = self.1.missing(ctx);
        Ok((left?, right?))
    }

    fn list(
        &mut self,
        items: Vec<Self::Partial>,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        let (left, right): (Vec<_>, Vec<_>) = items.into_iter().unzip();
        Ok((self.0.list(left, ctx)?, self.1.list(right, ctx)?))
    }

    fn child(
        &mut self,
        object: Self::Object,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        let (left, right) = object;
        Ok((self.0.child(left, ctx)?, self.1.child(right, ctx)?))
    }

    fn entry(
        &mut self,
        partial: Self::Partial,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Option<Self::Entry>> {
        let (left, right) = partial;
        let left = self.0.entry(left, ctx)?;
        let right = self.1.entry(right, ctx)?;
        Ok(match (left, right) {
            (Some(l), Some(r)) => Some((l, r)),
            _ => None,
        })
    }

    fn object(
        &mut self,
        entries: Vec<Self::Entry>,
        ctx: &ObjectContext,
    ) -> TrellisResult<Self::Object> {
        let (left, right): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
        Ok((self.0.object(left, ctx)?, self.1.object(right, ctx)?))
    }

    fn finish(&mut self, root: Self::Object) -> TrellisResult<Self::Output> {
        let (left, right) = root;
        Ok((self.0.finish(left)?, self.1.finish(right)?))
    }
}

//! Value sources for selection execution
//!
//! A source answers "what is the value of this field on this object". The
//! write path answers from a raw result tree keyed by response keys; the
//! read path answers from normalized records keyed by storage keys, loading
//! referenced records on demand. Lookup is shape-directed so both sources
//! deliver the same `SourceValue` vocabulary to the executor.

use crate::accumulator::{CacheKeyInfo, FieldContext};
use async_trait::async_trait;
use std::sync::Arc;
use trellis_core::error::TrellisResult;
use trellis_core::record::{CacheReference, Record, RecordValue};
use trellis_core::selection::FieldShape;
use trellis_core::CacheKey;

/// Raw value a source yields for one field position.
#[derive(Debug, Clone)]
pub enum SourceValue<O> {
    /// The source has no entry for the field.
    Missing,
    /// Explicit null.
    Null,
    /// Scalar leaf.
    Scalar(serde_json::Value),
    /// Ordered list of element values.
    List(Vec<SourceValue<O>>),
    /// Handle to a nested object.
    Object(O),
    /// Stored pointer to another record.
    Reference(CacheReference),
    /// Value whose stored form contradicts the declared shape.
    Invalid { expected: &'static str },
}

/// Where field values come from during one execution pass.
///
/// Only child resolution is async, for sources that load records on demand.
#[async_trait]
pub trait ExecutionSource<'a>: Send + Sync {
    /// Handle to one object's fields.
    type Object: Clone + Send + Sync + 'a;

    /// Concrete type name of an object, when the source knows it.
    fn type_name(&self, object: &Self::Object) -> Option<String>;

    /// Value of one field on an object, interpreted against the field's
    /// declared shape.
    fn lookup(&self, object: &Self::Object, ctx: &FieldContext<'_>) -> SourceValue<Self::Object>;

    /// Resolve the object a field value designates. A custom key from a
    /// field policy overrides whatever the source stored.
    async fn child_object(
        &self,
        value: SourceValue<Self::Object>,
        key_info: &CacheKeyInfo,
    ) -> TrellisResult<Option<Self::Object>>
    where
        'a: 'async_trait;
}

// ============================================================================
// JSON SOURCE (WRITE PATH)
// ============================================================================

/// Source over a raw result tree, for normalizing writes.
///
/// Fields are looked up by response key, matching how servers key their
/// payloads. Arrays under a scalar shape stay lists of scalars, which is the
/// canonical stored form for array-valued custom scalars.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSource;

impl JsonSource {
    fn convert<'a>(
        value: &'a serde_json::Value,
        shape: &FieldShape,
    ) -> SourceValue<&'a serde_json::Value> {
        match shape {
            FieldShape::Optional(inner) => Self::convert(value, inner),
            FieldShape::Scalar => match value {
                serde_json::Value::Null => SourceValue::Null,
                serde_json::Value::Array(items) => SourceValue::List(
                    items
                        .iter()
                        .map(|item| Self::convert(item, &FieldShape::Scalar))
                        .collect(),
                ),
                other => SourceValue::Scalar(other.clone()),
            },
            FieldShape::List(element) => match value {
                serde_json::Value::Null => SourceValue::Null,
                serde_json::Value::Array(items) => SourceValue::List(
                    items.iter().map(|item| Self::convert(item, element)).collect(),
                ),
                _ => SourceValue::Invalid { expected: "list" },
            },
            FieldShape::Object(_) => match value {
                serde_json::Value::Null => SourceValue::Null,
                serde_json::Value::Object(_) => SourceValue::Object(value),
                _ => SourceValue::Invalid { expected: "object" },
            },
        }
    }
}

#[async_trait]
impl<'a> ExecutionSource<'a> for JsonSource {
    type Object = &'a serde_json::Value;

    fn type_name(&self, object: &Self::Object) -> Option<String> {
        object
            .get("__typename")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }

    fn lookup(&self, object: &Self::Object, ctx: &FieldContext<'_>) -> SourceValue<Self::Object> {
        match object.get(ctx.response_key()) {
            None => SourceValue::Missing,
            Some(value) => Self::convert(value, &ctx.field.shape),
        }
    }

    async fn child_object(
        &self,
        value: SourceValue<Self::Object>,
        _key_info: &CacheKeyInfo,
    ) -> TrellisResult<Option<Self::Object>>
    where
        'a: 'async_trait,
    {
        match value {
            SourceValue::Object(object) => Ok(Some(object)),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// CACHE SOURCE (READ PATH)
// ============================================================================

/// Async record lookup the read path executes against.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Load one record by key; `None` when no such record exists.
    async fn record(&self, key: &CacheKey) -> TrellisResult<Option<Arc<Record>>>;
}

/// Source over normalized records, for cache reads.
///
/// Fields are looked up by storage key. Object-shaped fields resolve through
/// the stored reference, unless a field policy redirects to a custom key.
#[derive(Debug)]
pub struct CacheSource<'r, R: ?Sized> {
    records: &'r R,
}

impl<'r, R: RecordSource + ?Sized> CacheSource<'r, R> {
    /// Create a source reading through `records`.
    pub fn new(records: &'r R) -> Self {
        Self { records }
    }

    fn convert(value: &RecordValue, shape: &FieldShape) -> SourceValue<Arc<Record>> {
        match shape {
            FieldShape::Optional(inner) => Self::convert(value, inner),
            FieldShape::Scalar => match value {
                RecordValue::Scalar(v) => SourceValue::Scalar(v.clone()),
                RecordValue::Null => SourceValue::Null,
                RecordValue::List(items) => SourceValue::List(
                    items
                        .iter()
                        .map(|item| Self::convert(item, &FieldShape::Scalar))
                        .collect(),
                ),
                RecordValue::Reference(_) => SourceValue::Invalid { expected: "scalar" },
            },
            FieldShape::List(element) => match value {
                RecordValue::List(items) => SourceValue::List(
                    items.iter().map(|item| Self::convert(item, element)).collect(),
                ),
                RecordValue::Null => SourceValue::Null,
                _ => SourceValue::Invalid { expected: "list" },
            },
            FieldShape::Object(_) => match value {
                RecordValue::Reference(reference) => SourceValue::Reference(reference.clone()),
                RecordValue::Null => SourceValue::Null,
                _ => SourceValue::Invalid { expected: "reference" },
            },
        }
    }
}

#[async_trait]
impl<'a, 'r, R: RecordSource + ?Sized> ExecutionSource<'a> for CacheSource<'r, R> {
    type Object = Arc<Record>;

    fn type_name(&self, object: &Self::Object) -> Option<String> {
        match object.get("__typename") {
            Some(RecordValue::Scalar(serde_json::Value::String(name))) => Some(name.clone()),
            _ => None,
        }
    }

    fn lookup(&self, object: &Self::Object, ctx: &FieldContext<'_>) -> SourceValue<Self::Object> {
        match object.get(ctx.storage_key) {
            None => SourceValue::Missing,
            Some(value) => Self::convert(value, &ctx.field.shape),
        }
    }

    async fn child_object(
        &self,
        value: SourceValue<Self::Object>,
        key_info: &CacheKeyInfo,
    ) -> TrellisResult<Option<Self::Object>> {
        if let CacheKeyInfo::Custom(key) = key_info {
            return self.records.record(key).await;
        }
        match value {
            SourceValue::Reference(reference) => self.records.record(&reference.key).await,
            SourceValue::Object(object) => Ok(Some(object)),
            _ => Ok(None),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::selection::SelectionSet;

    fn object_shape() -> FieldShape {
        FieldShape::Object(SelectionSet::new("Character"))
    }

    #[test]
    fn test_json_convert_scalar_shape() {
        assert!(matches!(
            JsonSource::convert(&json!("Luke"), &FieldShape::Scalar),
            SourceValue::Scalar(_)
        ));
        assert!(matches!(
            JsonSource::convert(&json!(null), &FieldShape::Scalar),
            SourceValue::Null
        ));
        // Array-valued custom scalars become lists of scalars.
        match JsonSource::convert(&json!([1, 2]), &FieldShape::Scalar) {
            SourceValue::List(items) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_json_convert_object_shape() {
        let tree = json!({"name": "Luke"});
        assert!(matches!(
            JsonSource::convert(&tree, &object_shape()),
            SourceValue::Object(_)
        ));
        assert!(matches!(
            JsonSource::convert(&json!("Luke"), &object_shape()),
            SourceValue::Invalid { expected: "object" }
        ));
    }

    #[test]
    fn test_json_convert_peels_optional() {
        let shape = FieldShape::optional(FieldShape::list(FieldShape::Scalar));
        match JsonSource::convert(&json!(["a"]), &shape) {
            SourceValue::List(items) => assert_eq!(items.len(), 1),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_cache_convert_reference_under_object_shape() {
        let value = RecordValue::reference("Character:1");
        match CacheSource::<dyn RecordSource>::convert(&value, &object_shape()) {
            SourceValue::Reference(reference) => assert_eq!(reference.key, "Character:1"),
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn test_cache_convert_flags_corrupt_shapes() {
        let stored_scalar = RecordValue::Scalar(json!("Luke"));
        assert!(matches!(
            CacheSource::<dyn RecordSource>::convert(&stored_scalar, &object_shape()),
            SourceValue::Invalid { expected: "reference" }
        ));

        let stored_reference = RecordValue::reference("Character:1");
        assert!(matches!(
            CacheSource::<dyn RecordSource>::convert(&stored_reference, &FieldShape::Scalar),
            SourceValue::Invalid { expected: "scalar" }
        ));
    }
}

//! Read-path result mapping
//!
//! The mapper is the `ResultAccumulator` behind cache reads: it reassembles
//! stored records into the hierarchical `DataObject` shape the selection set
//! promises, keyed by response keys so aliases come back under the name the
//! caller asked for.

use crate::accumulator::{FieldContext, ObjectContext, ResultAccumulator};
use trellis_core::data::{DataObject, DataValue};
use trellis_core::error::{ExecutionError, TrellisResult};

/// Accumulator that maps a read pass into a [`DataObject`] tree.
///
/// A missing required field fails the read with
/// [`ExecutionError::MissingValue`]; a missing optional field is simply left
/// out of its object, and a missing optional list element reads as null.
#[derive(Debug, Default)]
pub struct SelectionMapper;

impl SelectionMapper {
    /// Create a mapper.
    pub fn new() -> Self {
        Self
    }
}

impl ResultAccumulator for SelectionMapper {
    type Partial = Option<DataValue>;
    type Entry = (String, DataValue);
    type Object = DataObject;
    type Output = DataObject;

    fn scalar(
        &mut self,
        value: &serde_json::Value,
        _ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        Ok(Some(DataValue::Scalar(value.clone())))
    }

    fn null(&mut self, _ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial> {
        Ok(Some(DataValue::Null))
    }

    fn missing(&mut self, ctx: &FieldContext<'_>) -> TrellisResult<Self::Partial> {
        if ctx.optional {
            Ok(None)
        } else {
            Err(ExecutionError::MissingValue {
                key: ctx.record_key.clone(),
                field: ctx.storage_key.to_string(),
            }
            .into())
        }
    }

    fn list(
        &mut self,
        items: Vec<Self::Partial>,
        _ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        let items = items
            .into_iter()
            .map(|item| item.unwrap_or(DataValue::Null))
            .collect();
        Ok(Some(DataValue::List(items)))
    }

    fn child(
        &mut self,
        object: Self::Object,
        _ctx: &FieldContext<'_>,
    ) -> TrellisResult<Self::Partial> {
        Ok(Some(DataValue::Object(object)))
    }

    fn entry(
        &mut self,
        partial: Self::Partial,
        ctx: &FieldContext<'_>,
    ) -> TrellisResult<Option<Self::Entry>> {
        Ok(partial.map(|value| (ctx.response_key().to_string(), value)))
    }

    fn object(
        &mut self,
        entries: Vec<Self::Entry>,
        ctx: &ObjectContext,
    ) -> TrellisResult<Self::Object> {
        let mut object = DataObject::from_fields(entries);
        object.fulfilled = ctx.fulfilled.clone();
        Ok(object)
    }

    fn finish(&mut self, root: Self::Object) -> TrellisResult<Self::Output> {
        Ok(root)
    }
}

// =============================================================================
// TESTS
// =============================================================================

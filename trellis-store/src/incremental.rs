//! Merging deferred result chunks into an already-delivered result.
//!
//! A transport that streams responses delivers the direct fields first and
//! each deferred fragment later as its own chunk. [`merge_incremental`]
//! folds such a chunk back into the base [`QueryResult`], leaving the base
//! untouched when the chunk conflicts with it.
//!
//! [`merge_incremental`]: QueryResult::merge_incremental

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use trellis_core::data::{display_path, DataObject, DataValue, PathSegment};
use trellis_core::error::MergeError;
use trellis_core::CacheKey;

use crate::result::{GraphError, QueryResult};

/// One deferred chunk of a streamed response.
///
/// `path` addresses the object inside the base result the chunk belongs to;
/// an empty path targets the root object. `label` names the deferred
/// fragment this chunk fulfills, if it carried one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalResult {
    #[serde(default)]
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub data: DataObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub dependent_keys: HashSet<CacheKey>,
}

impl QueryResult {
    /// Fold a deferred chunk into this result.
    ///
    /// The chunk's fields merge into the object at `incremental.path`; its
    /// label, errors, extensions, and dependency paths merge into the
    /// envelope. On error nothing is changed: the target object is merged
    /// through a scratch copy, and the envelope is only touched after the
    /// data merge succeeded.
    pub fn merge_incremental(&mut self, incremental: &IncrementalResult) -> Result<(), MergeError> {
        if incremental.path.is_empty() {
            self.data.merge(&incremental.data)?;
        } else {
            let target = self
                .data
                .value_at_mut(&incremental.path)
                .ok_or_else(|| MergeError::PathNotFound {
                    path: display_path(&incremental.path),
                })?;
            match target {
                DataValue::Object(object) => object.merge(&incremental.data)?,
                other => {
                    return Err(MergeError::NotAnObject {
                        path: format!("{} ({})", display_path(&incremental.path), other.kind()),
                    })
                }
            }
        }

        if let Some(label) = &incremental.label {
            match self.data.value_at_mut(&incremental.path) {
                Some(DataValue::Object(object)) => object.mark_fulfilled(label.clone()),
                _ => self.data.mark_fulfilled(label.clone()),
            }
        }
        if let Some(incoming) = &incremental.errors {
            self.errors
                .get_or_insert_with(Vec::new)
                .extend(incoming.iter().cloned());
        }
        if let Some(incoming) = &incremental.extensions {
            let extensions = self.extensions.get_or_insert_with(serde_json::Map::new);
            for (name, value) in incoming {
                extensions.insert(name.clone(), value.clone());
            }
        }
        self.dependent_keys
            .extend(incremental.dependent_keys.iter().cloned());
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Query result envelope.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use trellis_core::data::{DataObject, PathSegment};
use trellis_core::CacheKey;

use crate::activity::StalenessWatch;

/// A field-level error carried alongside partial data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

impl GraphError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }
}

/// The shaped data a read produced, together with its dependency footprint.
///
/// `dependent_keys` holds the dependency path of every field the read
/// visited. Comparing it against the changed paths reported by later writes
/// tells the client whether this result went stale; see
/// [`staleness_watch`](Self::staleness_watch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub data: DataObject,
    pub dependent_keys: HashSet<CacheKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

impl QueryResult {
    pub fn new(data: DataObject, dependent_keys: HashSet<CacheKey>) -> Self {
        Self {
            data,
            dependent_keys,
            errors: None,
            extensions: None,
        }
    }

    /// The footprint to re-check after each write.
    pub fn staleness_watch(&self) -> StalenessWatch {
        StalenessWatch::new(self.dependent_keys.clone())
    }
}

// =============================================================================
// TESTS
// =============================================================================

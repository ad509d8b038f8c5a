//! Shaped result data
//!
//! A `DataObject` is the denormalized, response-shaped view handed to
//! consumers: fields keyed by response key, nested objects inline, plus the
//! set of fragment labels that were actually fulfilled. Incremental payloads
//! fold into previously delivered objects through the conflict-checking
//! merge in this module.

use crate::error::MergeError;
use crate::selection::canonical_json;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// RESPONSE PATHS
// ============================================================================

/// One step of a response path: a field name or a list index.
///
/// Untagged so transport payloads like `["hero", "friends", 0]` decode
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Field(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{i}"),
            PathSegment::Field(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(name: String) -> Self {
        PathSegment::Field(name)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Dotted display form of a response path, for error messages.
pub fn display_path(path: &[PathSegment]) -> String {
    let parts: Vec<String> = path.iter().map(PathSegment::to_string).collect();
    parts.join(".")
}

// ============================================================================
// DATA VALUES
// ============================================================================

/// A value inside a shaped result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    /// Scalar leaf.
    Scalar(serde_json::Value),
    /// Explicit null.
    Null,
    /// Ordered list.
    List(Vec<DataValue>),
    /// Nested object.
    Object(DataObject),
}

impl DataValue {
    /// Convert a plain JSON value; objects become nested `DataObject`s with
    /// empty fulfilled sets.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DataValue::Null,
            serde_json::Value::Array(items) => {
                DataValue::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let fields = map
                    .into_iter()
                    .map(|(name, v)| (name, Self::from_json(v)))
                    .collect();
                DataValue::Object(DataObject {
                    fields,
                    fulfilled: BTreeSet::new(),
                })
            }
            scalar => DataValue::Scalar(scalar),
        }
    }

    /// Plain JSON form; fulfilled sets are dropped.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DataValue::Scalar(v) => v.clone(),
            DataValue::Null => serde_json::Value::Null,
            DataValue::List(items) => {
                serde_json::Value::Array(items.iter().map(DataValue::to_json).collect())
            }
            DataValue::Object(object) => object.to_json(),
        }
    }

    /// Follow a response path from this value.
    pub fn descend(&self, path: &[PathSegment]) -> Option<&DataValue> {
        match path.split_first() {
            None => Some(self),
            Some((PathSegment::Field(name), rest)) => match self {
                DataValue::Object(object) => object.fields.get(name)?.descend(rest),
                _ => None,
            },
            Some((PathSegment::Index(index), rest)) => match self {
                DataValue::List(items) => items.get(*index)?.descend(rest),
                _ => None,
            },
        }
    }

    /// Mutable counterpart of [`descend`](Self::descend).
    pub fn descend_mut(&mut self, path: &[PathSegment]) -> Option<&mut DataValue> {
        match path.split_first() {
            None => Some(self),
            Some((PathSegment::Field(name), rest)) => match self {
                DataValue::Object(object) => object.fields.get_mut(name)?.descend_mut(rest),
                _ => None,
            },
            Some((PathSegment::Index(index), rest)) => match self {
                DataValue::List(items) => items.get_mut(*index)?.descend_mut(rest),
                _ => None,
            },
        }
    }

    /// Kind label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            DataValue::Scalar(_) => "scalar",
            DataValue::Null => "null",
            DataValue::List(_) => "list",
            DataValue::Object(_) => "object",
        }
    }

    fn render(&self) -> String {
        match self {
            DataValue::Scalar(v) => canonical_json(v),
            DataValue::Null => "null".to_string(),
            other => other.kind().to_string(),
        }
    }
}

// ============================================================================
// DATA OBJECTS
// ============================================================================

/// Response-shaped object: fields keyed by response key plus the labels of
/// fragments whose fields are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    /// Response key to value.
    pub fields: BTreeMap<String, DataValue>,
    /// Labels of fulfilled fragments. Grows monotonically under merges.
    pub fulfilled: BTreeSet<String>,
}

impl DataObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object from prepared fields.
    pub fn from_fields(fields: impl IntoIterator<Item = (String, DataValue)>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
            fulfilled: BTreeSet::new(),
        }
    }

    /// Look up a field by response key.
    pub fn get(&self, response_key: &str) -> Option<&DataValue> {
        self.fields.get(response_key)
    }

    /// Set a field value.
    pub fn insert(&mut self, response_key: impl Into<String>, value: DataValue) -> Option<DataValue> {
        self.fields.insert(response_key.into(), value)
    }

    /// Whether the fragment labelled `label` was fulfilled.
    pub fn is_fulfilled(&self, label: &str) -> bool {
        self.fulfilled.contains(label)
    }

    /// Record a fragment as fulfilled.
    pub fn mark_fulfilled(&mut self, label: impl Into<String>) {
        self.fulfilled.insert(label.into());
    }

    /// Follow a response path from this object. An empty path has no value;
    /// callers treat the empty path as the object itself.
    pub fn value_at(&self, path: &[PathSegment]) -> Option<&DataValue> {
        let (first, rest) = path.split_first()?;
        match first {
            PathSegment::Field(name) => self.fields.get(name)?.descend(rest),
            PathSegment::Index(_) => None,
        }
    }

    /// Mutable counterpart of [`value_at`](Self::value_at).
    pub fn value_at_mut(&mut self, path: &[PathSegment]) -> Option<&mut DataValue> {
        let (first, rest) = path.split_first()?;
        match first {
            PathSegment::Field(name) => self.fields.get_mut(name)?.descend_mut(rest),
            PathSegment::Index(_) => None,
        }
    }

    /// Plain JSON form of the fields; fulfilled sets are dropped.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }

    /// Fold another object into this one.
    ///
    /// Fields union recursively; fulfilled sets union. Two values for the
    /// same position must agree: differing scalars or differing kinds abort
    /// the merge, and on abort this object is left exactly as it was.
    ///
    /// Lists merge pairwise over the common prefix; extra incoming elements
    /// append, extra existing elements stay.
    pub fn merge(&mut self, other: &DataObject) -> Result<(), MergeError> {
        let mut scratch = self.clone();
        let mut path = Vec::new();
        scratch.merge_in_place(other, &mut path)?;
        *self = scratch;
        Ok(())
    }

    fn merge_in_place(
        &mut self,
        other: &DataObject,
        path: &mut Vec<String>,
    ) -> Result<(), MergeError> {
        for (response_key, incoming) in &other.fields {
            match self.fields.get_mut(response_key) {
                None => {
                    self.fields.insert(response_key.clone(), incoming.clone());
                }
                Some(existing) => {
                    path.push(response_key.clone());
                    merge_values(existing, incoming, path)?;
                    path.pop();
                }
            }
        }
        self.fulfilled.extend(other.fulfilled.iter().cloned());
        Ok(())
    }
}

fn merge_values(
    existing: &mut DataValue,
    incoming: &DataValue,
    path: &mut Vec<String>,
) -> Result<(), MergeError> {
    match (existing, incoming) {
        (DataValue::Null, DataValue::Null) => Ok(()),
        (DataValue::Scalar(a), DataValue::Scalar(b)) => {
            if a == b {
                Ok(())
            } else {
                Err(MergeError::Conflict {
                    path: path.join("."),
                    existing: canonical_json(a),
                    incoming: canonical_json(b),
                })
            }
        }
        (DataValue::Object(a), DataValue::Object(b)) => a.merge_in_place(b, path),
        (DataValue::List(a), DataValue::List(b)) => {
            for (index, (existing_item, incoming_item)) in a.iter_mut().zip(b).enumerate() {
                path.push(index.to_string());
                merge_values(existing_item, incoming_item, path)?;
                path.pop();
            }
            if b.len() > a.len() {
                a.extend(b[a.len()..].iter().cloned());
            }
            Ok(())
        }
        (existing, incoming) => Err(MergeError::ShapeMismatch {
            path: path.join("."),
            existing: existing.kind(),
            incoming: incoming.kind(),
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Normalized record storage
//!
//! A `Record` is a flat map from storage keys to field values. Nested objects
//! never appear inline: an object-valued field always holds a
//! `CacheReference` pointing at the child's own record. A `RecordSet` is the
//! unit of transfer between the normalizer, the cache, and subscribers.

use crate::CacheKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Field name under which a reference is encoded in the persisted form.
///
/// `{"$reference": "Character:1"}` round-trips to `RecordValue::Reference`.
/// The name is reserved: a custom scalar object using it as its only field
/// would be re-read as a reference.
pub const REFERENCE_SENTINEL: &str = "$reference";

// ============================================================================
// CACHE REFERENCE
// ============================================================================

/// Pointer from one record's field to another record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheReference {
    /// Cache key of the referenced record.
    pub key: CacheKey,
}

impl CacheReference {
    /// Create a reference to the record stored under `key`.
    pub fn new(key: impl Into<CacheKey>) -> Self {
        Self { key: key.into() }
    }
}

impl fmt::Display for CacheReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

// ============================================================================
// RECORD VALUE
// ============================================================================

/// A single stored field value.
///
/// Values are kept in canonical form: a `Scalar` never holds JSON `null` or a
/// JSON array (those become `Null` and `List`), but it may hold a JSON object
/// for object-valued custom scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// Scalar leaf: string, number, boolean, or custom scalar object.
    Scalar(serde_json::Value),
    /// Explicit null delivered by the server; distinct from an absent field.
    Null,
    /// Ordered list, element order preserved from the result tree.
    List(Vec<RecordValue>),
    /// Pointer to another record.
    Reference(CacheReference),
}

impl RecordValue {
    /// Reference value constructor.
    pub fn reference(key: impl Into<CacheKey>) -> Self {
        RecordValue::Reference(CacheReference::new(key))
    }

    /// Decode a value from its persisted JSON form.
    ///
    /// Total: every JSON value has a canonical `RecordValue` form. An object
    /// whose only field is [`REFERENCE_SENTINEL`] with a string value decodes
    /// as a reference; any other object is an opaque scalar.
    pub fn from_json_repr(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RecordValue::Null,
            serde_json::Value::Array(items) => {
                RecordValue::List(items.into_iter().map(Self::from_json_repr).collect())
            }
            serde_json::Value::Object(mut map) => {
                let is_reference = map.len() == 1
                    && matches!(map.get(REFERENCE_SENTINEL), Some(serde_json::Value::String(_)));
                if is_reference {
                    match map.remove(REFERENCE_SENTINEL) {
                        Some(serde_json::Value::String(key)) => {
                            RecordValue::Reference(CacheReference::new(key))
                        }
                        // Unreachable given the check above; keep the object.
                        other => {
                            if let Some(v) = other {
                                map.insert(REFERENCE_SENTINEL.to_string(), v);
                            }
                            RecordValue::Scalar(serde_json::Value::Object(map))
                        }
                    }
                } else {
                    RecordValue::Scalar(serde_json::Value::Object(map))
                }
            }
            scalar => RecordValue::Scalar(scalar),
        }
    }

    /// Encode this value into its persisted JSON form.
    pub fn to_json_repr(&self) -> serde_json::Value {
        match self {
            RecordValue::Scalar(v) => v.clone(),
            RecordValue::Null => serde_json::Value::Null,
            RecordValue::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json_repr).collect())
            }
            RecordValue::Reference(r) => {
                let mut map = serde_json::Map::new();
                map.insert(
                    REFERENCE_SENTINEL.to_string(),
                    serde_json::Value::String(r.key.clone()),
                );
                serde_json::Value::Object(map)
            }
        }
    }
}

impl Serialize for RecordValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json_repr().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecordValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(RecordValue::from_json_repr(value))
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// One normalized object: a cache key plus a flat map of field values.
///
/// Fields are kept in a `BTreeMap` so iteration order, and therefore the
/// persisted form, is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identity of this record within the flat namespace.
    pub key: CacheKey,
    /// Storage key to field value.
    pub fields: BTreeMap<String, RecordValue>,
}

impl Record {
    /// Create an empty record under `key`.
    pub fn new(key: impl Into<CacheKey>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Create a record from a prepared field map.
    pub fn with_fields(
        key: impl Into<CacheKey>,
        fields: impl IntoIterator<Item = (String, RecordValue)>,
    ) -> Self {
        Self {
            key: key.into(),
            fields: fields.into_iter().collect(),
        }
    }

    /// Look up a field by storage key.
    pub fn get(&self, storage_key: &str) -> Option<&RecordValue> {
        self.fields.get(storage_key)
    }

    /// Insert a field value, returning the previous value if any.
    pub fn insert(&mut self, storage_key: impl Into<String>, value: RecordValue) -> Option<RecordValue> {
        self.fields.insert(storage_key.into(), value)
    }

    /// Remove a field by storage key.
    pub fn remove(&mut self, storage_key: &str) -> Option<RecordValue> {
        self.fields.remove(storage_key)
    }

    /// Number of stored fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record holds no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Dependency path of one field: `<record key>.<storage key>`.
    pub fn field_path(&self, storage_key: &str) -> CacheKey {
        format!("{}.{}", self.key, storage_key)
    }

    /// Fold another record's fields into this one, last write wins.
    ///
    /// Returns the dependency paths of every field that was added or whose
    /// value changed. Both records must share the same cache key.
    pub fn merge(&mut self, other: &Record) -> HashSet<CacheKey> {
        debug_assert_eq!(self.key, other.key, "merging records with different keys");
        let mut changed = HashSet::new();
        for (storage_key, value) in &other.fields {
            let differs = self.fields.get(storage_key) != Some(value);
            if differs {
                self.fields.insert(storage_key.clone(), value.clone());
                changed.insert(self.field_path(storage_key));
            }
        }
        changed
    }
}

// ============================================================================
// RECORD SET
// ============================================================================

/// A batch of records keyed by cache key.
///
/// Produced by the normalizer on writes, consumed by the cache on merges, and
/// carried on activity events so subscribers can observe what is changing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    records: BTreeMap<CacheKey, Record>,
}

impl RecordSet {
    /// Create an empty record set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record set by merging the given records.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.merge_record(record);
        }
        set
    }

    /// Look up a record by key.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// Whether a record exists under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Replace the record stored under its key, dropping any previous fields.
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        self.records.insert(record.key.clone(), record)
    }

    /// Merge one record in, folding fields into any existing record with the
    /// same key. Returns the changed dependency paths.
    pub fn merge_record(&mut self, record: Record) -> HashSet<CacheKey> {
        match self.records.get_mut(&record.key) {
            Some(existing) => existing.merge(&record),
            None => {
                let changed = record
                    .fields
                    .keys()
                    .map(|storage_key| record.field_path(storage_key))
                    .collect();
                self.records.insert(record.key.clone(), record);
                changed
            }
        }
    }

    /// Merge a whole set in, returning the union of changed dependency paths.
    pub fn merge(&mut self, other: RecordSet) -> HashSet<CacheKey> {
        let mut changed = HashSet::new();
        for (_, record) in other.records {
            changed.extend(self.merge_record(record));
        }
        changed
    }

    /// Remove the record stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Record> {
        self.records.remove(key)
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate record keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.records.keys()
    }

    /// Iterate records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Consume the set, yielding records in key order.
    pub fn into_records(self) -> impl Iterator<Item = Record> {
        self.records.into_values()
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::from_records(iter)
    }
}

// =============================================================================
// TESTS
// =============================================================================

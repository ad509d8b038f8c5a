//! Trellis Core - Cache Data Types
//!
//! Pure data structures for the normalized object-graph cache. All other
//! crates depend on this. This crate contains the record model, selection
//! descriptors, field policies, and shaped result data - no I/O and no
//! concurrency.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod data;
pub mod error;
pub mod policy;
pub mod record;
pub mod selection;

pub use data::{DataObject, DataValue, PathSegment};
pub use error::{ExecutionError, MergeError, StoreError, TrellisError, TrellisResult};
pub use policy::{FieldPolicy, KeyComponent, KEY_DELIMITER};
pub use record::{CacheReference, Record, RecordSet, RecordValue};
pub use selection::{
    Argument, ArgumentValue, Field, FieldShape, FragmentSpread, Selection, SelectionSet, Variables,
};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Flat-namespace identifier for a normalized record.
///
/// Keys are either policy-derived (`"Character:1"`) or structural
/// (`"QUERY_ROOT.hero"`). Two occurrences of the same key always denote the
/// same record.
pub type CacheKey = String;

/// Subscriber identifier using UUIDv7 for timestamp-sortable IDs.
pub type SubscriberId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 SubscriberId (timestamp-sortable).
pub fn new_subscriber_id() -> SubscriberId {
    Uuid::now_v7()
}

// ============================================================================
// ROOT KEYS
// ============================================================================

/// Cache key of the record holding top-level query fields.
pub const QUERY_ROOT_KEY: &str = "QUERY_ROOT";

/// Cache key of the record holding top-level mutation fields.
pub const MUTATION_ROOT_KEY: &str = "MUTATION_ROOT";

/// Cache key of the record holding top-level subscription fields.
pub const SUBSCRIPTION_ROOT_KEY: &str = "SUBSCRIPTION_ROOT";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_sortable_by_creation() {
        let a = new_subscriber_id();
        let b = new_subscriber_id();
        // UUIDv7 embeds a timestamp, so later IDs never sort before earlier ones.
        assert!(a <= b);
    }

    #[test]
    fn root_keys_are_distinct() {
        assert_ne!(QUERY_ROOT_KEY, MUTATION_ROOT_KEY);
        assert_ne!(QUERY_ROOT_KEY, SUBSCRIPTION_ROOT_KEY);
    }
}

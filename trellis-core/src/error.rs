//! Error types for Trellis operations

use crate::CacheKey;
use thiserror::Error;

/// Selection execution errors, raised while walking a selection set against
/// a value source (the cache on reads, a raw result tree on writes).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Record not found: {key}")]
    MissingRecord { key: CacheKey },

    #[error("Missing value for field {field} on record {key}")]
    MissingValue { key: CacheKey, field: String },

    #[error("Unexpected value for field {field} on record {key}: expected {expected}")]
    UnexpectedValue {
        key: CacheKey,
        field: String,
        expected: &'static str,
    },
}

/// Result-merge errors, raised while folding an incremental payload into a
/// previously delivered result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("Merge conflict at {path}: existing {existing} vs incoming {incoming}")]
    Conflict {
        path: String,
        existing: String,
        incoming: String,
    },

    #[error("Shape mismatch at {path}: existing {existing} vs incoming {incoming}")]
    ShapeMismatch {
        path: String,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("Merge target not found at {path}")]
    PathNotFound { path: String },

    #[error("Merge target at {path} is not an object")]
    NotAnObject { path: String },
}

/// Store and transaction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("Action rejected by subscriber: {reason}")]
    ActionRejected { reason: String },

    #[error("Invalid key pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Master error type for all Trellis errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrellisError {
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for Trellis operations.
pub type TrellisResult<T> = Result<T, TrellisError>;

// =============================================================================
// TESTS
// =============================================================================

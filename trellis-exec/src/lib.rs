//! Trellis Exec - Selection Execution
//!
//! One engine serves both cache paths. Executing a selection set over a raw
//! result tree with the normalizing accumulator produces the records a write
//! stores; executing the same selections over stored records with the mapping
//! and tracking accumulators produces shaped data plus the dependency paths a
//! read touched. The value source and the accumulator are the two seams; the
//! walk in between is shared.

pub mod accumulator;
pub mod dependencies;
pub mod engine;
pub mod mapper;
pub mod normalize;
pub mod policy;
pub mod source;

pub use accumulator::{CacheKeyInfo, FieldContext, ObjectContext, ResultAccumulator, Zip};
pub use dependencies::DependencyTracker;
pub use engine::Executor;
pub use mapper::SelectionMapper;
pub use normalize::{normalize, RecordNormalizer};
pub use policy::{evaluate_field_policy, PolicyOutcome};
pub use source::{CacheSource, ExecutionSource, JsonSource, RecordSource, SourceValue};

//! Trellis Test Utilities
//!
//! Centralized test infrastructure for the Trellis workspace:
//! - Proptest generators for records and record values
//! - Mock subscribers for observing and vetoing store activity
//! - Test fixtures for common selection and record shapes
//! - Custom assertions for Trellis-specific validation

use std::sync::Mutex;
use trellis_core::error::{StoreError, TrellisResult};
use trellis_store::{ActivityEvent, ActivityOutcome, CacheActivity, StoreSubscriber};

// ============================================================================
// MOCK SUBSCRIBERS
// ============================================================================

/// Subscriber that records every notification it receives.
#[derive(Default)]
pub struct RecordingSubscriber {
    wills: Mutex<Vec<ActivityEvent>>,
    dids: Mutex<Vec<(ActivityEvent, ActivityOutcome)>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn will_events(&self) -> Vec<ActivityEvent> {
        self.wills.lock().expect("recorder poisoned").clone()
    }

    pub fn did_events(&self) -> Vec<(ActivityEvent, ActivityOutcome)> {
        self.dids.lock().expect("recorder poisoned").clone()
    }

    pub fn will_count(&self) -> usize {
        self.wills.lock().expect("recorder poisoned").len()
    }

    pub fn did_count(&self) -> usize {
        self.dids.lock().expect("recorder poisoned").len()
    }
}

impl StoreSubscriber for RecordingSubscriber {
    fn will_perform(&self, event: &ActivityEvent) -> TrellisResult<()> {
        self.wills
            .lock()
            .expect("recorder poisoned")
            .push(event.clone());
        Ok(())
    }

    fn did_perform(&self, event: &ActivityEvent, outcome: &ActivityOutcome) {
        self.dids
            .lock()
            .expect("recorder poisoned")
            .push((event.clone(), outcome.clone()));
    }
}

/// Subscriber that vetoes every mutating activity. Loads pass through, so a
/// store guarded by one behaves as read-only.
pub struct VetoingSubscriber {
    reason: String,
}

impl VetoingSubscriber {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl StoreSubscriber for VetoingSubscriber {
    fn will_perform(&self, event: &ActivityEvent) -> TrellisResult<()> {
        match event.activity {
            CacheActivity::Load { .. } => Ok(()),
            _ => Err(StoreError::ActionRejected {
                reason: self.reason.clone(),
            }
            .into()),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Trellis record types.

    use proptest::prelude::*;
    use trellis_core::record::{Record, RecordSet, RecordValue};
    use trellis_core::selection::Variables;
    use trellis_core::CacheKey;

    /// Generate a `Type:id` shaped cache key.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        "[A-Z][a-z]{2,7}:[1-9][0-9]{0,3}"
    }

    /// Generate a plausible field name.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9]{0,11}"
    }

    /// Generate a JSON scalar (string, number, or boolean).
    pub fn arb_scalar() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            "[a-zA-Z0-9 ]{0,12}".prop_map(serde_json::Value::from),
            any::<i32>().prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
        ]
    }

    /// Generate a record field value, including nested lists.
    pub fn arb_record_value() -> impl Strategy<Value = RecordValue> {
        let leaf = prop_oneof![
            Just(RecordValue::Null),
            arb_scalar().prop_map(RecordValue::Scalar),
            arb_cache_key().prop_map(RecordValue::reference),
        ];
        leaf.prop_recursive(2, 8, 4, |inner| {
            prop::collection::vec(inner, 0..4)
                .prop_map(RecordValue::List)
                .boxed()
        })
    }

    /// Generate a record with a handful of fields.
    pub fn arb_record() -> impl Strategy<Value = Record> {
        (
            arb_cache_key(),
            prop::collection::btree_map(arb_field_name(), arb_record_value(), 0..6),
        )
            .prop_map(|(key, fields)| Record::with_fields(key, fields))
    }

    /// Generate a record set.
    pub fn arb_record_set() -> impl Strategy<Value = RecordSet> {
        prop::collection::vec(arb_record(), 0..6).prop_map(RecordSet::from_records)
    }

    /// Generate a variable map of scalar bindings.
    pub fn arb_variables() -> impl Strategy<Value = Variables> {
        prop::collection::hash_map(arb_field_name(), arb_scalar(), 0..4)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.
    //!
    //! All fixtures share one tiny film-universe schema: a query root with a
    //! `hero(id:)` field keyed by its `id` argument, `friends(ids:)` keyed
    //! per element, and an optionally deferred `heroDetail` fragment.

    use serde_json::json;
    use std::sync::Arc;
    use trellis_core::policy::{FieldPolicy, KeyComponent};
    use trellis_core::record::{Record, RecordSet, RecordValue};
    use trellis_core::selection::{
        Argument, ArgumentValue, Field, FieldShape, FragmentSpread, SelectionSet,
    };
    use trellis_core::QUERY_ROOT_KEY;
    use trellis_store::{InMemoryCache, Store};

    fn id_policy() -> FieldPolicy {
        FieldPolicy::new([KeyComponent::new("id")])
    }

    fn character_selection() -> SelectionSet {
        SelectionSet::new("Character").with_field(Field::new("name", FieldShape::Scalar))
    }

    /// `{ hero(id: "1") { name } }` with the hero keyed by its id argument.
    pub fn hero_selection() -> SelectionSet {
        SelectionSet::new("Query").with_field(
            Field::new("hero", FieldShape::Object(character_selection()))
                .with_argument(Argument::new("id", ArgumentValue::Scalar(json!("1"))))
                .with_policy(id_policy()),
        )
    }

    /// `{ hero(id: $heroId) { name } }`, for variable-binding tests.
    pub fn hero_selection_with_variable() -> SelectionSet {
        SelectionSet::new("Query").with_field(
            Field::new("hero", FieldShape::Object(character_selection()))
                .with_argument(Argument::new("id", ArgumentValue::variable("heroId")))
                .with_policy(id_policy()),
        )
    }

    /// `{ friends(ids: [2, 3]) { name } }` keyed per element.
    pub fn friends_selection() -> SelectionSet {
        SelectionSet::new("Query").with_field(
            Field::new(
                "friends",
                FieldShape::list(FieldShape::Object(character_selection())),
            )
            .with_argument(Argument::new(
                "ids",
                ArgumentValue::Scalar(json!([2, 3])),
            ))
            .with_policy(FieldPolicy::new([KeyComponent::new("ids")])),
        )
    }

    /// The hero selection extended with a deferred `heroDetail` fragment
    /// selecting `bio`.
    pub fn deferred_hero_selection() -> SelectionSet {
        let detail = SelectionSet::new("Character")
            .with_field(Field::new("bio", FieldShape::Scalar));
        SelectionSet::new("Query").with_field(
            Field::new(
                "hero",
                FieldShape::Object(
                    character_selection()
                        .with_fragment(FragmentSpread::new("heroDetail", detail).deferred()),
                ),
            )
            .with_argument(Argument::new("id", ArgumentValue::Scalar(json!("1"))))
            .with_policy(id_policy()),
        )
    }

    /// A result tree matching [`hero_selection`].
    pub fn hero_tree() -> serde_json::Value {
        json!({ "hero": { "name": "Luke" } })
    }

    /// Normalized records matching [`hero_selection`] and [`hero_tree`].
    pub fn hero_records() -> RecordSet {
        RecordSet::from_records([
            Record::with_fields(
                QUERY_ROOT_KEY,
                [(
                    "hero(id:\"1\")".to_string(),
                    RecordValue::reference("Character:1"),
                )],
            ),
            Record::with_fields(
                "Character:1",
                [("name".to_string(), RecordValue::Scalar(json!("Luke")))],
            ),
        ])
    }

    /// Records for [`deferred_hero_selection`] including the deferred `bio`.
    pub fn hero_records_with_bio() -> RecordSet {
        let mut records = hero_records();
        records.merge_record(Record::with_fields(
            "Character:1",
            [("bio".to_string(), RecordValue::Scalar(json!("Jedi")))],
        ));
        records
    }

    /// An in-memory store pre-populated with [`hero_records`].
    pub fn seeded_store() -> Store {
        Store::new(Arc::new(InMemoryCache::with_records(hero_records())))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for Trellis-specific validation.

    use trellis_core::data::{DataObject, DataValue};
    use trellis_core::error::{ExecutionError, TrellisError, TrellisResult};
    use trellis_core::record::{Record, RecordValue};

    /// Assert that a TrellisResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &TrellisResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a TrellisResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &TrellisResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a TrellisResult failed with a missing value at the given
    /// record and field.
    #[track_caller]
    pub fn assert_missing_value<T: std::fmt::Debug>(
        result: &TrellisResult<T>,
        key: &str,
        field: &str,
    ) {
        match result {
            Err(TrellisError::Execution(ExecutionError::MissingValue { key: k, field: f })) => {
                assert_eq!(k, key, "Wrong record key in MissingValue error");
                assert_eq!(f, field, "Wrong field in MissingValue error");
            }
            other => panic!("Expected MissingValue for {key}.{field}, got: {other:?}"),
        }
    }

    /// Assert that an object holds the given scalar under `response_key`.
    #[track_caller]
    pub fn assert_scalar_field(object: &DataObject, response_key: &str, expected: serde_json::Value) {
        match object.get(response_key) {
            Some(DataValue::Scalar(value)) => {
                assert_eq!(value, &expected, "Wrong value for field {response_key}");
            }
            other => panic!("Expected scalar field {response_key}, got: {other:?}"),
        }
    }

    /// Assert that a record field is a reference to `key`.
    #[track_caller]
    pub fn assert_reference(record: &Record, field: &str, key: &str) {
        match record.get(field) {
            Some(RecordValue::Reference(reference)) => {
                assert_eq!(reference.key, key, "Wrong reference target for {field}");
            }
            other => panic!("Expected {field} to reference {key}, got: {other:?}"),
        }
    }

    /// Assert that a fragment label was fulfilled on the object.
    #[track_caller]
    pub fn assert_fulfilled(object: &DataObject, label: &str) {
        assert!(
            object.is_fulfilled(label),
            "Expected fragment {label} to be fulfilled; fulfilled set: {:?}",
            object.fulfilled
        );
    }
}

// =============================================================================
// TESTS
// =============================================================================

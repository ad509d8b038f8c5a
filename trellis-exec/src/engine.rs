//! Selection execution engine
//!
//! One recursive walk serves every cache operation. The executor descends a
//! selection set over a value source, resolves each object's identity
//! (policy key or structural key), and feeds everything it finds into a
//! `ResultAccumulator`. Child resolution is async so the read path can load
//! records on demand; recursion is boxed to keep the future types finite.

use crate::accumulator::{CacheKeyInfo, FieldContext, ObjectContext, ResultAccumulator};
use crate::policy::{evaluate_field_policy, PolicyOutcome};
use crate::source::{ExecutionSource, SourceValue};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::{BTreeSet, VecDeque};
use trellis_core::error::{ExecutionError, TrellisError, TrellisResult};
use trellis_core::selection::{
    Field, FieldShape, FragmentSpread, Selection, SelectionSet, Variables,
};
use trellis_core::CacheKey;

/// Drives one pass of a selection set over a source, feeding an accumulator.
pub struct Executor<'v> {
    variables: &'v Variables,
}

impl<'v> Executor<'v> {
    /// Create an executor resolving variable references from `variables`.
    pub fn new(variables: &'v Variables) -> Self {
        Self { variables }
    }

    /// Execute `selection_set` against `root`, folding the pass through
    /// `accumulator`. `root_key` is the structural identity of the root
    /// object.
    pub async fn execute<'s, 'a: 's, S, A>(
        &'s self,
        source: &'s S,
        selection_set: &'s SelectionSet,
        root: S::Object,
        root_key: impl Into<CacheKey>,
        accumulator: &'s mut A,
    ) -> TrellisResult<A::Output>
    where
        S: ExecutionSource<'a>,
        S::Object: Send,
        A: ResultAccumulator + Send,
        A::Partial: Send,
        A::Entry: Send,
        A::Object: Send,
    {
        let key_info = CacheKeyInfo::Structural(root_key.into());
        let root_object = self
            .execute_object(source, selection_set, root, key_info, accumulator)
            .await?;
        accumulator.finish(root_object)
    }

    fn execute_object<'s, 'a: 's, S, A>(
        &'s self,
        source: &'s S,
        selection_set: &'s SelectionSet,
        object: S::Object,
        key_info: CacheKeyInfo,
        accumulator: &'s mut A,
    ) -> BoxFuture<'s, TrellisResult<A::Object>>
    where
        S: ExecutionSource<'a>,
        S::Object: Send,
        A: ResultAccumulator + Send,
        A::Partial: Send,
        A::Entry: Send,
        A::Object: Send,
    {
        async move {
            let type_name = source.type_name(&object);
            let record_key = key_info.key().clone();

            let mut fields = Vec::new();
            let mut deferred = VecDeque::new();
            let mut fulfilled = BTreeSet::new();
            collect_selections(
                selection_set,
                type_name.as_deref(),
                &mut fields,
                &mut deferred,
                &mut fulfilled,
            );

            let mut entries = Vec::new();
            for field in fields {
                if let Some(entry) = self
                    .execute_field(source, field, &object, &record_key, accumulator)
                    .await?
                {
                    entries.push(entry);
                }
            }

            // Deferred fragments are matched but tolerated when incomplete:
            // a missing required value drops the fragment's entries and
            // leaves its label out of the fulfilled set.
            while let Some(spread) = deferred.pop_front() {
                let mut fragment_fields = Vec::new();
                let mut nested_deferred = VecDeque::new();
                let mut fragment_fulfilled = BTreeSet::new();
                fragment_fulfilled.insert(spread.label.clone());
                collect_selections(
                    &spread.selection_set,
                    type_name.as_deref(),
                    &mut fragment_fields,
                    &mut nested_deferred,
                    &mut fragment_fulfilled,
                );

                let mut fragment_entries = Vec::new();
                let mut incomplete = false;
                for field in fragment_fields {
                    match self
                        .execute_field(source, field, &object, &record_key, accumulator)
                        .await
                    {
                        Ok(Some(entry)) => fragment_entries.push(entry),
                        Ok(None) => {}
                        Err(TrellisError::Execution(ExecutionError::MissingValue { .. })) => {
                            incomplete = true;
                            break;
                        }
                        Err(other) => return Err(other),
                    }
                }
                if !incomplete {
                    entries.extend(fragment_entries);
                    fulfilled.extend(fragment_fulfilled);
                    deferred.extend(nested_deferred);
                }
            }

            let ctx = ObjectContext {
                key_info,
                fulfilled,
            };
            accumulator.object(entries, &ctx)
        }
        .boxed()
    }

    async fn execute_field<'s, 'a: 's, S, A>(
        &'s self,
        source: &'s S,
        field: &'s Field,
        object: &'s S::Object,
        record_key: &'s CacheKey,
        accumulator: &'s mut A,
    ) -> TrellisResult<Option<A::Entry>>
    where
        S: ExecutionSource<'a>,
        S::Object: Send,
        A: ResultAccumulator + Send,
        A::Partial: Send,
        A::Entry: Send,
        A::Object: Send,
    {
        let storage_key = field.storage_key(self.variables);
        let ctx = FieldContext {
            field,
            storage_key: &storage_key,
            record_key,
            optional: field.shape.is_optional(),
        };

        let outcome = match (&field.policy, field.shape.selection_set()) {
            (Some(policy), Some(set)) => {
                evaluate_field_policy(policy, &set.type_name, &field.arguments, self.variables)
            }
            _ => PolicyOutcome::Structural,
        };
        let structural = ctx.dependency_path();
        let value = source.lookup(object, &ctx);
        let partial = self
            .execute_value(
                source,
                value,
                &field.shape,
                &ctx,
                &outcome,
                structural,
                accumulator,
            )
            .await?;
        accumulator.entry(partial, &ctx)
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_value<'s, 'a: 's, S, A>(
        &'s self,
        source: &'s S,
        value: SourceValue<S::Object>,
        shape: &'s FieldShape,
        ctx: &'s FieldContext<'s>,
        outcome: &'s PolicyOutcome,
        structural: CacheKey,
        accumulator: &'s mut A,
    ) -> BoxFuture<'s, TrellisResult<A::Partial>>
    where
        S: ExecutionSource<'a>,
        S::Object: Send,
        A: ResultAccumulator + Send,
        A::Partial: Send,
        A::Entry: Send,
        A::Object: Send,
    {
        async move {
            match value {
                SourceValue::Invalid { expected } => Err(ExecutionError::UnexpectedValue {
                    key: ctx.record_key.clone(),
                    field: ctx.storage_key.to_string(),
                    expected,
                }
                .into()),
                SourceValue::Null => accumulator.null(ctx),
                SourceValue::Scalar(scalar) => accumulator.scalar(&scalar, ctx),
                SourceValue::List(items) => {
                    let element = element_shape(shape);
                    let element_ctx = FieldContext {
                        optional: element.is_optional(),
                        ..*ctx
                    };
                    // Keys pair positionally only when the counts agree;
                    // otherwise the whole list keeps structural identity.
                    let paired: &[CacheKey] = match outcome {
                        PolicyOutcome::PerElement(keys) if keys.len() == items.len() => keys,
                        _ => &[],
                    };
                    let mut partials = Vec::with_capacity(items.len());
                    for (index, item) in items.into_iter().enumerate() {
                        let element_outcome = paired
                            .get(index)
                            .cloned()
                            .map(PolicyOutcome::Single)
                            .unwrap_or(PolicyOutcome::Structural);
                        let element_structural = format!("{structural}.{index}");
                        let partial = self
                            .execute_value(
                                source,
                                item,
                                element,
                                &element_ctx,
                                &element_outcome,
                                element_structural,
                                accumulator,
                            )
                            .await?;
                        partials.push(partial);
                    }
                    accumulator.list(partials, ctx)
                }
                SourceValue::Missing => match (outcome, shape.selection_set()) {
                    // A custom key can resolve a child the parent never
                    // stored a reference for.
                    (PolicyOutcome::Single(key), Some(set)) => {
                        let key_info = CacheKeyInfo::Custom(key.clone());
                        match source.child_object(SourceValue::Missing, &key_info).await? {
                            Some(child) => {
                                let folded = self
                                    .execute_object(source, set, child, key_info, accumulator)
                                    .await?;
                                accumulator.child(folded, ctx)
                            }
                            None => accumulator.missing(ctx),
                        }
                    }
                    _ => accumulator.missing(ctx),
                },
                value @ (SourceValue::Object(_) | SourceValue::Reference(_)) => {
                    let set = match shape.selection_set() {
                        Some(set) => set,
                        None => {
                            return Err(ExecutionError::UnexpectedValue {
                                key: ctx.record_key.clone(),
                                field: ctx.storage_key.to_string(),
                                expected: "scalar",
                            }
                            .into())
                        }
                    };
                    let key_info = match outcome {
                        PolicyOutcome::Single(key) => CacheKeyInfo::Custom(key.clone()),
                        _ => CacheKeyInfo::Structural(structural),
                    };
                    match source.child_object(value, &key_info).await? {
                        Some(child) => {
                            let folded = self
                                .execute_object(source, set, child, key_info, accumulator)
                                .await?;
                            accumulator.child(folded, ctx)
                        }
                        None => accumulator.missing(ctx),
                    }
                }
            }
        }
        .boxed()
    }
}

/// Element shape of a list position. A plain scalar shape stays scalar, which
/// is how array-valued custom scalars execute element by element.
fn element_shape(shape: &FieldShape) -> &FieldShape {
    match shape.unwrap_optional() {
        FieldShape::List(inner) => inner.as_ref(),
        other => other,
    }
}

/// Flatten one selection set for an object: direct fields, matched
/// non-deferred fragments (recursively, recording their labels), and matched
/// deferred fragments set aside for tolerant execution.
fn collect_selections<'c>(
    selection_set: &'c SelectionSet,
    runtime_type: Option<&str>,
    fields: &mut Vec<&'c Field>,
    deferred: &mut VecDeque<&'c FragmentSpread>,
    fulfilled: &mut BTreeSet<String>,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => fields.push(field),
            Selection::Fragment(spread) => {
                if !spread.matches(runtime_type, &selection_set.type_name) {
                    continue;
                }
                if spread.deferred {
                    deferred.push_back(spread);
                } else {
                    fulfilled.insert(spread.label.clone());
                    collect_selections(
                        &spread.selection_set,
                        runtime_type,
                        fields,
                        deferred,
                        fulfilled,
                    );
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::DependencyTracker;
    use crate::mapper::SelectionMapper;
    use crate::normalize::RecordNormalizer;
    use crate::source::{CacheSource, JsonSource, RecordSource};
    use crate::Zip;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use trellis_core::data::DataValue;
    use trellis_core::policy::FieldPolicy;
    use trellis_core::record::{Record, RecordValue};
    use trellis_core::selection::{Argument, ArgumentValue};
    use trellis_core::QUERY_ROOT_KEY;

    struct MapSource(HashMap<CacheKey, Arc<Record>>);

    #[async_trait]
    impl RecordSource for MapSource {
        async fn record(&self, key: &CacheKey) -> TrellisResult<Option<Arc<Record>>> {
            Ok(self.0.get(key).cloned())
        }
    }

    impl MapSource {
        fn seeded(records: impl IntoIterator<Item = Record>) -> Self {
            Self(
                records
                    .into_iter()
                    .map(|record| (record.key.clone(), Arc::new(record)))
                    .collect(),
            )
        }

        fn root(&self) -> Arc<Record> {
            self.0
                .get(QUERY_ROOT_KEY)
                .cloned()
                .expect("seeded root record")
        }
    }

    fn character_set() -> SelectionSet {
        SelectionSet::new("Character").with_field(Field::new("name", FieldShape::Scalar))
    }

    fn hero_field(with_policy: bool) -> Field {
        let mut field = Field::new("hero", FieldShape::Object(character_set()))
            .with_argument(Argument::new("id", ArgumentValue::Scalar(json!("1"))));
        if with_policy {
            field = field.with_policy(FieldPolicy::from_specs(["id"]).unwrap());
        }
        field
    }

    async fn normalize_tree(
        set: &SelectionSet,
        tree: &serde_json::Value,
    ) -> (trellis_core::record::CacheReference, trellis_core::record::RecordSet) {
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut normalizer = RecordNormalizer::new();
        executor
            .execute(&JsonSource, set, tree, QUERY_ROOT_KEY, &mut normalizer)
            .await
            .expect("normalization succeeds")
    }

    #[tokio::test]
    async fn test_write_mints_policy_key_and_reference() {
        let set = SelectionSet::new("Query").with_field(hero_field(true));
        let tree = json!({"hero": {"name": "Luke"}});

        let (root, records) = normalize_tree(&set, &tree).await;
        assert_eq!(root.key, QUERY_ROOT_KEY);

        let root_record = records.get(QUERY_ROOT_KEY).unwrap();
        assert_eq!(
            root_record.get("hero(id:\"1\")"),
            Some(&RecordValue::reference("Character:1"))
        );
        assert_eq!(
            records.get("Character:1").unwrap().get("name"),
            Some(&RecordValue::Scalar(json!("Luke")))
        );
    }

    #[tokio::test]
    async fn test_write_without_policy_uses_structural_key() {
        let set = SelectionSet::new("Query").with_field(hero_field(false));
        let tree = json!({"hero": {"name": "Luke"}});

        let (_, records) = normalize_tree(&set, &tree).await;
        let root_record = records.get(QUERY_ROOT_KEY).unwrap();
        assert_eq!(
            root_record.get("hero(id:\"1\")"),
            Some(&RecordValue::reference("QUERY_ROOT.hero(id:\"1\")"))
        );
        assert!(records.contains_key("QUERY_ROOT.hero(id:\"1\")"));
    }

    #[tokio::test]
    async fn test_write_per_element_policy_keys() {
        let friends = Field::new(
            "friends",
            FieldShape::list(FieldShape::Object(character_set())),
        )
        .with_argument(Argument::new("ids", ArgumentValue::Scalar(json!([2, 3]))))
        .with_policy(FieldPolicy::from_specs(["ids"]).unwrap());
        let set = SelectionSet::new("Query").with_field(friends);
        let tree = json!({"friends": [{"name": "Han"}, {"name": "Leia"}]});

        let (_, records) = normalize_tree(&set, &tree).await;
        let root_record = records.get(QUERY_ROOT_KEY).unwrap();
        assert_eq!(
            root_record.get("friends(ids:[2,3])"),
            Some(&RecordValue::List(vec![
                RecordValue::reference("Character:2"),
                RecordValue::reference("Character:3"),
            ]))
        );
        assert_eq!(
            records.get("Character:3").unwrap().get("name"),
            Some(&RecordValue::Scalar(json!("Leia")))
        );
    }

    #[tokio::test]
    async fn test_write_key_count_mismatch_falls_back_structurally() {
        // Two elements arrive but the policy resolves a single key, so
        // neither element takes a custom identity.
        let friends = Field::new(
            "friends",
            FieldShape::list(FieldShape::Object(character_set())),
        )
        .with_argument(Argument::new("ids", ArgumentValue::Scalar(json!([2]))))
        .with_policy(FieldPolicy::from_specs(["ids"]).unwrap());
        let set = SelectionSet::new("Query").with_field(friends);
        let tree = json!({"friends": [{"name": "Han"}, {"name": "Leia"}]});

        let (_, records) = normalize_tree(&set, &tree).await;
        let root_record = records.get(QUERY_ROOT_KEY).unwrap();
        assert_eq!(
            root_record.get("friends(ids:[2])"),
            Some(&RecordValue::List(vec![
                RecordValue::reference("QUERY_ROOT.friends(ids:[2]).0"),
                RecordValue::reference("QUERY_ROOT.friends(ids:[2]).1"),
            ]))
        );
        assert!(!records.contains_key("Character:2"));
        assert!(records.contains_key("QUERY_ROOT.friends(ids:[2]).0"));
    }

    #[tokio::test]
    async fn test_write_two_trees_sharing_a_key_converge() {
        let set = SelectionSet::new("Query").with_field(hero_field(true));
        let first = json!({"hero": {"name": "Luke"}});
        let second = json!({"hero": {"name": "Leia"}});

        let (_, mut records) = normalize_tree(&set, &first).await;
        let (_, update) = normalize_tree(&set, &second).await;
        let changed = records.merge(update);

        assert!(changed.contains("Character:1.name"));
        assert_eq!(
            records.get("Character:1").unwrap().get("name"),
            Some(&RecordValue::Scalar(json!("Leia")))
        );
    }

    #[tokio::test]
    async fn test_write_absent_field_is_omitted() {
        let set = SelectionSet::new("Query").with_field(hero_field(true));
        let tree = json!({});

        let (_, records) = normalize_tree(&set, &tree).await;
        assert!(records.get(QUERY_ROOT_KEY).unwrap().is_empty());
        assert!(!records.contains_key("Character:1"));
    }

    #[tokio::test]
    async fn test_read_yields_shaped_data_and_dependencies() {
        let records = MapSource::seeded([
            Record::with_fields(
                QUERY_ROOT_KEY,
                [("hero".to_string(), RecordValue::reference("Character:1"))],
            ),
            Record::with_fields(
                "Character:1",
                [("name".to_string(), RecordValue::Scalar(json!("Luke")))],
            ),
        ]);
        let source = CacheSource::new(&records);
        let set = SelectionSet::new("Query")
            .with_field(Field::new("hero", FieldShape::Object(character_set())));
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut accumulator = Zip(SelectionMapper::new(), DependencyTracker::new());

        let (data, dependencies) = executor
            .execute(&source, &set, records.root(), QUERY_ROOT_KEY, &mut accumulator)
            .await
            .unwrap();

        match data.get("hero") {
            Some(DataValue::Object(hero)) => {
                assert_eq!(hero.get("name"), Some(&DataValue::Scalar(json!("Luke"))));
            }
            other => panic!("expected hero object, got {other:?}"),
        }
        assert_eq!(
            dependencies,
            HashSet::from([
                "QUERY_ROOT.hero".to_string(),
                "Character:1.name".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_read_missing_required_field_fails() {
        let records = MapSource::seeded([
            Record::with_fields(
                QUERY_ROOT_KEY,
                [("hero".to_string(), RecordValue::reference("Character:1"))],
            ),
            Record::new("Character:1"),
        ]);
        let source = CacheSource::new(&records);
        let set = SelectionSet::new("Query")
            .with_field(Field::new("hero", FieldShape::Object(character_set())));
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut accumulator = SelectionMapper::new();

        let err = executor
            .execute(&source, &set, records.root(), QUERY_ROOT_KEY, &mut accumulator)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TrellisError::Execution(ExecutionError::MissingValue {
                key: "Character:1".to_string(),
                field: "name".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_read_missing_optional_field_is_omitted_but_tracked() {
        let optional_name = SelectionSet::new("Character")
            .with_field(Field::new("name", FieldShape::optional(FieldShape::Scalar)));
        let records = MapSource::seeded([
            Record::with_fields(
                QUERY_ROOT_KEY,
                [("hero".to_string(), RecordValue::reference("Character:1"))],
            ),
            Record::new("Character:1"),
        ]);
        let source = CacheSource::new(&records);
        let set = SelectionSet::new("Query")
            .with_field(Field::new("hero", FieldShape::Object(optional_name)));
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut accumulator = Zip(SelectionMapper::new(), DependencyTracker::new());

        let (data, dependencies) = executor
            .execute(&source, &set, records.root(), QUERY_ROOT_KEY, &mut accumulator)
            .await
            .unwrap();

        match data.get("hero") {
            Some(DataValue::Object(hero)) => assert_eq!(hero.get("name"), None),
            other => panic!("expected hero object, got {other:?}"),
        }
        // The absent field still registers as a dependency, so its later
        // arrival invalidates this read.
        assert!(dependencies.contains("Character:1.name"));
    }

    #[tokio::test]
    async fn test_read_alias_keys_output_by_alias() {
        let aliased = SelectionSet::new("Character").with_field(
            Field::new("name", FieldShape::Scalar).with_alias("heroName"),
        );
        let records = MapSource::seeded([
            Record::with_fields(
                QUERY_ROOT_KEY,
                [("hero".to_string(), RecordValue::reference("Character:1"))],
            ),
            Record::with_fields(
                "Character:1",
                [("name".to_string(), RecordValue::Scalar(json!("Luke")))],
            ),
        ]);
        let source = CacheSource::new(&records);
        let set = SelectionSet::new("Query")
            .with_field(Field::new("hero", FieldShape::Object(aliased)));
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut accumulator = SelectionMapper::new();

        let data = executor
            .execute(&source, &set, records.root(), QUERY_ROOT_KEY, &mut accumulator)
            .await
            .unwrap();
        match data.get("hero") {
            Some(DataValue::Object(hero)) => {
                assert_eq!(hero.get("heroName"), Some(&DataValue::Scalar(json!("Luke"))));
                assert_eq!(hero.get("name"), None);
            }
            other => panic!("expected hero object, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_custom_key_redirect_without_stored_reference() {
        let records = MapSource::seeded([
            Record::new(QUERY_ROOT_KEY),
            Record::with_fields(
                "Character:1",
                [("name".to_string(), RecordValue::Scalar(json!("Luke")))],
            ),
        ]);
        let source = CacheSource::new(&records);
        let set = SelectionSet::new("Query").with_field(hero_field(true));
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut accumulator = SelectionMapper::new();

        let data = executor
            .execute(&source, &set, records.root(), QUERY_ROOT_KEY, &mut accumulator)
            .await
            .unwrap();
        match data.get("hero") {
            Some(DataValue::Object(hero)) => {
                assert_eq!(hero.get("name"), Some(&DataValue::Scalar(json!("Luke"))));
            }
            other => panic!("expected redirected hero, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_deferred_fragment_dropped_when_incomplete() {
        let bio_fragment = FragmentSpread::new(
            "bio",
            SelectionSet::new("Character").with_field(Field::new("bio", FieldShape::Scalar)),
        )
        .deferred();
        let hero_set = character_set().with_fragment(bio_fragment);
        let records = MapSource::seeded([
            Record::with_fields(
                QUERY_ROOT_KEY,
                [("hero".to_string(), RecordValue::reference("Character:1"))],
            ),
            Record::with_fields(
                "Character:1",
                [("name".to_string(), RecordValue::Scalar(json!("Luke")))],
            ),
        ]);
        let source = CacheSource::new(&records);
        let set = SelectionSet::new("Query")
            .with_field(Field::new("hero", FieldShape::Object(hero_set)));
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut accumulator = SelectionMapper::new();

        let data = executor
            .execute(&source, &set, records.root(), QUERY_ROOT_KEY, &mut accumulator)
            .await
            .unwrap();
        match data.get("hero") {
            Some(DataValue::Object(hero)) => {
                assert_eq!(hero.get("name"), Some(&DataValue::Scalar(json!("Luke"))));
                assert_eq!(hero.get("bio"), None);
                assert!(!hero.is_fulfilled("bio"));
            }
            other => panic!("expected hero object, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_deferred_fragment_included_when_complete() {
        let bio_fragment = FragmentSpread::new(
            "bio",
            SelectionSet::new("Character").with_field(Field::new("bio", FieldShape::Scalar)),
        )
        .deferred();
        let hero_set = character_set().with_fragment(bio_fragment);
        let records = MapSource::seeded([
            Record::with_fields(
                QUERY_ROOT_KEY,
                [("hero".to_string(), RecordValue::reference("Character:1"))],
            ),
            Record::with_fields(
                "Character:1",
                [
                    ("name".to_string(), RecordValue::Scalar(json!("Luke"))),
                    ("bio".to_string(), RecordValue::Scalar(json!("Jedi Knight"))),
                ],
            ),
        ]);
        let source = CacheSource::new(&records);
        let set = SelectionSet::new("Query")
            .with_field(Field::new("hero", FieldShape::Object(hero_set)));
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut accumulator = SelectionMapper::new();

        let data = executor
            .execute(&source, &set, records.root(), QUERY_ROOT_KEY, &mut accumulator)
            .await
            .unwrap();
        match data.get("hero") {
            Some(DataValue::Object(hero)) => {
                assert_eq!(
                    hero.get("bio"),
                    Some(&DataValue::Scalar(json!("Jedi Knight")))
                );
                assert!(hero.is_fulfilled("bio"));
            }
            other => panic!("expected hero object, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_type_condition_skips_mismatched_fragment() {
        let droid_fragment = FragmentSpread::new(
            "droidInfo",
            SelectionSet::new("Droid")
                .with_field(Field::new("primaryFunction", FieldShape::Scalar)),
        )
        .with_type_condition("Droid");
        let hero_set = character_set().with_fragment(droid_fragment);
        let records = MapSource::seeded([
            Record::with_fields(
                QUERY_ROOT_KEY,
                [("hero".to_string(), RecordValue::reference("Character:1"))],
            ),
            Record::with_fields(
                "Character:1",
                [
                    ("name".to_string(), RecordValue::Scalar(json!("Luke"))),
                    (
                        "__typename".to_string(),
                        RecordValue::Scalar(json!("Human")),
                    ),
                ],
            ),
        ]);
        let source = CacheSource::new(&records);
        let set = SelectionSet::new("Query")
            .with_field(Field::new("hero", FieldShape::Object(hero_set)));
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut accumulator = SelectionMapper::new();

        // primaryFunction is absent from the record; the read still succeeds
        // because the fragment does not apply to a Human.
        let data = executor
            .execute(&source, &set, records.root(), QUERY_ROOT_KEY, &mut accumulator)
            .await
            .unwrap();
        match data.get("hero") {
            Some(DataValue::Object(hero)) => {
                assert_eq!(hero.get("primaryFunction"), None);
                assert!(!hero.is_fulfilled("droidInfo"));
            }
            other => panic!("expected hero object, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_corrupt_record_surfaces_unexpected_value() {
        let records = MapSource::seeded([Record::with_fields(
            QUERY_ROOT_KEY,
            [("hero".to_string(), RecordValue::Scalar(json!("not a ref")))],
        )]);
        let source = CacheSource::new(&records);
        let set = SelectionSet::new("Query")
            .with_field(Field::new("hero", FieldShape::Object(character_set())));
        let vars = Variables::new();
        let executor = Executor::new(&vars);
        let mut accumulator = SelectionMapper::new();

        let err = executor
            .execute(&source, &set, records.root(), QUERY_ROOT_KEY, &mut accumulator)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrellisError::Execution(ExecutionError::UnexpectedValue { .. })
        ));
    }
}

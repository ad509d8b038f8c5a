//! Basic Store Example
//!
//! Demonstrates the fundamental Trellis workflow:
//! 1. Describe a query as a selection set
//! 2. Write a server response into the store (normalization)
//! 3. Read it back as shaped data with a dependency footprint
//! 4. Fold in a deferred chunk and detect stale reads
//!
//! This example uses the in-memory cache for simplicity.
//! For production over another backend, implement `NormalizedCache`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use trellis_core::{
    Argument, ArgumentValue, DataObject, DataValue, Field, FieldPolicy, FieldShape,
    FragmentSpread, KeyComponent, PathSegment, SelectionSet, TrellisResult, Variables,
    QUERY_ROOT_KEY,
};
use trellis_store::{
    ActivityEvent, ActivityOutcome, IncrementalResult, QueryResult, Store, StoreSubscriber,
};

#[tokio::main]
async fn main() -> TrellisResult<()> {
    println!("=== Trellis Basic Store Example ===\n");

    // Step 1: Describe the query
    let selection = hero_selection();
    println!("✓ Selection built");
    println!("  Root type: {}", selection.type_name);
    println!("  Deferred fragment: heroDetail");

    // Step 2: Create the store
    let store = Store::in_memory();
    println!("\n✓ Store created (in-memory cache)");

    // Step 3: Register an activity subscriber
    let log = Arc::new(ActivityLog::new());
    let subscriber_id = store.subscribe(log.clone())?;
    println!("\n✓ Activity subscriber registered");
    println!("  ID: {subscriber_id}");

    // Step 4: Write the initial server response
    let payload = initial_payload();
    let changed = store
        .write(|tx| {
            let selection_set = &selection;
            let payload = &payload;
            async move {
                tx.write_selection(QUERY_ROOT_KEY, selection_set, &Variables::new(), payload)
                    .await
            }
        })
        .await?;
    println!("\n✓ Server response normalized into records");
    print_paths("Changed paths", &changed);

    // Step 5: Read the selection back
    let mut result = store.load(&selection, &Variables::new()).await?;
    let watch = result.staleness_watch();
    println!("\n✓ Selection read back");
    println!("  Hero name: {:?}", hero_object(&result).get("name"));
    println!(
        "  heroDetail fulfilled: {}",
        hero_object(&result).is_fulfilled("heroDetail")
    );
    // The footprint already covers the missing bio field: the read depends
    // on it arriving.
    print_paths("Dependency footprint", &result.dependent_keys);

    println!("\n=== Deferred Delivery ===");

    // Step 6: The deferred chunk arrives and merges into the result
    result.merge_incremental(&detail_chunk())?;
    println!("✓ Deferred chunk merged");
    println!("  Hero bio: {:?}", hero_object(&result).get("bio"));
    println!(
        "  heroDetail fulfilled: {}",
        hero_object(&result).is_fulfilled("heroDetail")
    );

    // Step 7: Write the completed result back and check staleness
    let changed = store
        .write(|tx| {
            let selection_set = &selection;
            let data = &result.data;
            async move {
                tx.write_data(QUERY_ROOT_KEY, selection_set, &Variables::new(), data)
                    .await
            }
        })
        .await?;
    println!("\n✓ Completed result written back");
    print_paths("Changed paths", &changed);
    println!(
        "  Earlier read stale: {}",
        watch.is_affected_by(&changed)
    );

    // Step 8: Mutate the hero record in place
    let changed = store
        .write(|tx| async move {
            tx.update_object(
                &"Character:1".to_string(),
                &character_selection(),
                &Variables::new(),
                |hero| {
                    hero.insert("name", DataValue::Scalar(json!("Luke Skywalker, Jedi Knight")));
                },
            )
            .await
        })
        .await?;
    println!("\n✓ Hero record updated in place");
    print_paths("Changed paths", &changed);

    // Step 9: Read the final state
    let final_result = store.load(&selection, &Variables::new()).await?;
    let hero = hero_object(&final_result);
    println!("\n✓ Final read");
    println!("  Hero name: {:?}", hero.get("name"));
    println!("  Hero bio: {:?}", hero.get("bio"));
    println!(
        "  Activities observed: {} announced, {} completed",
        log.wills.load(Ordering::SeqCst),
        log.dids.load(Ordering::SeqCst)
    );

    println!("\n=== Example Complete ===");
    println!("This demonstrates the basic Trellis workflow:");
    println!("  Selection → Write (normalize) → Read (track) → Defer → Stale check");
    println!("\nNext steps:");
    println!("  - Implement NormalizedCache over your own persistence");
    println!("  - Hold Store::begin_read for multi-selection consistent reads");
    println!("  - See trellis-store/tests for concurrency patterns");

    Ok(())
}

/// Selection for `{ hero(id: "1") { name ... @defer(label: "heroDetail") { bio } } }`.
fn hero_selection() -> SelectionSet {
    SelectionSet::new("Query").with_field(
        Field::new(
            "hero",
            FieldShape::Object(
                SelectionSet::new("Character")
                    .with_field(Field::new("name", FieldShape::Scalar))
                    .with_fragment(
                        FragmentSpread::new(
                            "heroDetail",
                            SelectionSet::new("Character")
                                .with_field(Field::new("bio", FieldShape::Scalar)),
                        )
                        .deferred(),
                    ),
            ),
        )
        .with_argument(Argument::new("id", ArgumentValue::Scalar(json!("1"))))
        .with_policy(FieldPolicy::new([KeyComponent::new("id")])),
    )
}

/// Selection rooted at a Character record, for direct record edits.
fn character_selection() -> SelectionSet {
    SelectionSet::new("Character")
        .with_field(Field::new("name", FieldShape::Scalar))
        .with_field(Field::new("bio", FieldShape::Scalar))
}

/// The direct part of the response; the deferred bio is not in it yet.
fn initial_payload() -> serde_json::Value {
    json!({
        "hero": {
            "name": "Luke Skywalker"
        }
    })
}

/// The deferred chunk a streaming transport would deliver second.
fn detail_chunk() -> IncrementalResult {
    IncrementalResult {
        path: vec![PathSegment::Field("hero".to_string())],
        label: Some("heroDetail".to_string()),
        data: DataObject::from_fields([(
            "bio".to_string(),
            DataValue::Scalar(json!("Jedi Knight, student of Yoda")),
        )]),
        errors: None,
        extensions: None,
        dependent_keys: HashSet::from(["Character:1.bio".to_string()]),
    }
}

/// Borrow the hero object out of a query result.
fn hero_object(result: &QueryResult) -> &DataObject {
    match result.data.get("hero") {
        Some(DataValue::Object(object)) => object,
        other => panic!("hero should be an object, got {other:?}"),
    }
}

/// Print a sorted path set with a caption.
fn print_paths(caption: &str, paths: &HashSet<String>) {
    let mut sorted: Vec<_> = paths.iter().cloned().collect();
    sorted.sort();
    println!("  {}: {}", caption, sorted.len());
    for (i, path) in sorted.iter().enumerate() {
        println!("    {}. {}", i + 1, path);
    }
}

/// Subscriber that tallies cache activity as it happens.
struct ActivityLog {
    wills: AtomicU64,
    dids: AtomicU64,
}

impl ActivityLog {
    fn new() -> Self {
        Self {
            wills: AtomicU64::new(0),
            dids: AtomicU64::new(0),
        }
    }
}

impl StoreSubscriber for ActivityLog {
    fn will_perform(&self, _event: &ActivityEvent) -> TrellisResult<()> {
        self.wills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn did_perform(&self, _event: &ActivityEvent, _outcome: &ActivityOutcome) {
        self.dids.fetch_add(1, Ordering::SeqCst);
    }
}

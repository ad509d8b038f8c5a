//! Deferred fragment delivery and incremental result merging.

use serde_json::json;
use std::collections::HashSet;
use trellis_core::data::{DataObject, DataValue, PathSegment};
use trellis_core::error::{MergeError, TrellisResult};
use trellis_core::selection::Variables;
use trellis_core::QUERY_ROOT_KEY;
use trellis_store::IncrementalResult;
use trellis_test_utils::assertions::{assert_fulfilled, assert_scalar_field};
use trellis_test_utils::fixtures;

fn hero(data: &DataObject) -> &DataObject {
    match data.get("hero") {
        Some(DataValue::Object(object)) => object,
        other => panic!("expected hero object, got {other:?}"),
    }
}

fn bio_chunk() -> IncrementalResult {
    IncrementalResult {
        path: vec![PathSegment::Field("hero".to_string())],
        label: Some("heroDetail".to_string()),
        data: DataObject::from_fields([("bio".to_string(), DataValue::Scalar(json!("Jedi")))]),
        errors: None,
        extensions: None,
        dependent_keys: HashSet::from(["Character:1.bio".to_string()]),
    }
}

#[tokio::test]
async fn deferred_fragment_arrives_after_publish() -> TrellisResult<()> {
    let store = fixtures::seeded_store();
    let selection = fixtures::deferred_hero_selection();

    // The bio is not cached yet, so the fragment is dropped rather than
    // failing the read.
    let first = store.load(&selection, &Variables::new()).await?;
    let first_hero = hero(&first.data);
    assert_scalar_field(first_hero, "name", json!("Luke"));
    assert!(first_hero.get("bio").is_none());
    assert!(!first_hero.is_fulfilled("heroDetail"));

    // The dropped fragment's dependencies are still tracked, so the later
    // bio write flags this result as stale.
    let watch = first.staleness_watch();
    let changed = store.publish(fixtures::hero_records_with_bio()).await?;
    assert!(watch.is_affected_by(&changed));

    let second = store.load(&selection, &Variables::new()).await?;
    let second_hero = hero(&second.data);
    assert_scalar_field(second_hero, "bio", json!("Jedi"));
    assert_fulfilled(second_hero, "heroDetail");
    Ok(())
}

#[tokio::test]
async fn incremental_chunk_completes_a_deferred_read() -> TrellisResult<()> {
    let store = fixtures::seeded_store();
    let mut base = store
        .load(&fixtures::deferred_hero_selection(), &Variables::new())
        .await?;

    base.merge_incremental(&bio_chunk())?;

    let hero = hero(&base.data);
    assert_scalar_field(hero, "bio", json!("Jedi"));
    assert_fulfilled(hero, "heroDetail");
    assert!(base.dependent_keys.contains("Character:1.bio"));
    Ok(())
}

#[tokio::test]
async fn merged_chunk_can_be_written_back() -> TrellisResult<()> {
    let store = fixtures::seeded_store();
    let selection = fixtures::deferred_hero_selection();
    let mut base = store.load(&selection, &Variables::new()).await?;
    base.merge_incremental(&bio_chunk())?;

    // Re-normalizing the completed wrapper lands the bio in the cache.
    let data = base.data.clone();
    let changed = store
        .write(|tx| {
            let selection = &selection;
            let data = &data;
            async move {
                tx.write_data(QUERY_ROOT_KEY, selection, &Variables::new(), data)
                    .await
            }
        })
        .await?;
    assert!(changed.contains("Character:1.bio"));

    let reread = store.load(&selection, &Variables::new()).await?;
    assert_fulfilled(hero(&reread.data), "heroDetail");
    Ok(())
}

#[tokio::test]
async fn chunk_with_repeated_identical_field_is_accepted() -> TrellisResult<()> {
    let store = fixtures::seeded_store();
    let mut base = store
        .load(&fixtures::deferred_hero_selection(), &Variables::new())
        .await?;

    // Servers may repeat an already-delivered field as long as it agrees.
    let mut chunk = bio_chunk();
    chunk
        .data
        .insert("name", DataValue::Scalar(json!("Luke")));
    base.merge_incremental(&chunk)?;

    let hero = hero(&base.data);
    assert_scalar_field(hero, "name", json!("Luke"));
    assert_scalar_field(hero, "bio", json!("Jedi"));
    Ok(())
}

#[tokio::test]
async fn conflicting_chunk_is_rejected_atomically() -> TrellisResult<()> {
    let store = fixtures::seeded_store();
    let mut base = store
        .load(&fixtures::deferred_hero_selection(), &Variables::new())
        .await?;
    let before = base.clone();

    let mut chunk = bio_chunk();
    chunk
        .data
        .insert("name", DataValue::Scalar(json!("Leia")));
    let err = base.merge_incremental(&chunk).unwrap_err();

    assert!(matches!(err, MergeError::Conflict { .. }));
    assert_eq!(base, before);
    Ok(())
}

#[test]
fn chunk_survives_the_wire() {
    let chunk = bio_chunk();
    let encoded = serde_json::to_value(&chunk).expect("serialize chunk");
    let decoded: IncrementalResult = serde_json::from_value(encoded).expect("deserialize chunk");
    assert_eq!(chunk, decoded);
}

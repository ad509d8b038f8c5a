// Fuzz test for shaped data merging
//
// Feeds arbitrary JSON object pairs through `DataObject::merge` and checks
// the merge contract:
// - a failed merge leaves the base object exactly as it was
// - a successful merge keeps every existing field and admits every incoming one
// - re-merging an absorbed chunk is a no-op
//
// Run with: cargo +nightly fuzz run data_merge_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use trellis_core::DataValue;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(text) else {
        return;
    };
    let mut values = values.into_iter();
    let (Some(first), Some(second)) = (values.next(), values.next()) else {
        return;
    };
    let (DataValue::Object(base), DataValue::Object(incoming)) =
        (DataValue::from_json(first), DataValue::from_json(second))
    else {
        return;
    };

    let before = base.clone();
    let mut merged = base;
    match merged.merge(&incoming) {
        Err(_) => {
            assert_eq!(merged, before, "failed merge mutated the base");
        }
        Ok(()) => {
            for key in before.fields.keys() {
                assert!(merged.fields.contains_key(key), "existing field dropped");
            }
            for key in incoming.fields.keys() {
                assert!(merged.fields.contains_key(key), "incoming field dropped");
            }
            let settled = merged.clone();
            merged
                .merge(&incoming)
                .expect("re-merging an absorbed chunk");
            assert_eq!(merged, settled, "absorbed chunk merged again with effect");
        }
    }
});

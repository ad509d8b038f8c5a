//! Fuzz test for the record value JSON codec
//!
//! This fuzz target feeds arbitrary JSON documents through the persisted
//! record representation to find:
//! - Panics or crashes
//! - Values that escape canonical form
//! - Decode/encode instability
//!
//! Run with: cargo +nightly fuzz run record_codec_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use trellis_core::record::RecordValue;

fn assert_canonical(value: &RecordValue) {
    match value {
        // A scalar never hides a null or an array; those have dedicated
        // variants.
        RecordValue::Scalar(v) => {
            assert!(!v.is_null(), "null leaked into a Scalar");
            assert!(!v.is_array(), "array leaked into a Scalar");
            // An object shaped exactly like a persisted reference decodes as
            // Reference, never as an opaque scalar.
            if let serde_json::Value::Object(map) = v {
                let looks_like_reference = map.len() == 1
                    && matches!(
                        map.get(trellis_core::record::REFERENCE_SENTINEL),
                        Some(serde_json::Value::String(_))
                    );
                assert!(!looks_like_reference, "reference shape leaked into a Scalar");
            }
        }
        RecordValue::List(items) => {
            for item in items {
                assert_canonical(item);
            }
        }
        RecordValue::Null => {}
        RecordValue::Reference(_) => {}
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(json) = serde_json::from_str::<serde_json::Value>(input) else {
        return;
    };

    // Decoding arbitrary JSON should never panic, and the result should
    // always be in canonical form.
    let decoded = RecordValue::from_json_repr(json);
    assert_canonical(&decoded);

    // One decode canonicalizes; after that the repr must be stable.
    let repr = decoded.to_json_repr();
    let redecoded = RecordValue::from_json_repr(repr.clone());
    assert_eq!(decoded, redecoded, "decode is not stable over its own repr");
    assert_eq!(
        repr,
        redecoded.to_json_repr(),
        "encode is not stable over a decode round trip"
    );
});

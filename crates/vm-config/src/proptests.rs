//! Property-based tests for document merging.

use crate::merge::merge;
use proptest::prelude::*;
use serde_json::{Map, Value};

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9 ]{0,8}".prop_map(Value::String),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-e]{1,2}", inner, 0..5)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn object_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-e]{1,2}", value_strategy(), 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

/// Every leaf path of `overlay` must read back the overlay's value from the
/// merged document.
fn overlay_leaves_win(merged: &Value, overlay: &Value) -> bool {
    match overlay {
        Value::Object(map) if merged.is_object() => map
            .iter()
            .all(|(k, v)| merged.get(k).is_some_and(|m| overlay_leaves_win(m, v))),
        other => merged == other,
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        .. ProptestConfig::default()
    })]

    #[test]
    fn merging_empty_object_is_identity(base in object_strategy()) {
        prop_assert_eq!(merge(&base, &Value::Object(Map::new())), base);
    }

    #[test]
    fn merging_onto_empty_object_yields_overlay(overlay in object_strategy()) {
        prop_assert_eq!(merge(&Value::Object(Map::new()), &overlay), overlay);
    }

    #[test]
    fn overlay_values_always_win(base in object_strategy(), overlay in object_strategy()) {
        let merged = merge(&base, &overlay);
        prop_assert!(overlay_leaves_win(&merged, &overlay));
    }

    #[test]
    fn base_only_keys_survive(base in object_strategy(), overlay in object_strategy()) {
        let merged = merge(&base, &overlay);
        for (key, value) in base.as_object().into_iter().flatten() {
            if overlay.get(key).is_none() {
                prop_assert_eq!(merged.get(key), Some(value));
            }
        }
    }

    #[test]
    fn merge_is_idempotent(base in object_strategy(), overlay in object_strategy()) {
        let once = merge(&base, &overlay);
        prop_assert_eq!(merge(&once, &overlay), once.clone());
    }
}

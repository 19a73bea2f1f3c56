//! Edge case tests for mcrel-state.

use chrono::{DateTime, Utc};
use mcrel_state::{
    deep_merge, deep_merge_value, path, record, AtomicClassifier, MergeError, MergeOptions, Patch,
    PatchValue, Path, Seg, Value,
};
use serde_json::json;

fn merge(target: &Value, patch: &Patch) -> Result<Value, MergeError> {
    deep_merge(target, patch, &AtomicClassifier::new())
}

// ============================================================================
// Invalid inputs
// ============================================================================

#[test]
fn test_non_record_targets() {
    for target in [Value::Null, Value::from(1), Value::from("s"), Value::from(vec![1])] {
        let err = merge(&target, &Patch::new()).unwrap_err();
        assert!(matches!(err, MergeError::InvalidTarget { .. }), "{target:?}");
    }
}

#[test]
fn test_non_record_value_sources() {
    let err = deep_merge_value(&record! {}, &Value::from(vec![1]), &AtomicClassifier::new())
        .unwrap_err();
    assert_eq!(err.to_string(), "merge source must be a record, but got: list");
    assert!(Patch::try_from(&Value::Null).is_err());
}

#[test]
fn test_guard_matching_everything_still_merges_root() {
    // Guards only affect fields; the root itself is always merged.
    let classifier = AtomicClassifier::new().with_guard(|_: &Value| true);
    let state = record! { "a" => record! { "b" => 1 } };
    let patch = Patch::new().nested("a", Patch::new().set("c", 2));
    let next = deep_merge(&state, &patch, &classifier).unwrap();
    assert_eq!(next["a"], record! { "c" => 2 });
}

// ============================================================================
// Materializing patches over missing targets
// ============================================================================

#[test]
fn test_nested_patch_creates_missing_record() {
    let next = merge(
        &record! {},
        &Patch::new().nested("a", Patch::new().nested("b", Patch::new().set("c", 1))),
    )
    .unwrap();
    assert_eq!(next, Value::from(json!({"a": {"b": {"c": 1}}})));
}

#[test]
fn test_clear_inside_materialized_patch_is_dropped() {
    let patch = Patch::new().nested("a", Patch::new().clear("x").set("y", 1));
    let next = merge(&record! {}, &patch).unwrap();
    assert_eq!(next["a"], record! { "y" => 1 });
}

#[test]
fn test_empty_nested_patch_over_record_keeps_contents() {
    let state = record! { "a" => record! { "b" => 1 } };
    let next = merge(&state, &Patch::new().nested("a", Patch::new())).unwrap();
    assert_eq!(next["a"], state["a"]);
}

#[test]
fn test_empty_nested_patch_over_primitive_is_empty_record() {
    let state = record! { "a" => 3 };
    let next = merge(&state, &Patch::new().nested("a", Patch::new())).unwrap();
    assert_eq!(next["a"], record! {});
}

// ============================================================================
// Ordering and identity
// ============================================================================

#[test]
fn test_field_order_is_preserved() {
    let state = Value::from(json!({"z": 1, "a": 2, "m": 3}));
    let next = merge(&state, &Patch::new().set("a", 20).set("new", 4)).unwrap();
    let keys: Vec<&str> = next.as_record().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["z", "a", "m", "new"]);
}

#[test]
fn test_cleared_field_order_after_reinsert() {
    let state = record! { "a" => 1, "b" => 2 };
    let next = merge(&state, &Patch::new().clear("a")).unwrap();
    let next = merge(&next, &Patch::new().set("a", 1)).unwrap();
    let keys: Vec<&str> = next.as_record().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["b", "a"]);
}

#[test]
fn test_replacing_with_same_node_keeps_identity() {
    let shared = record! { "x" => 1 };
    let state = record! { "a" => shared.clone() };
    let next = merge(&state, &Patch::new().set("b", shared.clone())).unwrap();
    assert!(next["b"].same(&shared));
    assert!(next["a"].same(&next["b"]));
}

#[test]
fn test_callables_and_opaques_are_assigned_by_identity() {
    let f = Value::callable(|args| args.first().cloned().unwrap_or_default());
    let handle = Value::opaque(42u64);
    let state = record! {};
    let next = merge(&state, &Patch::new().set("f", f.clone()).set("h", handle.clone())).unwrap();

    assert!(next["f"].same(&f));
    assert!(next["h"].same(&handle));
    let echoed = next["f"].as_callable().unwrap().call(&[Value::from("hi")]);
    assert_eq!(echoed, "hi");
}

#[test]
fn test_datetime_value_equality() {
    let t: DateTime<Utc> = DateTime::from_timestamp(86_400, 0).unwrap();
    let a = record! { "t" => t };
    let b = record! { "t" => t };
    assert_eq!(a, b);
    assert!(!a["t"].same(&b["t"]));
}

// ============================================================================
// JSON interop
// ============================================================================

#[test]
fn test_patch_from_json_merges_records() {
    let state = Value::from(json!({"user": {"name": "ada", "age": 36}}));
    let patch = Patch::from_json(json!({"user": {"age": 37}})).unwrap();
    let next = merge(&state, &patch).unwrap();
    assert_eq!(next.to_json().unwrap(), json!({"user": {"name": "ada", "age": 37}}));
}

#[test]
fn test_round_trip_through_serde_json() {
    let state = Value::from(json!({"a": [1, 2.5, "x", null, {"b": false}]}));
    let text = serde_json::to_string(&state).unwrap();
    let back: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(back, state);
}

#[test]
fn test_json_conversion_rejects_opaque() {
    let state = record! { "h" => Value::opaque(()) };
    assert!(serde_json::Value::try_from(&state).is_err());
}

#[test]
fn test_merge_options_from_json() {
    let options: MergeOptions = serde_json::from_value(json!({})).unwrap();
    assert_eq!(options, MergeOptions::default());
    let options: MergeOptions = serde_json::from_value(json!({"max_depth": 3})).unwrap();
    assert_eq!(options.max_depth, 3);
}

// ============================================================================
// Paths
// ============================================================================

#[test]
fn test_path_display_and_serde() {
    let p = path!("users").entry("alice").field("tags").index(2);
    assert_eq!(p.to_string(), "$.users{\"alice\"}.tags[2]");

    let json = serde_json::to_value(&p).unwrap();
    let back: Path = serde_json::from_value(json).unwrap();
    assert_eq!(back, p);
    assert_eq!(back.last(), Some(&Seg::Index(2)));
}

#[test]
fn test_patch_value_conversions() {
    assert_eq!(PatchValue::from(1), PatchValue::Value(Value::from(1)));
    assert_eq!(PatchValue::from("s"), PatchValue::Value(Value::from("s")));
    assert!(matches!(PatchValue::from(Patch::new()), PatchValue::Nested(_)));
}

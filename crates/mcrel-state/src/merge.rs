//! The deep-merge engine.
//!
//! `deep_merge` is a pure function: the target is never mutated. The result
//! is a new root record in which every field the patch did not touch is the
//! same `Arc` as in the target, so `Value::same` on an untouched subtree of the
//! old and new state returns true.
//!
//! Per field the rules are:
//!
//! - `Pierce` patches one element of the list or map held by the target field.
//! - `Clear` removes the field.
//! - A nested patch, or a record value, over a non-atomic record recurses.
//! - Anything else replaces the field.

use crate::{
    AtomicClassifier, MergeError, MergeResult, Patch, PatchValue, Path, Pierce, Record, Seg, Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Default nesting limit for a single merge.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Tuning for a merge call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Deepest level the engine descends to before reporting
    /// [`MergeError::Circular`].
    pub max_depth: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl MergeOptions {
    /// Set the depth limit (builder pattern).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Merge `source` into `target` and return the new tree.
///
/// # Examples
///
/// ```
/// use mcrel_state::{deep_merge, record, AtomicClassifier, Patch};
///
/// let state = record! {
///     "user" => record! { "name" => "ada", "age" => 36 },
///     "prefs" => record! { "theme" => "dark" },
/// };
/// let patch = Patch::new().nested("user", Patch::new().set("age", 37));
///
/// let next = deep_merge(&state, &patch, &AtomicClassifier::new()).unwrap();
/// assert_eq!(next["user"]["age"], 37);
/// assert_eq!(next["user"]["name"], "ada");
/// assert!(next["prefs"].same(&state["prefs"]));
/// assert_eq!(state["user"]["age"], 36);
/// ```
pub fn deep_merge(
    target: &Value,
    source: &Patch,
    classifier: &AtomicClassifier,
) -> MergeResult<Value> {
    deep_merge_with(target, source, classifier, &MergeOptions::default())
}

/// [`deep_merge`] with explicit options.
pub fn deep_merge_with(
    target: &Value,
    source: &Patch,
    classifier: &AtomicClassifier,
    options: &MergeOptions,
) -> MergeResult<Value> {
    let record = target
        .as_record()
        .ok_or_else(|| MergeError::invalid_target(target.type_name()))?;

    let mut merger = Merger {
        classifier,
        max_depth: options.max_depth,
        path: Path::root(),
    };
    merger.merge_patch(record, source, 0).map(Value::from_record)
}

/// Merge a record value into `target`.
///
/// Equivalent to [`deep_merge`] with [`Patch::from_value`]; fails with
/// [`MergeError::InvalidSource`] if `source` is not a record.
pub fn deep_merge_value(
    target: &Value,
    source: &Value,
    classifier: &AtomicClassifier,
) -> MergeResult<Value> {
    deep_merge_value_with(target, source, classifier, &MergeOptions::default())
}

/// [`deep_merge_value`] with explicit options.
pub fn deep_merge_value_with(
    target: &Value,
    source: &Value,
    classifier: &AtomicClassifier,
    options: &MergeOptions,
) -> MergeResult<Value> {
    let record = target
        .as_record()
        .ok_or_else(|| MergeError::invalid_target(target.type_name()))?;
    let source = source
        .as_record()
        .ok_or_else(|| MergeError::invalid_source(source.type_name()))?;

    let mut merger = Merger {
        classifier,
        max_depth: options.max_depth,
        path: Path::root(),
    };
    merger.merge_values(record, source, 0).map(Value::from_record)
}

struct Merger<'a> {
    classifier: &'a AtomicClassifier,
    max_depth: usize,
    /// Location of the field currently being merged, for error reporting.
    path: Path,
}

impl Merger<'_> {
    fn enter(&self, depth: usize) -> MergeResult<()> {
        if depth > self.max_depth {
            return Err(MergeError::circular(self.path.clone(), self.max_depth));
        }
        Ok(())
    }

    /// The target as a record the engine may descend into.
    fn mergeable<'v>(&self, current: Option<&'v Value>) -> Option<&'v Record> {
        match current {
            Some(value @ Value::Record(record)) if !self.classifier.is_atomic(value) => {
                Some(record.as_ref())
            }
            _ => None,
        }
    }

    fn merge_patch(
        &mut self,
        target: &Record,
        source: &Patch,
        depth: usize,
    ) -> MergeResult<Record> {
        self.enter(depth)?;

        let mut result = target.clone();
        for (field, update) in source {
            self.path.push(Seg::Field(field.clone()));
            let merged = self.merge_field(target.get(field), update, depth);
            self.path.pop();

            match merged? {
                Some(value) => {
                    result.insert(field.clone(), value);
                }
                None => {
                    result.shift_remove(field);
                }
            }
        }
        Ok(result)
    }

    /// Merge one update into the current value of a field.
    ///
    /// `None` means the field ends up absent.
    fn merge_field(
        &mut self,
        current: Option<&Value>,
        update: &PatchValue,
        depth: usize,
    ) -> MergeResult<Option<Value>> {
        match update {
            PatchValue::Clear => Ok(None),
            PatchValue::Pierce(pierce) => self.pierce_merge(current, pierce, depth).map(Some),
            PatchValue::Nested(patch) => match self.mergeable(current) {
                Some(record) => self
                    .merge_patch(record, patch, depth + 1)
                    .map(|r| Some(Value::from_record(r))),
                None => self.materialize(patch, depth + 1).map(Some),
            },
            PatchValue::Value(value) => self.merge_value(current, value, depth).map(Some),
        }
    }

    fn merge_value(
        &mut self,
        current: Option<&Value>,
        value: &Value,
        depth: usize,
    ) -> MergeResult<Value> {
        match (self.mergeable(current), value) {
            (Some(record), Value::Record(source)) => self
                .merge_values(record, source, depth + 1)
                .map(Value::from_record),
            _ => Ok(value.clone()),
        }
    }

    fn merge_values(
        &mut self,
        target: &Record,
        source: &Record,
        depth: usize,
    ) -> MergeResult<Record> {
        self.enter(depth)?;

        let mut result = target.clone();
        for (field, value) in source {
            self.path.push(Seg::Field(field.clone()));
            let merged = self.merge_value(target.get(field), value, depth);
            self.path.pop();

            result.insert(field.clone(), merged?);
        }
        Ok(result)
    }

    /// Build a fresh record from a nested patch that has no record to merge into.
    fn materialize(&mut self, patch: &Patch, depth: usize) -> MergeResult<Value> {
        self.enter(depth)?;

        let mut record = Record::with_capacity(patch.len());
        for (field, update) in patch {
            self.path.push(Seg::Field(field.clone()));
            let value = match update {
                PatchValue::Clear => None,
                PatchValue::Value(value) => Some(Ok(value.clone())),
                PatchValue::Nested(nested) => Some(self.materialize(nested, depth + 1)),
                PatchValue::Pierce(_) => Some(Err(MergeError::pierce_wrong_target(
                    self.path.clone(),
                    "absent",
                ))),
            }
            .transpose();
            self.path.pop();

            if let Some(value) = value? {
                record.insert(field.clone(), value);
            }
        }
        Ok(Value::from_record(record))
    }

    fn pierce_merge(
        &mut self,
        current: Option<&Value>,
        pierce: &Pierce,
        depth: usize,
    ) -> MergeResult<Value> {
        let key = pierce.key();
        trace!(path = %self.path, %key, "pierce merge");

        match current {
            Some(Value::List(list)) => {
                let index = key
                    .as_index()
                    .filter(|i| *i < list.len())
                    .ok_or_else(|| MergeError::pierce_wrong_key(self.path.clone(), key.clone()))?;

                self.path.push(Seg::Index(index));
                let merged = self.merge_field(list.get(index), pierce.value(), depth + 1);
                self.path.pop();

                let mut result: Vec<Value> = (**list).clone();
                result[index] = merged?.unwrap_or(Value::Null);
                Ok(Value::List(Arc::new(result)))
            }
            Some(Value::Map(map)) => {
                let existing = map
                    .get(key)
                    .ok_or_else(|| MergeError::pierce_wrong_key(self.path.clone(), key.clone()))?;

                self.path.push(Seg::Entry(key.clone()));
                let merged = self.merge_field(Some(existing), pierce.value(), depth + 1);
                self.path.pop();

                let mut result: crate::Map = (**map).clone();
                match merged? {
                    Some(value) => {
                        result.insert(key.clone(), value);
                    }
                    None => {
                        result.shift_remove(key);
                    }
                }
                Ok(Value::Map(Arc::new(result)))
            }
            other => Err(MergeError::pierce_wrong_target(
                self.path.clone(),
                other.map_or("absent", Value::type_name),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, pierce, record};
    use serde_json::json;

    fn merge(target: &Value, patch: &Patch) -> MergeResult<Value> {
        deep_merge(target, patch, &AtomicClassifier::new())
    }

    #[test]
    fn test_single_value() {
        let obj = record! { "a" => 0 };
        let next = merge(&obj, &Patch::new().set("a", 1)).unwrap();
        assert_eq!(next, record! { "a" => 1 });
        assert!(!next.same(&obj));
    }

    #[test]
    fn test_nested_shares_untouched_siblings() {
        let obj = Value::from(json!({
            "a": 0,
            "sub1": {"b": "b", "c": false, "subSub": {"d": 0}},
            "sub2": {"e": 0},
        }));
        let patch = Patch::new().nested("sub1", Patch::new().set("b", "newB"));
        let next = merge(&obj, &patch).unwrap();

        assert_eq!(
            next,
            Value::from(json!({
                "a": 0,
                "sub1": {"b": "newB", "c": false, "subSub": {"d": 0}},
                "sub2": {"e": 0},
            }))
        );
        assert!(!next["sub1"].same(&obj["sub1"]));
        assert!(next["sub1"]["subSub"].same(&obj["sub1"]["subSub"]));
        assert!(next["sub2"].same(&obj["sub2"]));
    }

    #[test]
    fn test_record_value_merges_like_nested_patch() {
        let obj = Value::from(json!({"user": {"name": "ada", "age": 1}}));
        let source = Value::from(json!({"user": {"age": 2}}));
        let next = deep_merge_value(&obj, &source, &AtomicClassifier::new()).unwrap();
        assert_eq!(next, Value::from(json!({"user": {"name": "ada", "age": 2}})));
    }

    #[test]
    fn test_record_value_over_absent_field_is_assigned_as_is() {
        let obj = record! {};
        let sub = record! { "x" => 1 };
        let next = merge(&obj, &Patch::new().set("sub", sub.clone())).unwrap();
        assert!(next["sub"].same(&sub));
    }

    #[test]
    fn test_clear_and_explicit_null() {
        let obj = record! { "a" => 1, "b" => 2 };
        let next = merge(&obj, &Patch::new().clear("a")).unwrap();
        assert!(!next.as_record().unwrap().contains_key("a"));
        assert_eq!(next["b"], 2);

        let next = merge(&obj, &Patch::new().set("a", Value::Null)).unwrap();
        assert!(next.as_record().unwrap().contains_key("a"));
        assert!(next["a"].is_null());
    }

    #[test]
    fn test_nested_patch_over_null_materializes() {
        let obj = record! { "sub" => Value::Null };
        let patch = Patch::new().nested("sub", Patch::new().set("d", 2).clear("e"));
        let next = merge(&obj, &patch).unwrap();
        assert_eq!(next, record! { "sub" => record! { "d" => 2 } });
    }

    #[test]
    fn test_pierce_inside_materialized_patch_has_no_target() {
        let obj = record! {};
        let patch = Patch::new().nested("sub", Patch::new().pierce("items", 0, 1));
        let err = merge(&obj, &patch).unwrap_err();
        assert_eq!(
            err,
            MergeError::PierceWrongTarget {
                path: path!("sub", "items"),
                found: "absent",
            }
        );
    }

    #[test]
    fn test_invalid_target() {
        let err = merge(&Value::from(vec![1]), &Patch::new()).unwrap_err();
        assert_eq!(err, MergeError::InvalidTarget { found: "list" });
    }

    #[test]
    fn test_invalid_source() {
        let err = deep_merge_value(&record! {}, &Value::from(3), &AtomicClassifier::new())
            .unwrap_err();
        assert_eq!(err, MergeError::InvalidSource { found: "number" });
    }

    #[test]
    fn test_value_merge_honors_depth_option() {
        let state = record! { "a" => record! { "b" => record! { "c" => 0 } } };
        let source = record! { "a" => record! { "b" => record! { "c" => 1 } } };
        let classifier = AtomicClassifier::new();

        let options = MergeOptions::default().with_max_depth(1);
        let err = deep_merge_value_with(&state, &source, &classifier, &options).unwrap_err();
        assert_eq!(
            err,
            MergeError::Circular {
                path: path!("a", "b"),
                limit: 1,
            }
        );

        let options = MergeOptions::default().with_max_depth(2);
        let next = deep_merge_value_with(&state, &source, &classifier, &options).unwrap();
        assert_eq!(next["a"]["b"]["c"], 1);
    }

    #[test]
    fn test_depth_limit_reports_circular() {
        let mut state = record! { "leaf" => 0 };
        let mut patch = Patch::new().set("leaf", 1);
        for _ in 0..10 {
            state = record! { "next" => state };
            patch = Patch::new().nested("next", patch);
        }

        let options = MergeOptions::default().with_max_depth(4);
        let err = deep_merge_with(&state, &patch, &AtomicClassifier::new(), &options).unwrap_err();
        match err {
            MergeError::Circular { path, limit } => {
                assert_eq!(limit, 4);
                assert_eq!(path.len(), 5);
            }
            other => panic!("expected circular error, got {other:?}"),
        }

        let next = deep_merge(&state, &patch, &AtomicClassifier::new()).unwrap();
        let leaf = (0..10).fold(&next, |v, _| &v["next"]);
        assert_eq!(leaf["leaf"], 1);
    }

    #[test]
    fn test_pierce_list_by_index() {
        let obj = record! { "arr" => vec![1, 2, 3] };
        let next = merge(&obj, &Patch::new().with("arr", pierce(0, 4))).unwrap();
        assert_eq!(next["arr"], Value::from(vec![4, 2, 3]));
        assert!(!next["arr"].same(&obj["arr"]));
    }

    #[test]
    fn test_pierce_path_in_error() {
        let obj = record! { "outer" => record! { "arr" => vec![1] } };
        let patch = Patch::new().nested("outer", Patch::new().pierce("arr", 5, 0));
        let err = merge(&obj, &patch).unwrap_err();
        assert_eq!(err.path(), Some(&path!("outer", "arr")));
    }

    #[test]
    fn test_clear_through_pierce() {
        let obj = record! {
            "arr" => vec![1, 2],
            "map" => Value::map([("a", 1), ("b", 2)]),
        };
        let patch = Patch::new()
            .pierce("arr", 0, PatchValue::Clear)
            .pierce("map", "a", PatchValue::Clear);
        let next = merge(&obj, &patch).unwrap();
        assert_eq!(next["arr"], Value::from(vec![Value::Null, Value::from(2)]));
        assert_eq!(next["map"], Value::map([("b", 2)]));
    }

    #[test]
    fn test_nested_pierce() {
        let grid = Value::from(vec![Value::from(vec![0, 0]), Value::from(vec![0, 0])]);
        let obj = record! { "grid" => grid };
        let patch = Patch::new().with("grid", pierce(1, pierce(0, 7)));
        let next = merge(&obj, &patch).unwrap();
        assert_eq!(next["grid"][1][0], 7);
        assert!(next["grid"][0].same(&obj["grid"][0]));
    }
}

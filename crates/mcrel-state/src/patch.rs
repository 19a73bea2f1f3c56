//! Patches: partial descriptions of a state change.
//!
//! A `Patch` mirrors a subset of a record's fields. Each field holds a
//! [`PatchValue`] saying what to do with the target field: merge a value into
//! it, merge a nested patch into it, pierce one element of a list or map, or
//! clear it.

use crate::{Key, MergeError, MergeResult, Record, Value};
use indexmap::IndexMap;

/// What a patch does to a single field.
#[derive(Clone, Debug, PartialEq)]
pub enum PatchValue {
    /// A plain value.
    ///
    /// A record value merges into a non-atomic record target. Anything else
    /// replaces the target, including an explicit `Null`.
    Value(Value),
    /// A partial record that may itself contain `Clear` and `Pierce` fields.
    Nested(Patch),
    /// Patch one element of a list or map field.
    Pierce(Pierce),
    /// Remove the field.
    Clear,
}

impl PatchValue {
    /// Whether this is the `Clear` sentinel.
    #[inline]
    pub fn is_clear(&self) -> bool {
        matches!(self, PatchValue::Clear)
    }
}

/// A targeted update of one element inside a list or map field.
///
/// The key must already exist in the target; a pierce never inserts.
#[derive(Clone, Debug, PartialEq)]
pub struct Pierce {
    key: Key,
    value: Box<PatchValue>,
}

impl Pierce {
    pub fn new(key: impl Into<Key>, value: impl Into<PatchValue>) -> Self {
        Self {
            key: key.into(),
            value: Box::new(value.into()),
        }
    }

    /// The list index or map key being pierced.
    #[inline]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The update applied to the element.
    #[inline]
    pub fn value(&self) -> &PatchValue {
        &self.value
    }
}

/// Build a pierce for a list or map field.
///
/// # Examples
///
/// ```
/// use mcrel_state::{deep_merge, pierce, record, AtomicClassifier, Patch};
///
/// let state = record! {
///     "todos" => vec![record! { "done" => false }, record! { "done" => false }],
/// };
/// let patch = Patch::new().with("todos", pierce(1, Patch::new().set("done", true)));
///
/// let next = deep_merge(&state, &patch, &AtomicClassifier::new()).unwrap();
/// assert_eq!(next["todos"][1]["done"], true);
/// assert!(next["todos"][0].same(&state["todos"][0]));
/// ```
pub fn pierce(key: impl Into<Key>, value: impl Into<PatchValue>) -> PatchValue {
    PatchValue::Pierce(Pierce::new(key, value))
}

/// An ordered set of field updates.
///
/// Fields are applied in insertion order. Setting the same field twice keeps
/// the last update in the first field's position.
///
/// # Examples
///
/// ```
/// use mcrel_state::Patch;
///
/// let patch = Patch::new()
///     .set("filter", "done")
///     .nested("draft", Patch::new().clear("title"));
///
/// assert_eq!(patch.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Patch {
    fields: IndexMap<String, PatchValue>,
}

impl Patch {
    /// Create an empty patch.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a patch from a record value; every field becomes a
    /// [`PatchValue::Value`].
    ///
    /// Fails with [`MergeError::InvalidSource`] if `value` is not a record.
    pub fn from_value(value: &Value) -> MergeResult<Self> {
        value
            .as_record()
            .map(Self::from_record)
            .ok_or_else(|| MergeError::invalid_source(value.type_name()))
    }

    /// Build a patch from JSON. `null` fields set an explicit null.
    pub fn from_json(json: serde_json::Value) -> MergeResult<Self> {
        Self::from_value(&Value::from(json))
    }

    /// Build a patch whose fields are plain values.
    pub fn from_record(record: &Record) -> Self {
        record
            .iter()
            .map(|(k, v)| (k.clone(), PatchValue::Value(v.clone())))
            .collect()
    }

    /// Add a field update (builder pattern).
    #[inline]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<PatchValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Set a field to a plain value (builder pattern).
    #[inline]
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, PatchValue::Value(value.into()))
    }

    /// Merge a nested patch into a field (builder pattern).
    #[inline]
    pub fn nested(self, field: impl Into<String>, patch: Patch) -> Self {
        self.with(field, PatchValue::Nested(patch))
    }

    /// Remove a field (builder pattern).
    #[inline]
    pub fn clear(self, field: impl Into<String>) -> Self {
        self.with(field, PatchValue::Clear)
    }

    /// Pierce one element of a list or map field (builder pattern).
    #[inline]
    pub fn pierce(
        self,
        field: impl Into<String>,
        key: impl Into<Key>,
        value: impl Into<PatchValue>,
    ) -> Self {
        self.with(field, pierce(key, value))
    }

    /// Insert a field update, returning the one it replaced.
    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<PatchValue>,
    ) -> Option<PatchValue> {
        self.fields.insert(field.into(), value.into())
    }

    /// Remove a field update.
    pub fn remove(&mut self, field: &str) -> Option<PatchValue> {
        self.fields.shift_remove(field)
    }

    /// Get the update for a field.
    #[inline]
    pub fn get(&self, field: &str) -> Option<&PatchValue> {
        self.fields.get(field)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterate over field updates in application order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PatchValue)> {
        self.fields.iter()
    }
}

impl FromIterator<(String, PatchValue)> for Patch {
    fn from_iter<I: IntoIterator<Item = (String, PatchValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = (&'a String, &'a PatchValue);
    type IntoIter = indexmap::map::Iter<'a, String, PatchValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl TryFrom<&Value> for Patch {
    type Error = MergeError;

    fn try_from(value: &Value) -> MergeResult<Self> {
        Patch::from_value(value)
    }
}

impl From<Patch> for PatchValue {
    fn from(patch: Patch) -> Self {
        PatchValue::Nested(patch)
    }
}

impl From<Pierce> for PatchValue {
    fn from(pierce: Pierce) -> Self {
        PatchValue::Pierce(pierce)
    }
}

impl From<Value> for PatchValue {
    fn from(value: Value) -> Self {
        PatchValue::Value(value)
    }
}

macro_rules! patch_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for PatchValue {
                fn from(v: $ty) -> Self {
                    PatchValue::Value(Value::from(v))
                }
            }
        )*
    };
}

patch_value_from!(bool, i32, i64, u32, u64, usize, f64, &str, String);

//! The dynamic state tree.
//!
//! Container nodes live behind `Arc`, so cloning a `Value` clones a pointer and
//! two snapshots can share untouched subtrees. `Value::same` exposes that
//! sharing: it is pointer identity for object-like values and plain equality
//! for primitives.

use crate::{Key, Path, Seg};
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Ordered string-keyed fields of a record node.
pub type Record = IndexMap<String, Value>;

/// Ordered entries of a map node.
pub type Map = IndexMap<Key, Value>;

/// Ordered members of a set node.
pub type Set = IndexSet<Key>;

static NULL: Value = Value::Null;

/// A node in the state tree.
///
/// Records are the only nodes the merge engine descends into. Every other
/// object-like variant is atomic and gets replaced wholesale, except that
/// lists and maps can be pierced.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Explicit null.
    #[default]
    Null,
    /// Boolean leaf.
    Bool(bool),
    /// Numeric leaf.
    Number(Number),
    /// String leaf.
    String(Arc<str>),
    /// Plain record, merged field by field.
    Record(Arc<Record>),
    /// Ordered sequence.
    List(Arc<Vec<Value>>),
    /// Key-to-value mapping.
    Map(Arc<Map>),
    /// Key set.
    Set(Arc<Set>),
    /// Point in time.
    DateTime(Arc<DateTime<Utc>>),
    /// Compiled regular expression.
    Regex(Arc<Regex>),
    /// Host function.
    Callable(Callable),
    /// Foreign object the tree only carries around (futures, weak handles,
    /// domain types).
    Opaque(Opaque),
}

/// A function stored in the state tree.
#[derive(Clone)]
pub struct Callable(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the function.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    /// Whether both handles point at the same function allocation.
    pub fn same(&self, other: &Callable) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callable").field(&"<fn>").finish()
    }
}

/// A host object carried through the tree without inspection.
#[derive(Clone)]
pub struct Opaque {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the wrapped object if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether the wrapped object is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Rust type name of the wrapped object.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both handles point at the same object.
    pub fn same(&self, other: &Opaque) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opaque").field(&self.type_name).finish()
    }
}

impl Value {
    /// An empty record.
    pub fn empty_record() -> Self {
        Value::Record(Arc::new(Record::new()))
    }

    /// Wrap a record.
    #[inline]
    pub fn from_record(record: Record) -> Self {
        Value::Record(Arc::new(record))
    }

    /// Build a map node from entries.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        Value::Map(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Build a set node from members.
    pub fn set<I, K>(members: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Value::Set(Arc::new(members.into_iter().map(Into::into).collect()))
    }

    /// Wrap a function.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Value::Callable(Callable::new(f))
    }

    /// Wrap a host object.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(Opaque::new(value))
    }

    /// Name of this value's kind, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::DateTime(_) => "datetime",
            Value::Regex(_) => "regex",
            Value::Callable(_) => "callable",
            Value::Opaque(_) => "opaque",
        }
    }

    /// True for every variant except primitives and null.
    #[inline]
    pub fn is_object(&self) -> bool {
        !matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_record(&self) -> bool {
        matches!(self, Value::Record(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r.as_ref()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m.as_ref()),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Set> {
        match self {
            Value::Set(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(dt.as_ref()),
            _ => None,
        }
    }

    pub fn as_regex(&self) -> Option<&Regex> {
        match self {
            Value::Regex(re) => Some(re.as_ref()),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Callable(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Value::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// Look up a record field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_record()?.get(field)
    }

    /// Resolve a path against this value.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcrel_state::{path, record, Value};
    ///
    /// let state = record! { "todos" => vec![record! { "title" => "milk" }] };
    /// assert_eq!(state.pointer(&path!("todos", 0, "title")), Some(&Value::from("milk")));
    /// assert_eq!(state.pointer(&path!("todos", 3)), None);
    /// ```
    pub fn pointer(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for seg in path {
            current = match (seg, current) {
                (Seg::Field(name), Value::Record(record)) => record.get(name.as_str())?,
                (Seg::Index(i), Value::List(list)) => list.get(*i)?,
                (Seg::Entry(key), Value::Map(map)) => map.get(key)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Reference identity for object-like values, equality for primitives.
    ///
    /// Two snapshots that share a subtree report `same` for it; a subtree that
    /// was rebuilt by a merge does not, even if its contents are equal.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Arc::ptr_eq(a, b),
            (Value::DateTime(a), Value::DateTime(b)) => Arc::ptr_eq(a, b),
            (Value::Regex(a), Value::Regex(b)) => Arc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => a.same(b),
            (Value::Opaque(a), Value::Opaque(b)) => a.same(b),
            _ => false,
        }
    }

    /// Convert to JSON, failing on callables and opaque values.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Regex(a), Value::Regex(b)) => a.as_str() == b.as_str(),
            _ => self.same(other),
        }
    }
}

impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        self.as_i64() == Some(*other)
    }
}

impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        self.as_i64() == Some(i64::from(*other))
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl std::ops::Index<&str> for Value {
    type Output = Value;

    fn index(&self, field: &str) -> &Value {
        self.get(field).unwrap_or(&NULL)
    }
}

impl std::ops::Index<usize> for Value {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        self.as_list().and_then(|l| l.get(index)).unwrap_or(&NULL)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Number(i.into())
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Number(i.into())
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Number(i.into())
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Number(i.into())
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Number(i.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats become `Null`, as in `serde_json`.
    fn from(f: f64) -> Self {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(Arc::new(record))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl From<Set> for Value {
    fn from(set: Set) -> Self {
        Value::Set(Arc::new(set))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(Arc::new(dt))
    }
}

impl From<Regex> for Value {
    fn from(re: Regex) -> Self {
        Value::Regex(Arc::new(re))
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Callable(c)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Value::Opaque(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::List(Arc::new(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(fields) => Value::Record(Arc::new(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

impl TryFrom<&Value> for serde_json::Value {
    type Error = serde_json::Error;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        value.to_json()
    }
}

fn key_string(key: &Key) -> Cow<'_, str> {
    match key {
        Key::Str(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

impl Serialize for Value {
    /// Maps serialize as objects with stringified keys, sets as arrays,
    /// datetimes as RFC 3339 strings and regexes as their pattern.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Record(record) => serializer.collect_map(record.iter()),
            Value::List(list) => serializer.collect_seq(list.iter()),
            Value::Map(map) => serializer.collect_map(map.iter().map(|(k, v)| (key_string(k), v))),
            Value::Set(set) => serializer.collect_seq(set.iter()),
            Value::DateTime(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            Value::Regex(re) => serializer.serialize_str(re.as_str()),
            Value::Callable(_) | Value::Opaque(_) => Err(S::Error::custom(format!(
                "{} values cannot be serialized",
                self.type_name()
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// Build a record `Value` from `field => value` pairs.
///
/// # Examples
///
/// ```
/// use mcrel_state::record;
///
/// let state = record! {
///     "filter" => "all",
///     "todos" => record! { "count" => 0 },
/// };
/// assert_eq!(state["filter"], "all");
/// assert_eq!(state["todos"]["count"], 0);
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Value::empty_record()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::Record::new();
        $(
            fields.insert(::std::string::String::from($field), $crate::Value::from($value));
        )+
        $crate::Value::from_record(fields)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::from(1).type_name(), "number");
        assert_eq!(record! {}.type_name(), "record");
        assert_eq!(Value::from(vec![1, 2]).type_name(), "list");
        assert_eq!(Value::map([(1, "a")]).type_name(), "map");
        assert_eq!(Value::set(["a"]).type_name(), "set");
        assert_eq!(Value::opaque(5u8).type_name(), "opaque");
    }

    #[test]
    fn test_is_object() {
        assert!(!Value::Null.is_object());
        assert!(!Value::from("s").is_object());
        assert!(record! {}.is_object());
        assert!(Value::from(Regex::new("d+").unwrap()).is_object());
    }

    #[test]
    fn test_same_is_identity_for_containers() {
        let a = record! { "x" => 1 };
        let b = record! { "x" => 1 };
        assert_eq!(a, b);
        assert!(!a.same(&b));
        assert!(a.same(&a.clone()));
    }

    #[test]
    fn test_same_is_equality_for_primitives() {
        assert!(Value::from(1).same(&Value::from(1)));
        assert!(Value::from("a").same(&Value::from("a")));
        assert!(!Value::from(1).same(&Value::from(2)));
    }

    #[test]
    fn test_callable_equality_is_identity() {
        let f = Value::callable(|_| Value::Null);
        let g = Value::callable(|_| Value::Null);
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
        assert_eq!(f.as_callable().unwrap().call(&[]), Value::Null);
    }

    #[test]
    fn test_opaque_downcast() {
        let v = Value::opaque(String::from("handle"));
        let o = v.as_opaque().unwrap();
        assert!(o.is::<String>());
        assert_eq!(o.downcast_ref::<String>().map(String::as_str), Some("handle"));
        assert!(o.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn test_index_missing_is_null() {
        let v = record! { "a" => 1 };
        assert_eq!(v["a"], 1);
        assert!(v["missing"].is_null());
        assert!(v["a"]["deeper"].is_null());
        assert!(Value::from(vec![1])[5].is_null());
    }

    #[test]
    fn test_pointer_into_map() {
        let v = record! { "byId" => Value::map([("a", record! { "done" => true })]) };
        let p = path!("byId").entry("a").field("done");
        assert_eq!(v.pointer(&p), Some(&Value::Bool(true)));
        assert_eq!(v.pointer(&path!("byId", "a")), None);
    }

    #[test]
    fn test_from_json() {
        let v = Value::from(json!({"a": [1, {"b": null}], "c": "s"}));
        assert_eq!(v["a"][0], 1);
        assert!(v["a"][1]["b"].is_null());
        assert!(v["a"][1].as_record().unwrap().contains_key("b"));
        assert_eq!(v["c"], "s");
    }

    #[test]
    fn test_to_json() {
        let dt = DateTime::from_timestamp_millis(0).unwrap();
        let v = record! {
            "map" => Value::map([(1, "one")]),
            "set" => Value::set(["x", "y"]),
            "when" => dt,
            "re" => Regex::new("^a+$").unwrap(),
        };
        assert_eq!(
            v.to_json().unwrap(),
            json!({
                "map": {"1": "one"},
                "set": ["x", "y"],
                "when": "1970-01-01T00:00:00+00:00",
                "re": "^a+$",
            })
        );
    }

    #[test]
    fn test_to_json_rejects_callables() {
        let v = record! { "f" => Value::callable(|_| Value::Null) };
        let err = v.to_json().unwrap_err();
        assert!(err.to_string().contains("callable"));
    }

    #[test]
    fn test_deserialize() {
        let v: Value = serde_json::from_str(r#"{"a": {"b": [true]}}"#).unwrap();
        assert_eq!(v.pointer(&path!("a", "b", 0)), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert!(Value::from(f64::NAN).is_null());
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
    }
}
